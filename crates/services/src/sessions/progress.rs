/// Lifecycle state of a quiz session.
///
/// `Completed`, `Error` and `Discarded` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Loading,
    InProgress,
    Submitting,
    Completed,
    Error,
    Discarded,
}

impl SessionStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error | Self::Discarded)
    }
}

/// Aggregated view of session progress, useful for UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionProgress {
    pub status: SessionStatus,
    pub total: usize,
    pub answered: usize,
    pub current_index: usize,
    pub remaining_seconds: u32,
    pub duration_seconds: u32,
    pub suspended: bool,
}

impl SessionProgress {
    #[must_use]
    pub fn unattempted(&self) -> usize {
        self.total.saturating_sub(self.answered)
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.status == SessionStatus::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_finished_states_are_terminal() {
        assert!(!SessionStatus::Loading.is_terminal());
        assert!(!SessionStatus::InProgress.is_terminal());
        assert!(!SessionStatus::Submitting.is_terminal());
        assert!(SessionStatus::Completed.is_terminal());
        assert!(SessionStatus::Error.is_terminal());
        assert!(SessionStatus::Discarded.is_terminal());
    }
}
