use quiz_core::model::{ResultRecord, SessionId};

/// Notifications broadcast to session observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Started {
        session_id: SessionId,
        title: String,
        total_questions: usize,
        duration_seconds: u32,
    },
    AnswerSelected {
        question_index: usize,
        option_index: usize,
    },
    Navigated {
        index: usize,
    },
    /// Forward navigation past the last question.
    ReadyToSubmit,
    Tick {
        remaining_seconds: u32,
    },
    LowTime {
        remaining_seconds: u32,
    },
    Expired,
    Suspended {
        remaining_seconds: u32,
    },
    Resumed {
        remaining_seconds: u32,
    },
    Completed {
        record: ResultRecord,
    },
    Error {
        message: String,
    },
    RemoteSynced {
        session_id: SessionId,
    },
    RemoteSyncFailed {
        session_id: SessionId,
        message: String,
    },
    /// A driver command was refused; the session is unchanged.
    CommandRejected {
        reason: String,
    },
    Quit,
}
