use serde::{Deserialize, Serialize};

/// Countdown state captured when the app moves to the background.
///
/// Lives for exactly one suspend/resume cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackgroundSnapshot {
    pub suspended_at_epoch_millis: i64,
    pub remaining_seconds_at_suspend: u32,
}

impl BackgroundSnapshot {
    #[must_use]
    pub fn new(suspended_at_epoch_millis: i64, remaining_seconds_at_suspend: u32) -> Self {
        Self {
            suspended_at_epoch_millis,
            remaining_seconds_at_suspend,
        }
    }

    /// Whole seconds elapsed between suspension and `now_epoch_millis`.
    ///
    /// A clock that moved backwards counts as zero elapsed time.
    #[must_use]
    pub fn elapsed_seconds(&self, now_epoch_millis: i64) -> u64 {
        let delta = now_epoch_millis.saturating_sub(self.suspended_at_epoch_millis);
        u64::try_from(delta / 1_000).unwrap_or(0)
    }

    /// Remaining countdown after resuming at `now_epoch_millis`.
    #[must_use]
    pub fn remaining_after(&self, now_epoch_millis: i64) -> u32 {
        let elapsed = self.elapsed_seconds(now_epoch_millis);
        let remaining = u64::from(self.remaining_seconds_at_suspend).saturating_sub(elapsed);
        u32::try_from(remaining).unwrap_or(0)
    }
}
