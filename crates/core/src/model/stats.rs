use serde::{Deserialize, Serialize};

use crate::model::ResultRecord;

/// Aggregate statistics kept per user by the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub tests_taken: u64,
    pub total_score: u64,
    pub total_time_seconds: u64,
    pub highest_score: u32,
}

impl UserStats {
    /// Fold one result's delta into the aggregate.
    pub fn apply(&mut self, delta: StatsDelta) {
        self.tests_taken = self.tests_taken.saturating_add(u64::from(delta.tests_taken));
        self.total_score = self.total_score.saturating_add(u64::from(delta.score));
        self.total_time_seconds = self
            .total_time_seconds
            .saturating_add(u64::from(delta.time_taken_seconds));
        self.highest_score = self.highest_score.max(delta.score);
    }
}

/// Change to `UserStats` contributed by a single result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsDelta {
    pub tests_taken: u32,
    pub score: u32,
    pub time_taken_seconds: u32,
}

impl StatsDelta {
    #[must_use]
    pub fn from_result(record: &ResultRecord) -> Self {
        Self {
            tests_taken: 1,
            score: record.score(),
            time_taken_seconds: record.time_taken_seconds(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_accumulates_and_raises_highest() {
        let mut stats = UserStats::default();
        stats.apply(StatsDelta {
            tests_taken: 1,
            score: 7,
            time_taken_seconds: 180,
        });
        stats.apply(StatsDelta {
            tests_taken: 1,
            score: 4,
            time_taken_seconds: 60,
        });

        assert_eq!(stats.tests_taken, 2);
        assert_eq!(stats.total_score, 11);
        assert_eq!(stats.total_time_seconds, 240);
        assert_eq!(stats.highest_score, 7);
    }
}
