use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{AnswerStore, CategoryId, SessionId, TestId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ResultError {
    #[error("counts ({sum}) do not add up to total questions ({total})")]
    CountMismatch { total: u32, sum: u32 },

    #[error("score ({score}) must equal correct count ({correct})")]
    ScoreMismatch { score: u32, correct: u32 },

    #[error("too many questions for a single result: {len}")]
    TooManyQuestions { len: usize },
}

/// Per-outcome counts produced by scoring one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBreakdown {
    pub score: u32,
    pub correct_count: u32,
    pub incorrect_count: u32,
    pub unattempted_count: u32,
    pub total_questions: u32,
}

impl ScoreBreakdown {
    /// # Errors
    ///
    /// Returns `ResultError` when the counts do not partition `total_questions`
    /// or the score differs from the correct count.
    pub fn validate(self) -> Result<Self, ResultError> {
        let sum = self
            .correct_count
            .saturating_add(self.incorrect_count)
            .saturating_add(self.unattempted_count);
        if sum != self.total_questions {
            return Err(ResultError::CountMismatch {
                total: self.total_questions,
                sum,
            });
        }
        if self.score != self.correct_count {
            return Err(ResultError::ScoreMismatch {
                score: self.score,
                correct: self.correct_count,
            });
        }
        Ok(self)
    }
}

/// Finalized outcome of one quiz session. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawResultRecord")]
pub struct ResultRecord {
    session_id: SessionId,
    test_id: TestId,
    category_id: CategoryId,
    #[serde(flatten)]
    breakdown: ScoreBreakdown,
    time_taken_seconds: u32,
    answers: AnswerStore,
    created_at: DateTime<Utc>,
}

impl ResultRecord {
    /// Build a record from a scored attempt.
    ///
    /// `time_taken_seconds` is `duration - remaining`, clamped at zero.
    ///
    /// # Errors
    ///
    /// Returns `ResultError` if the breakdown is inconsistent.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session_id: SessionId,
        category_id: CategoryId,
        test_id: TestId,
        breakdown: ScoreBreakdown,
        duration_seconds: u32,
        remaining_seconds: u32,
        answers: AnswerStore,
        created_at: DateTime<Utc>,
    ) -> Result<Self, ResultError> {
        Self::from_persisted(
            session_id,
            category_id,
            test_id,
            breakdown,
            duration_seconds.saturating_sub(remaining_seconds),
            answers,
            created_at,
        )
    }

    /// Rehydrate a record from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `ResultError` if the stored counts are inconsistent.
    pub fn from_persisted(
        session_id: SessionId,
        category_id: CategoryId,
        test_id: TestId,
        breakdown: ScoreBreakdown,
        time_taken_seconds: u32,
        answers: AnswerStore,
        created_at: DateTime<Utc>,
    ) -> Result<Self, ResultError> {
        Ok(Self {
            session_id,
            test_id,
            category_id,
            breakdown: breakdown.validate()?,
            time_taken_seconds,
            answers,
            created_at,
        })
    }

    /// Idempotency key used when submitting this record remotely.
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    #[must_use]
    pub fn test_id(&self) -> TestId {
        self.test_id
    }

    #[must_use]
    pub fn category_id(&self) -> CategoryId {
        self.category_id
    }

    #[must_use]
    pub fn breakdown(&self) -> ScoreBreakdown {
        self.breakdown
    }

    #[must_use]
    pub fn score(&self) -> u32 {
        self.breakdown.score
    }

    #[must_use]
    pub fn correct_count(&self) -> u32 {
        self.breakdown.correct_count
    }

    #[must_use]
    pub fn incorrect_count(&self) -> u32 {
        self.breakdown.incorrect_count
    }

    #[must_use]
    pub fn unattempted_count(&self) -> u32 {
        self.breakdown.unattempted_count
    }

    #[must_use]
    pub fn total_questions(&self) -> u32 {
        self.breakdown.total_questions
    }

    #[must_use]
    pub fn time_taken_seconds(&self) -> u32 {
        self.time_taken_seconds
    }

    #[must_use]
    pub fn answers(&self) -> &AnswerStore {
        &self.answers
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawResultRecord {
    session_id: SessionId,
    test_id: TestId,
    category_id: CategoryId,
    #[serde(flatten)]
    breakdown: ScoreBreakdown,
    time_taken_seconds: u32,
    answers: AnswerStore,
    created_at: DateTime<Utc>,
}

impl TryFrom<RawResultRecord> for ResultRecord {
    type Error = ResultError;

    fn try_from(raw: RawResultRecord) -> Result<Self, Self::Error> {
        Self::from_persisted(
            raw.session_id,
            raw.category_id,
            raw.test_id,
            raw.breakdown,
            raw.time_taken_seconds,
            raw.answers,
            raw.created_at,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn breakdown(correct: u32, incorrect: u32, unattempted: u32) -> ScoreBreakdown {
        ScoreBreakdown {
            score: correct,
            correct_count: correct,
            incorrect_count: incorrect,
            unattempted_count: unattempted,
            total_questions: correct + incorrect + unattempted,
        }
    }

    #[test]
    fn time_taken_is_duration_minus_remaining() {
        let record = ResultRecord::new(
            SessionId::new_v4(),
            CategoryId::new(1),
            TestId::new(2),
            breakdown(7, 2, 1),
            300,
            120,
            AnswerStore::new(),
            fixed_now(),
        )
        .unwrap();
        assert_eq!(record.time_taken_seconds(), 180);
    }

    #[test]
    fn time_taken_clamps_at_zero() {
        let record = ResultRecord::new(
            SessionId::new_v4(),
            CategoryId::new(1),
            TestId::new(2),
            breakdown(0, 0, 3),
            30,
            45,
            AnswerStore::new(),
            fixed_now(),
        )
        .unwrap();
        assert_eq!(record.time_taken_seconds(), 0);
    }

    #[test]
    fn rejects_inconsistent_counts() {
        let mut bad = breakdown(1, 1, 1);
        bad.total_questions = 4;
        assert_eq!(
            bad.validate(),
            Err(ResultError::CountMismatch { total: 4, sum: 3 })
        );

        let mut bad_score = breakdown(2, 0, 0);
        bad_score.score = 3;
        assert!(matches!(
            bad_score.validate(),
            Err(ResultError::ScoreMismatch { .. })
        ));
    }

    #[test]
    fn json_uses_camel_case_and_validates_on_read() {
        let record = ResultRecord::new(
            SessionId::new_v4(),
            CategoryId::new(1),
            TestId::new(2),
            breakdown(1, 0, 1),
            60,
            10,
            [(0, 3)].into_iter().collect(),
            fixed_now(),
        )
        .unwrap();
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["correctCount"], 1);
        assert_eq!(json["timeTakenSeconds"], 50);

        let back: ResultRecord = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(back, record);

        let mut tampered = json;
        tampered["correctCount"] = 2.into();
        assert!(serde_json::from_value::<ResultRecord>(tampered).is_err());
    }
}
