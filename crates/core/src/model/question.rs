use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::QuestionId;

//
// ─── ERRORS ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("question text cannot be empty")]
    EmptyText,

    #[error("question needs at least {min} options, got {len}")]
    TooFewOptions { min: usize, len: usize },

    #[error("option {index} is blank")]
    BlankOption { index: usize },

    #[error("correct option {index} is out of range for {len} options")]
    CorrectOptionOutOfRange { index: usize, len: usize },

    #[error("question set has no questions")]
    EmptySet,

    #[error("question set duration must be positive")]
    InvalidDuration,
}

//
// ─── QUESTION ─────────────────────────────────────────────────────────────────
//

pub const MIN_OPTIONS: usize = 2;

/// A single multiple-choice question. Immutable once validated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Question {
    id: QuestionId,
    text: String,
    options: Vec<String>,
    correct_option_index: usize,
}

impl Question {
    /// # Errors
    ///
    /// Returns `QuestionError` if the text is empty, there are too few options,
    /// an option is blank, or the correct index does not point at an option.
    pub fn new(
        id: QuestionId,
        text: impl Into<String>,
        options: Vec<String>,
        correct_option_index: usize,
    ) -> Result<Self, QuestionError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(QuestionError::EmptyText);
        }
        if options.len() < MIN_OPTIONS {
            return Err(QuestionError::TooFewOptions {
                min: MIN_OPTIONS,
                len: options.len(),
            });
        }
        if let Some(index) = options.iter().position(|o| o.trim().is_empty()) {
            return Err(QuestionError::BlankOption { index });
        }
        if correct_option_index >= options.len() {
            return Err(QuestionError::CorrectOptionOutOfRange {
                index: correct_option_index,
                len: options.len(),
            });
        }

        Ok(Self {
            id,
            text,
            options,
            correct_option_index,
        })
    }

    #[must_use]
    pub fn id(&self) -> QuestionId {
        self.id
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn options(&self) -> &[String] {
        &self.options
    }

    #[must_use]
    pub fn option_count(&self) -> usize {
        self.options.len()
    }

    #[must_use]
    pub fn correct_option_index(&self) -> usize {
        self.correct_option_index
    }

    #[must_use]
    pub fn is_correct(&self, option_index: usize) -> bool {
        option_index == self.correct_option_index
    }
}

/// Unvalidated question as it arrives from a loader or a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionDraft {
    pub id: u64,
    pub text: String,
    pub options: Vec<String>,
    pub correct_option_index: usize,
}

impl QuestionDraft {
    /// # Errors
    ///
    /// See [`Question::new`].
    pub fn validate(self) -> Result<Question, QuestionError> {
        Question::new(
            QuestionId::new(self.id),
            self.text,
            self.options,
            self.correct_option_index,
        )
    }
}

//
// ─── QUESTION SET ─────────────────────────────────────────────────────────────
//

/// Ordered questions and session configuration for one test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionSet {
    pub title: String,
    pub duration_seconds: u32,
    pub questions: Vec<Question>,
}

impl QuestionSet {
    #[must_use]
    pub fn new(title: impl Into<String>, duration_seconds: u32, questions: Vec<Question>) -> Self {
        Self {
            title: title.into(),
            duration_seconds,
            questions,
        }
    }

    /// Checks the set can drive a timed session.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError::EmptySet` or `QuestionError::InvalidDuration`.
    pub fn ensure_playable(&self) -> Result<(), QuestionError> {
        if self.questions.is_empty() {
            return Err(QuestionError::EmptySet);
        }
        if self.duration_seconds == 0 {
            return Err(QuestionError::InvalidDuration);
        }
        Ok(())
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("option {i}")).collect()
    }

    #[test]
    fn valid_question_builds() {
        let q = Question::new(QuestionId::new(1), "2 + 2?", opts(4), 2).unwrap();
        assert_eq!(q.option_count(), 4);
        assert!(q.is_correct(2));
        assert!(!q.is_correct(0));
    }

    #[test]
    fn rejects_bad_correct_index() {
        let err = Question::new(QuestionId::new(1), "Q", opts(4), 4).unwrap_err();
        assert_eq!(
            err,
            QuestionError::CorrectOptionOutOfRange { index: 4, len: 4 }
        );
    }

    #[test]
    fn rejects_blank_text_and_options() {
        assert_eq!(
            Question::new(QuestionId::new(1), "  ", opts(4), 0).unwrap_err(),
            QuestionError::EmptyText
        );
        let mut options = opts(3);
        options[1] = " ".into();
        assert_eq!(
            Question::new(QuestionId::new(1), "Q", options, 0).unwrap_err(),
            QuestionError::BlankOption { index: 1 }
        );
        assert!(matches!(
            Question::new(QuestionId::new(1), "Q", opts(1), 0).unwrap_err(),
            QuestionError::TooFewOptions { .. }
        ));
    }

    #[test]
    fn draft_deserializes_camel_case() {
        let json = r#"{"id":3,"text":"Capital?","options":["a","b","c","d"],"correctOptionIndex":1}"#;
        let draft: QuestionDraft = serde_json::from_str(json).unwrap();
        let q = draft.validate().unwrap();
        assert_eq!(q.id(), QuestionId::new(3));
        assert_eq!(q.correct_option_index(), 1);
    }

    #[test]
    fn empty_or_untimed_sets_are_not_playable() {
        let empty = QuestionSet::new("Empty", 60, Vec::new());
        assert_eq!(empty.ensure_playable(), Err(QuestionError::EmptySet));

        let q = Question::new(QuestionId::new(1), "Q", opts(4), 0).unwrap();
        let untimed = QuestionSet::new("Untimed", 0, vec![q]);
        assert_eq!(untimed.ensure_playable(), Err(QuestionError::InvalidDuration));
    }
}
