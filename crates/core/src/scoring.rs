//! Deterministic scoring of a quiz attempt.
//!
//! One point per correct answer. No partial credit, no negative marking.
//! Identical inputs always yield identical breakdowns, which is what lets a
//! repeated submission carry the same result under the same idempotency key.

use crate::model::{AnswerStore, Question, ResultError, ScoreBreakdown};

/// Classify each question as correct, incorrect, or unattempted.
///
/// Answers recorded for indices outside `questions` are ignored.
///
/// # Errors
///
/// Returns `ResultError::TooManyQuestions` if the count cannot fit in `u32`.
pub fn score(questions: &[Question], answers: &AnswerStore) -> Result<ScoreBreakdown, ResultError> {
    let total_questions = u32::try_from(questions.len())
        .map_err(|_| ResultError::TooManyQuestions { len: questions.len() })?;

    let mut correct = 0_u32;
    let mut incorrect = 0_u32;
    let mut unattempted = 0_u32;

    for (index, question) in questions.iter().enumerate() {
        match answers.get(index) {
            None => unattempted += 1,
            Some(option) if question.is_correct(option) => correct += 1,
            Some(_) => incorrect += 1,
        }
    }

    Ok(ScoreBreakdown {
        score: correct,
        correct_count: correct,
        incorrect_count: incorrect,
        unattempted_count: unattempted,
        total_questions,
    })
}
