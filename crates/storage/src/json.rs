//! Question sets read from a local JSON file.
//!
//! ```json
//! { "tests": [ { "categoryId": 1, "testId": 1, "title": "Basics",
//!                "durationSeconds": 300, "questions": [ ... ] } ] }
//! ```

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use quiz_core::model::{CategoryId, QuestionDraft, QuestionError, QuestionSet, TestId};
use serde::Deserialize;
use thiserror::Error;

use crate::repository::{QuestionSetLoader, StorageError};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum QuestionBankError {
    #[error("failed to read question bank: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid question bank json: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("test {category_id}/{test_id}: {source}")]
    Question {
        category_id: CategoryId,
        test_id: TestId,
        #[source]
        source: QuestionError,
    },
}

#[derive(Debug, Deserialize)]
struct BankFile {
    tests: Vec<BankTest>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BankTest {
    category_id: u64,
    test_id: u64,
    title: String,
    duration_seconds: u32,
    #[serde(default)]
    questions: Vec<QuestionDraft>,
}

/// Read-only question bank parsed and validated up front.
#[derive(Debug, Clone, Default)]
pub struct JsonQuestionBank {
    sets: HashMap<(CategoryId, TestId), QuestionSet>,
}

impl JsonQuestionBank {
    /// # Errors
    ///
    /// Returns `QuestionBankError` if the file cannot be read or any question is invalid.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, QuestionBankError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    /// # Errors
    ///
    /// Returns `QuestionBankError` if the document is malformed or any question is invalid.
    pub fn from_json(raw: &str) -> Result<Self, QuestionBankError> {
        let file: BankFile = serde_json::from_str(raw)?;
        let mut sets = HashMap::with_capacity(file.tests.len());

        for test in file.tests {
            let category_id = CategoryId::new(test.category_id);
            let test_id = TestId::new(test.test_id);
            let questions = test
                .questions
                .into_iter()
                .map(QuestionDraft::validate)
                .collect::<Result<Vec<_>, _>>()
                .map_err(|source| QuestionBankError::Question {
                    category_id,
                    test_id,
                    source,
                })?;
            sets.insert(
                (category_id, test_id),
                QuestionSet::new(test.title, test.duration_seconds, questions),
            );
        }

        tracing::debug!(tests = sets.len(), "question bank loaded");
        Ok(Self { sets })
    }

    /// Tests in the bank as `(category, test, title)`, sorted by id.
    #[must_use]
    pub fn list_tests(&self) -> Vec<(CategoryId, TestId, String)> {
        let mut out: Vec<_> = self
            .sets
            .iter()
            .map(|((c, t), set)| (*c, *t, set.title.clone()))
            .collect();
        out.sort_by_key(|(c, t, _)| (*c, *t));
        out
    }
}

#[async_trait]
impl QuestionSetLoader for JsonQuestionBank {
    async fn load(
        &self,
        category_id: CategoryId,
        test_id: TestId,
    ) -> Result<QuestionSet, StorageError> {
        self.sets
            .get(&(category_id, test_id))
            .filter(|set| !set.questions.is_empty())
            .cloned()
            .ok_or(StorageError::NotFound)
    }
}
