use async_trait::async_trait;
use quiz_core::model::{BackgroundSnapshot, CategoryId, QuestionSet, ResultRecord, SessionId, TestId};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Number of past results kept per test for offline display.
pub const DEFAULT_HISTORY_LIMIT: usize = 5;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Source of question sets for a test. Usually backed by a remote service.
#[async_trait]
pub trait QuestionSetLoader: Send + Sync {
    /// Load the ordered questions and timing for a test.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the test is missing or has no questions.
    async fn load(
        &self,
        category_id: CategoryId,
        test_id: TestId,
    ) -> Result<QuestionSet, StorageError>;
}

/// Durable slot for the countdown state captured on suspend.
#[async_trait]
pub trait SnapshotRepository: Send + Sync {
    /// Store the snapshot for a session, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the snapshot cannot be written.
    async fn save_snapshot(
        &self,
        session_id: SessionId,
        snapshot: &BackgroundSnapshot,
    ) -> Result<(), StorageError>;

    /// Fetch the pending snapshot for a session, if any.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on read failures.
    async fn get_snapshot(
        &self,
        session_id: SessionId,
    ) -> Result<Option<BackgroundSnapshot>, StorageError>;

    /// Remove the snapshot for a session. Returns whether one existed.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on write failures.
    async fn delete_snapshot(&self, session_id: SessionId) -> Result<bool, StorageError>;

    /// Remove every stored snapshot. Returns how many were dropped.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on write failures.
    async fn clear_snapshots(&self) -> Result<u64, StorageError>;
}

/// Rolling per-test history of finalized results.
#[async_trait]
pub trait ResultHistoryRepository: Send + Sync {
    /// Append a result and evict the oldest entries beyond `keep`.
    ///
    /// Returns `false` when a result for the same session was already stored.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the write fails.
    async fn append_result(&self, record: &ResultRecord, keep: usize) -> Result<bool, StorageError>;

    /// Stored results for a test, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on read failures.
    async fn list_results(
        &self,
        category_id: CategoryId,
        test_id: TestId,
    ) -> Result<Vec<ResultRecord>, StorageError>;
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    question_sets: Arc<Mutex<HashMap<(CategoryId, TestId), QuestionSet>>>,
    snapshots: Arc<Mutex<HashMap<SessionId, BackgroundSnapshot>>>,
    history: Arc<Mutex<HashMap<(CategoryId, TestId), VecDeque<ResultRecord>>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a question set so `load` can find it.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the lock is poisoned.
    pub fn insert_question_set(
        &self,
        category_id: CategoryId,
        test_id: TestId,
        set: QuestionSet,
    ) -> Result<(), StorageError> {
        let mut guard = self
            .question_sets
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert((category_id, test_id), set);
        Ok(())
    }
}

#[async_trait]
impl QuestionSetLoader for InMemoryRepository {
    async fn load(
        &self,
        category_id: CategoryId,
        test_id: TestId,
    ) -> Result<QuestionSet, StorageError> {
        let guard = self
            .question_sets
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard
            .get(&(category_id, test_id))
            .filter(|set| !set.questions.is_empty())
            .cloned()
            .ok_or(StorageError::NotFound)
    }
}

#[async_trait]
impl SnapshotRepository for InMemoryRepository {
    async fn save_snapshot(
        &self,
        session_id: SessionId,
        snapshot: &BackgroundSnapshot,
    ) -> Result<(), StorageError> {
        let mut guard = self
            .snapshots
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(session_id, *snapshot);
        Ok(())
    }

    async fn get_snapshot(
        &self,
        session_id: SessionId,
    ) -> Result<Option<BackgroundSnapshot>, StorageError> {
        let guard = self
            .snapshots
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(&session_id).copied())
    }

    async fn delete_snapshot(&self, session_id: SessionId) -> Result<bool, StorageError> {
        let mut guard = self
            .snapshots
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.remove(&session_id).is_some())
    }

    async fn clear_snapshots(&self) -> Result<u64, StorageError> {
        let mut guard = self
            .snapshots
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let removed = guard.len() as u64;
        guard.clear();
        Ok(removed)
    }
}

#[async_trait]
impl ResultHistoryRepository for InMemoryRepository {
    async fn append_result(&self, record: &ResultRecord, keep: usize) -> Result<bool, StorageError> {
        let mut guard = self
            .history
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let entries = guard
            .entry((record.category_id(), record.test_id()))
            .or_default();
        if entries
            .iter()
            .any(|existing| existing.session_id() == record.session_id())
        {
            return Ok(false);
        }
        entries.push_back(record.clone());
        while entries.len() > keep {
            entries.pop_front();
        }
        Ok(true)
    }

    async fn list_results(
        &self,
        category_id: CategoryId,
        test_id: TestId,
    ) -> Result<Vec<ResultRecord>, StorageError> {
        let guard = self
            .history
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard
            .get(&(category_id, test_id))
            .map(|entries| entries.iter().cloned().collect())
            .unwrap_or_default())
    }
}

/// Aggregates local repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub snapshots: Arc<dyn SnapshotRepository>,
    pub history: Arc<dyn ResultHistoryRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        let snapshots: Arc<dyn SnapshotRepository> = Arc::new(repo.clone());
        let history: Arc<dyn ResultHistoryRepository> = Arc::new(repo);
        Self { snapshots, history }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiz_core::model::{AnswerStore, Question, QuestionId, ScoreBreakdown};
    use quiz_core::time::fixed_now;

    fn build_record(test_id: u64, score: u32) -> ResultRecord {
        let breakdown = ScoreBreakdown {
            score,
            correct_count: score,
            incorrect_count: 0,
            unattempted_count: 10 - score,
            total_questions: 10,
        };
        ResultRecord::new(
            SessionId::new_v4(),
            CategoryId::new(1),
            TestId::new(test_id),
            breakdown,
            300,
            100,
            AnswerStore::new(),
            fixed_now(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn history_keeps_last_five_oldest_evicted() {
        let repo = InMemoryRepository::new();
        let records: Vec<_> = (0..7).map(|i| build_record(1, i)).collect();
        for record in &records {
            assert!(repo.append_result(record, DEFAULT_HISTORY_LIMIT).await.unwrap());
        }

        let stored = repo
            .list_results(CategoryId::new(1), TestId::new(1))
            .await
            .unwrap();
        assert_eq!(stored.len(), 5);
        assert_eq!(stored.first().unwrap().score(), 2);
        assert_eq!(stored.last().unwrap().score(), 6);
    }

    #[tokio::test]
    async fn history_ignores_duplicate_session() {
        let repo = InMemoryRepository::new();
        let record = build_record(1, 3);
        assert!(repo.append_result(&record, 5).await.unwrap());
        assert!(!repo.append_result(&record, 5).await.unwrap());
        let stored = repo
            .list_results(CategoryId::new(1), TestId::new(1))
            .await
            .unwrap();
        assert_eq!(stored.len(), 1);
    }

    #[tokio::test]
    async fn history_is_scoped_per_test() {
        let repo = InMemoryRepository::new();
        repo.append_result(&build_record(1, 3), 5).await.unwrap();
        repo.append_result(&build_record(2, 4), 5).await.unwrap();
        let first = repo
            .list_results(CategoryId::new(1), TestId::new(1))
            .await
            .unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].score(), 3);
    }

    #[tokio::test]
    async fn snapshot_is_overwritten_and_cleared() {
        let repo = InMemoryRepository::new();
        let session = SessionId::new_v4();
        repo.save_snapshot(session, &BackgroundSnapshot::new(1, 50))
            .await
            .unwrap();
        repo.save_snapshot(session, &BackgroundSnapshot::new(2, 40))
            .await
            .unwrap();
        assert_eq!(
            repo.get_snapshot(session).await.unwrap(),
            Some(BackgroundSnapshot::new(2, 40))
        );
        assert!(repo.delete_snapshot(session).await.unwrap());
        assert!(!repo.delete_snapshot(session).await.unwrap());

        repo.save_snapshot(SessionId::new_v4(), &BackgroundSnapshot::new(3, 1))
            .await
            .unwrap();
        assert_eq!(repo.clear_snapshots().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn loader_reports_missing_and_empty_sets() {
        let repo = InMemoryRepository::new();
        let err = repo
            .load(CategoryId::new(1), TestId::new(1))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound));

        repo.insert_question_set(
            CategoryId::new(1),
            TestId::new(2),
            QuestionSet::new("Empty", 60, Vec::new()),
        )
        .unwrap();
        let err = repo
            .load(CategoryId::new(1), TestId::new(2))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound));

        let q = Question::new(QuestionId::new(1), "Q", vec!["a".into(), "b".into()], 0).unwrap();
        repo.insert_question_set(
            CategoryId::new(1),
            TestId::new(3),
            QuestionSet::new("One", 60, vec![q]),
        )
        .unwrap();
        let set = repo.load(CategoryId::new(1), TestId::new(3)).await.unwrap();
        assert_eq!(set.title, "One");
    }
}
