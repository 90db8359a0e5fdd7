use std::sync::Arc;

use quiz_core::model::{BackgroundSnapshot, CategoryId, ResultRecord, SessionId, TestId};
use storage::repository::{
    DEFAULT_HISTORY_LIMIT, ResultHistoryRepository, SnapshotRepository, Storage, StorageError,
};
use tracing::{debug, info};

/// Local durable state for quiz sessions.
///
/// Holds two independent slots: the suspend snapshot of the active session,
/// and a bounded per-test history of finalized results.
#[derive(Clone)]
pub struct PersistenceAdapter {
    snapshots: Arc<dyn SnapshotRepository>,
    history: Arc<dyn ResultHistoryRepository>,
    history_limit: usize,
}

impl PersistenceAdapter {
    #[must_use]
    pub fn new(storage: &Storage) -> Self {
        Self::from_parts(Arc::clone(&storage.snapshots), Arc::clone(&storage.history))
    }

    #[must_use]
    pub fn from_parts(
        snapshots: Arc<dyn SnapshotRepository>,
        history: Arc<dyn ResultHistoryRepository>,
    ) -> Self {
        Self {
            snapshots,
            history,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }

    #[must_use]
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit.max(1);
        self
    }

    #[must_use]
    pub fn history_limit(&self) -> usize {
        self.history_limit
    }

    /// # Errors
    ///
    /// Returns `StorageError` if the snapshot cannot be written.
    pub async fn save_snapshot(
        &self,
        session_id: SessionId,
        snapshot: &BackgroundSnapshot,
    ) -> Result<(), StorageError> {
        debug!(%session_id, remaining = snapshot.remaining_seconds_at_suspend, "saving snapshot");
        self.snapshots.save_snapshot(session_id, snapshot).await
    }

    /// Read and remove the pending snapshot for a session.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on read or delete failures.
    pub async fn take_snapshot(
        &self,
        session_id: SessionId,
    ) -> Result<Option<BackgroundSnapshot>, StorageError> {
        let snapshot = self.snapshots.get_snapshot(session_id).await?;
        if snapshot.is_some() {
            self.snapshots.delete_snapshot(session_id).await?;
        }
        Ok(snapshot)
    }

    /// # Errors
    ///
    /// Returns `StorageError` on delete failures.
    pub async fn discard_snapshot(&self, session_id: SessionId) -> Result<bool, StorageError> {
        self.snapshots.delete_snapshot(session_id).await
    }

    /// Drop snapshots left behind by sessions that never resumed.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on delete failures.
    pub async fn discard_stale_snapshots(&self) -> Result<u64, StorageError> {
        let dropped = self.snapshots.clear_snapshots().await?;
        if dropped > 0 {
            info!(dropped, "discarded stale snapshots");
        }
        Ok(dropped)
    }

    /// Append a finalized result to the rolling history.
    ///
    /// Returns `false` if this session's record was already stored.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the write fails.
    pub async fn record_result(&self, record: &ResultRecord) -> Result<bool, StorageError> {
        self.history.append_result(record, self.history_limit).await
    }

    /// Past results for a test, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on read failures.
    pub async fn history(
        &self,
        category_id: CategoryId,
        test_id: TestId,
    ) -> Result<Vec<ResultRecord>, StorageError> {
        self.history.list_results(category_id, test_id).await
    }

    /// # Errors
    ///
    /// Returns `StorageError` on read failures.
    pub async fn latest_result(
        &self,
        category_id: CategoryId,
        test_id: TestId,
    ) -> Result<Option<ResultRecord>, StorageError> {
        Ok(self.history(category_id, test_id).await?.pop())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiz_core::model::{AnswerStore, ScoreBreakdown};
    use quiz_core::time::fixed_now;

    fn record(score: u32) -> ResultRecord {
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
            TestId::new(1),
            breakdown,
            60,
            30,
            AnswerStore::new(),
            fixed_now(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn take_snapshot_consumes_it() {
        let adapter = PersistenceAdapter::new(&Storage::in_memory());
        let session = SessionId::new_v4();
        adapter
            .save_snapshot(session, &BackgroundSnapshot::new(5_000, 50))
            .await
            .unwrap();

        assert_eq!(
            adapter.take_snapshot(session).await.unwrap(),
            Some(BackgroundSnapshot::new(5_000, 50))
        );
        assert_eq!(adapter.take_snapshot(session).await.unwrap(), None);
    }

    #[tokio::test]
    async fn stale_snapshots_are_discarded() {
        let adapter = PersistenceAdapter::new(&Storage::in_memory());
        adapter
            .save_snapshot(SessionId::new_v4(), &BackgroundSnapshot::new(1, 1))
            .await
            .unwrap();
        assert_eq!(adapter.discard_stale_snapshots().await.unwrap(), 1);
        assert_eq!(adapter.discard_stale_snapshots().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn history_is_bounded_and_latest_is_newest() {
        let adapter = PersistenceAdapter::new(&Storage::in_memory()).with_history_limit(3);
        for score in 1..=4 {
            assert!(adapter.record_result(&record(score)).await.unwrap());
        }

        let scores: Vec<u32> = adapter
            .history(CategoryId::new(1), TestId::new(1))
            .await
            .unwrap()
            .iter()
            .map(ResultRecord::score)
            .collect();
        assert_eq!(scores, vec![2, 3, 4]);

        let latest = adapter
            .latest_result(CategoryId::new(1), TestId::new(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.score(), 4);
    }

    #[tokio::test]
    async fn recording_same_session_twice_is_a_no_op() {
        let adapter = PersistenceAdapter::new(&Storage::in_memory());
        let record = record(5);
        assert!(adapter.record_result(&record).await.unwrap());
        assert!(!adapter.record_result(&record).await.unwrap());
        assert_eq!(
            adapter
                .history(CategoryId::new(1), TestId::new(1))
                .await
                .unwrap()
                .len(),
            1
        );
    }
}
