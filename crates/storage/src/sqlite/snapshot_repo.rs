use quiz_core::model::{BackgroundSnapshot, SessionId};

use super::SqliteRepository;
use super::mapping::map_snapshot_row;
use crate::repository::{SnapshotRepository, StorageError};

#[async_trait::async_trait]
impl SnapshotRepository for SqliteRepository {
    async fn save_snapshot(
        &self,
        session_id: SessionId,
        snapshot: &BackgroundSnapshot,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r"
                INSERT INTO background_snapshots (
                    session_id, suspended_at_epoch_millis, remaining_seconds_at_suspend
                )
                VALUES (?1, ?2, ?3)
                ON CONFLICT(session_id) DO UPDATE SET
                    suspended_at_epoch_millis = excluded.suspended_at_epoch_millis,
                    remaining_seconds_at_suspend = excluded.remaining_seconds_at_suspend
            ",
        )
        .bind(session_id.to_string())
        .bind(snapshot.suspended_at_epoch_millis)
        .bind(i64::from(snapshot.remaining_seconds_at_suspend))
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(())
    }

    async fn get_snapshot(
        &self,
        session_id: SessionId,
    ) -> Result<Option<BackgroundSnapshot>, StorageError> {
        let row = sqlx::query(
            r"
                SELECT suspended_at_epoch_millis, remaining_seconds_at_suspend
                FROM background_snapshots
                WHERE session_id = ?1
            ",
        )
        .bind(session_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        row.as_ref().map(map_snapshot_row).transpose()
    }

    async fn delete_snapshot(&self, session_id: SessionId) -> Result<bool, StorageError> {
        let res = sqlx::query("DELETE FROM background_snapshots WHERE session_id = ?1")
            .bind(session_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(res.rows_affected() > 0)
    }

    async fn clear_snapshots(&self) -> Result<u64, StorageError> {
        let res = sqlx::query("DELETE FROM background_snapshots")
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(res.rows_affected())
    }
}
