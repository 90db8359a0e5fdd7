use quiz_core::model::{CategoryId, ResultRecord, TestId};

use super::SqliteRepository;
use super::mapping::{id_i64, map_result_row, ser};
use crate::repository::{ResultHistoryRepository, StorageError};

#[async_trait::async_trait]
impl ResultHistoryRepository for SqliteRepository {
    async fn append_result(&self, record: &ResultRecord, keep: usize) -> Result<bool, StorageError> {
        let category_id = id_i64("category_id", record.category_id().value())?;
        let test_id = id_i64("test_id", record.test_id().value())?;
        let keep = i64::try_from(keep).map_err(ser)?;
        let answers = serde_json::to_string(record.answers()).map_err(ser)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let res = sqlx::query(
            r"
                INSERT INTO result_history (
                    session_id, category_id, test_id, score, correct_count,
                    incorrect_count, unattempted_count, total_questions,
                    time_taken_seconds, answers, created_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                ON CONFLICT(session_id) DO NOTHING
            ",
        )
        .bind(record.session_id().to_string())
        .bind(category_id)
        .bind(test_id)
        .bind(i64::from(record.score()))
        .bind(i64::from(record.correct_count()))
        .bind(i64::from(record.incorrect_count()))
        .bind(i64::from(record.unattempted_count()))
        .bind(i64::from(record.total_questions()))
        .bind(i64::from(record.time_taken_seconds()))
        .bind(answers)
        .bind(record.created_at())
        .execute(&mut *tx)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        if res.rows_affected() == 0 {
            tx.rollback()
                .await
                .map_err(|e| StorageError::Connection(e.to_string()))?;
            return Ok(false);
        }

        let evicted = sqlx::query(
            r"
                DELETE FROM result_history
                WHERE category_id = ?1 AND test_id = ?2
                  AND id NOT IN (
                      SELECT id FROM result_history
                      WHERE category_id = ?1 AND test_id = ?2
                      ORDER BY id DESC
                      LIMIT ?3
                  )
            ",
        )
        .bind(category_id)
        .bind(test_id)
        .bind(keep)
        .execute(&mut *tx)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        if evicted.rows_affected() > 0 {
            tracing::debug!(
                category_id,
                test_id,
                evicted = evicted.rows_affected(),
                "trimmed result history"
            );
        }
        Ok(true)
    }

    async fn list_results(
        &self,
        category_id: CategoryId,
        test_id: TestId,
    ) -> Result<Vec<ResultRecord>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT
                    session_id, category_id, test_id, score, correct_count,
                    incorrect_count, unattempted_count, total_questions,
                    time_taken_seconds, answers, created_at
                FROM result_history
                WHERE category_id = ?1 AND test_id = ?2
                ORDER BY id ASC
            ",
        )
        .bind(id_i64("category_id", category_id.value())?)
        .bind(id_i64("test_id", test_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_result_row(&row)?);
        }
        Ok(out)
    }
}
