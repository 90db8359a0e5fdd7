use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

/// Runs a single, consolidated migration for the current schema.
///
/// Creates the background snapshot slot and the per-test result history.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    // Version 1: full schema.
    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS background_snapshots (
                    session_id TEXT PRIMARY KEY,
                    suspended_at_epoch_millis INTEGER NOT NULL,
                    remaining_seconds_at_suspend INTEGER NOT NULL
                        CHECK (remaining_seconds_at_suspend >= 0)
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS result_history (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    session_id TEXT NOT NULL UNIQUE,
                    category_id INTEGER NOT NULL,
                    test_id INTEGER NOT NULL,
                    score INTEGER NOT NULL CHECK (score >= 0),
                    correct_count INTEGER NOT NULL CHECK (correct_count >= 0),
                    incorrect_count INTEGER NOT NULL CHECK (incorrect_count >= 0),
                    unattempted_count INTEGER NOT NULL CHECK (unattempted_count >= 0),
                    total_questions INTEGER NOT NULL CHECK (total_questions >= 0),
                    time_taken_seconds INTEGER NOT NULL CHECK (time_taken_seconds >= 0),
                    answers TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_result_history_test
                    ON result_history (category_id, test_id, id);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(1_i64)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::info!(version = 1, "sqlite schema migrated");
    }

    Ok(())
}
