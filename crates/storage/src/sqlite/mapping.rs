use quiz_core::model::{
    AnswerStore, BackgroundSnapshot, CategoryId, ResultRecord, ScoreBreakdown, SessionId, TestId,
};
use sqlx::Row;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn id_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

fn u32_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn category_id_from_i64(v: i64) -> Result<CategoryId, StorageError> {
    Ok(CategoryId::new(i64_to_u64("category_id", v)?))
}

pub(crate) fn test_id_from_i64(v: i64) -> Result<TestId, StorageError> {
    Ok(TestId::new(i64_to_u64("test_id", v)?))
}

pub(crate) fn session_id_from_str(s: &str) -> Result<SessionId, StorageError> {
    s.parse().map_err(ser)
}

pub(crate) fn map_snapshot_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<BackgroundSnapshot, StorageError> {
    let suspended_at: i64 = row.try_get("suspended_at_epoch_millis").map_err(ser)?;
    let remaining = u32_from_i64(
        "remaining_seconds_at_suspend",
        row.try_get::<i64, _>("remaining_seconds_at_suspend")
            .map_err(ser)?,
    )?;
    Ok(BackgroundSnapshot::new(suspended_at, remaining))
}

pub(crate) fn map_result_row(row: &sqlx::sqlite::SqliteRow) -> Result<ResultRecord, StorageError> {
    let session_id = session_id_from_str(&row.try_get::<String, _>("session_id").map_err(ser)?)?;
    let category_id = category_id_from_i64(row.try_get::<i64, _>("category_id").map_err(ser)?)?;
    let test_id = test_id_from_i64(row.try_get::<i64, _>("test_id").map_err(ser)?)?;

    let breakdown = ScoreBreakdown {
        score: u32_from_i64("score", row.try_get::<i64, _>("score").map_err(ser)?)?,
        correct_count: u32_from_i64(
            "correct_count",
            row.try_get::<i64, _>("correct_count").map_err(ser)?,
        )?,
        incorrect_count: u32_from_i64(
            "incorrect_count",
            row.try_get::<i64, _>("incorrect_count").map_err(ser)?,
        )?,
        unattempted_count: u32_from_i64(
            "unattempted_count",
            row.try_get::<i64, _>("unattempted_count").map_err(ser)?,
        )?,
        total_questions: u32_from_i64(
            "total_questions",
            row.try_get::<i64, _>("total_questions").map_err(ser)?,
        )?,
    };
    let time_taken = u32_from_i64(
        "time_taken_seconds",
        row.try_get::<i64, _>("time_taken_seconds").map_err(ser)?,
    )?;
    let answers: AnswerStore =
        serde_json::from_str(&row.try_get::<String, _>("answers").map_err(ser)?).map_err(ser)?;
    let created_at = row.try_get("created_at").map_err(ser)?;

    ResultRecord::from_persisted(
        session_id,
        category_id,
        test_id,
        breakdown,
        time_taken,
        answers,
        created_at,
    )
    .map_err(ser)
}
