use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use uuid::Uuid;

use exam_core::model::{
    AnswerOutcome, AnswerStatus, Difficulty, ExposureRecord, ItemId, PendingAnswer, SessionId,
    SessionResult, SessionScore, UserId,
};

use crate::repository::{ItemRecord, StorageError};

pub(super) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(super) fn id_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

pub(super) fn item_id_from_i64(v: i64) -> Result<ItemId, StorageError> {
    u64::try_from(v)
        .map(ItemId::new)
        .map_err(|_| StorageError::Serialization(format!("invalid item_id: {v}")))
}

pub(super) fn user_id_from_i64(v: i64) -> Result<UserId, StorageError> {
    u64::try_from(v)
        .map(UserId::new)
        .map_err(|_| StorageError::Serialization(format!("invalid user_id: {v}")))
}

pub(super) fn session_id_from_str(v: &str) -> Result<SessionId, StorageError> {
    Uuid::parse_str(v)
        .map(SessionId::from_uuid)
        .map_err(|_| StorageError::Serialization(format!("invalid session_id: {v}")))
}

pub(super) fn u32_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(super) fn options_to_json(options: &[String]) -> Result<String, StorageError> {
    serde_json::to_string(options).map_err(ser)
}

pub(super) fn options_from_json(raw: &str) -> Result<Vec<String>, StorageError> {
    serde_json::from_str(raw).map_err(ser)
}

pub(super) fn map_item_row(row: &SqliteRow) -> Result<ItemRecord, StorageError> {
    let id = item_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?;
    let category: String = row.try_get("category").map_err(ser)?;
    let topic: String = row.try_get("topic").map_err(ser)?;
    let difficulty: Difficulty = row
        .try_get::<String, _>("difficulty")
        .map_err(ser)?
        .parse()
        .map_err(ser)?;
    let prompt: String = row.try_get("prompt").map_err(ser)?;
    let options = options_from_json(&row.try_get::<String, _>("options").map_err(ser)?)?;
    let figure: Option<String> = row.try_get("figure").map_err(ser)?;
    let correct_option = u32_from_i64(
        "correct_option",
        row.try_get::<i64, _>("correct_option").map_err(ser)?,
    )?;

    Ok(ItemRecord {
        id,
        category,
        topic,
        difficulty,
        prompt,
        options,
        figure,
        correct_option,
    })
}

pub(super) fn map_exposure_row(row: &SqliteRow) -> Result<ExposureRecord, StorageError> {
    let user_id = user_id_from_i64(row.try_get::<i64, _>("user_id").map_err(ser)?)?;
    let item_id = item_id_from_i64(row.try_get::<i64, _>("item_id").map_err(ser)?)?;
    let last_seen_at = row.try_get("last_seen_at").map_err(ser)?;
    let last_outcome: AnswerOutcome = row
        .try_get::<String, _>("last_outcome")
        .map_err(ser)?
        .parse()
        .map_err(ser)?;

    Ok(ExposureRecord::new(user_id, item_id, last_seen_at, last_outcome))
}

pub(super) fn map_answer_row(row: &SqliteRow) -> Result<PendingAnswer, StorageError> {
    let item_id = item_id_from_i64(row.try_get::<i64, _>("item_id").map_err(ser)?)?;
    let chosen_option = u32_from_i64(
        "chosen_option",
        row.try_get::<i64, _>("chosen_option").map_err(ser)?,
    )?;
    let attempts = u32_from_i64("attempts", row.try_get::<i64, _>("attempts").map_err(ser)?)?;
    let status: AnswerStatus = row
        .try_get::<String, _>("status")
        .map_err(ser)?
        .parse()
        .map_err(ser)?;
    let updated_at = row.try_get("updated_at").map_err(ser)?;

    PendingAnswer::from_persisted(item_id, chosen_option, attempts, status, updated_at)
        .map_err(ser)
}

pub(super) fn map_result_row(row: &SqliteRow) -> Result<SessionResult, StorageError> {
    let session_id = session_id_from_str(&row.try_get::<String, _>("session_id").map_err(ser)?)?;
    let user_id = user_id_from_i64(row.try_get::<i64, _>("user_id").map_err(ser)?)?;
    let score = u32_from_i64("score", row.try_get::<i64, _>("score").map_err(ser)?)?;
    let score = u8::try_from(score).map_err(|_| ser(format!("score out of range: {score}")))?;
    let correct = u32_from_i64("correct", row.try_get::<i64, _>("correct").map_err(ser)?)?;
    let total = u32_from_i64("total", row.try_get::<i64, _>("total").map_err(ser)?)?;
    let started_at = row.try_get("started_at").map_err(ser)?;
    let completed_at = row.try_get("completed_at").map_err(ser)?;

    let score = SessionScore::from_persisted(score, correct, total).map_err(ser)?;
    SessionResult::new(session_id, user_id, score, started_at, completed_at).map_err(ser)
}
