//! Shared error types for the services crate.

use std::time::Duration;

use thiserror::Error;

use exam_core::model::{AnswerError, ItemId, ScoreError};
use storage::repository::StorageError;

/// Errors emitted by a `RemoteAnswerSink`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RemoteSinkError {
    #[error("answer sync is not configured")]
    Disabled,
    #[error("remote write timed out after {0:?}")]
    Timeout(Duration),
    #[error("remote attempt task was interrupted")]
    Interrupted,
    #[error("remote write failed with status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Errors emitted by session operations.
///
/// Pool exhaustion and exposure-store outages never appear here: both are
/// absorbed upstream with safe defaults (a smaller plan, a never-seen pool).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("item {0} is not part of this session")]
    UnknownItem(ItemId),
    #[error("option {option} is out of range for item {item_id}")]
    InvalidOption { item_id: ItemId, option: u32 },
    #[error("answer for item {0} is already settled")]
    AnswerSettled(ItemId),
    #[error("answer for item {0} is still in flight")]
    AnswerInFlight(ItemId),
    #[error("session is already completed")]
    Completed,
    #[error("invariant violated: {0}")]
    Invariant(String),
    #[error(transparent)]
    Answer(#[from] AnswerError),
    #[error(transparent)]
    Score(#[from] ScoreError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
