use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::ids::ItemId;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AnswerError {
    #[error("illegal answer transition: {from} -> {to}")]
    IllegalTransition {
        from: AnswerStatus,
        to: AnswerStatus,
    },

    #[error("unknown answer status: {0}")]
    UnknownStatus(String),

    #[error("persisted answer state is inconsistent: {0}")]
    InvalidPersistedState(String),
}

//
// ─── STATUS ────────────────────────────────────────────────────────────────────
//

/// Delivery status of one answer.
///
/// `Sent` and `Abandoned` are terminal; a record in either state refuses
/// further transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnswerStatus {
    Unsent,
    Sending,
    Sent,
    Failed,
    Abandoned,
}

impl AnswerStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Sent | Self::Abandoned)
    }

    /// Stable string form used for persistence.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unsent => "unsent",
            Self::Sending => "sending",
            Self::Sent => "sent",
            Self::Failed => "failed",
            Self::Abandoned => "abandoned",
        }
    }
}

impl fmt::Display for AnswerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnswerStatus {
    type Err = AnswerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unsent" => Ok(Self::Unsent),
            "sending" => Ok(Self::Sending),
            "sent" => Ok(Self::Sent),
            "failed" => Ok(Self::Failed),
            "abandoned" => Ok(Self::Abandoned),
            other => Err(AnswerError::UnknownStatus(other.to_string())),
        }
    }
}

//
// ─── PENDING ANSWER ────────────────────────────────────────────────────────────
//

/// One buffered answer moving through `unsent -> sending -> {sent | failed}`,
/// with `failed -> {sending | abandoned}`.
///
/// The chosen option never changes after construction; only delivery status,
/// attempt count and the touch timestamp move. Terminal records are immutable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAnswer {
    item_id: ItemId,
    chosen_option: u32,
    attempts: u32,
    status: AnswerStatus,
    updated_at: DateTime<Utc>,
}

impl PendingAnswer {
    /// Creates a freshly buffered, not-yet-attempted answer.
    #[must_use]
    pub fn new(item_id: ItemId, chosen_option: u32, at: DateTime<Utc>) -> Self {
        Self {
            item_id,
            chosen_option,
            attempts: 0,
            status: AnswerStatus::Unsent,
            updated_at: at,
        }
    }

    /// Rehydrates a record from the local buffer.
    ///
    /// # Errors
    ///
    /// Returns `AnswerError::InvalidPersistedState` when attempts and status
    /// cannot both be true (e.g. `sending` with zero attempts).
    pub fn from_persisted(
        item_id: ItemId,
        chosen_option: u32,
        attempts: u32,
        status: AnswerStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<Self, AnswerError> {
        match status {
            AnswerStatus::Unsent if attempts != 0 => {
                return Err(AnswerError::InvalidPersistedState(format!(
                    "unsent answer with {attempts} attempts"
                )));
            }
            AnswerStatus::Sending | AnswerStatus::Sent | AnswerStatus::Failed if attempts == 0 => {
                return Err(AnswerError::InvalidPersistedState(format!(
                    "{status} answer with zero attempts"
                )));
            }
            _ => {}
        }

        Ok(Self {
            item_id,
            chosen_option,
            attempts,
            status,
            updated_at,
        })
    }

    #[must_use]
    pub fn item_id(&self) -> ItemId {
        self.item_id
    }

    #[must_use]
    pub fn chosen_option(&self) -> u32 {
        self.chosen_option
    }

    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    #[must_use]
    pub fn status(&self) -> AnswerStatus {
        self.status
    }

    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Starts a delivery attempt (first send or retry).
    ///
    /// # Errors
    ///
    /// Returns `AnswerError::IllegalTransition` unless the record is
    /// `Unsent` or `Failed`.
    pub fn begin_attempt(&mut self, at: DateTime<Utc>) -> Result<(), AnswerError> {
        match self.status {
            AnswerStatus::Unsent | AnswerStatus::Failed => {
                self.status = AnswerStatus::Sending;
                self.attempts += 1;
                self.updated_at = at;
                Ok(())
            }
            from => Err(AnswerError::IllegalTransition {
                from,
                to: AnswerStatus::Sending,
            }),
        }
    }

    /// Marks the in-flight attempt as delivered.
    ///
    /// # Errors
    ///
    /// Returns `AnswerError::IllegalTransition` unless the record is `Sending`.
    pub fn mark_sent(&mut self, at: DateTime<Utc>) -> Result<(), AnswerError> {
        match self.status {
            AnswerStatus::Sending => {
                self.status = AnswerStatus::Sent;
                self.updated_at = at;
                Ok(())
            }
            from => Err(AnswerError::IllegalTransition {
                from,
                to: AnswerStatus::Sent,
            }),
        }
    }

    /// Marks the in-flight attempt as failed, keeping the record retryable.
    ///
    /// # Errors
    ///
    /// Returns `AnswerError::IllegalTransition` unless the record is `Sending`.
    pub fn mark_failed(&mut self, at: DateTime<Utc>) -> Result<(), AnswerError> {
        match self.status {
            AnswerStatus::Sending => {
                self.status = AnswerStatus::Failed;
                self.updated_at = at;
                Ok(())
            }
            from => Err(AnswerError::IllegalTransition {
                from,
                to: AnswerStatus::Failed,
            }),
        }
    }

    /// Gives up on delivery, keeping the local copy.
    ///
    /// Allowed from `Unsent`, `Sending` (session abort while in flight) and
    /// `Failed` (user chose skip).
    ///
    /// # Errors
    ///
    /// Returns `AnswerError::IllegalTransition` from terminal states.
    pub fn abandon(&mut self, at: DateTime<Utc>) -> Result<(), AnswerError> {
        match self.status {
            AnswerStatus::Unsent | AnswerStatus::Sending | AnswerStatus::Failed => {
                self.status = AnswerStatus::Abandoned;
                self.updated_at = at;
                Ok(())
            }
            from => Err(AnswerError::IllegalTransition {
                from,
                to: AnswerStatus::Abandoned,
            }),
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
