use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::ids::{ItemId, UserId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ExposureError {
    #[error("unknown answer outcome: {0}")]
    UnknownOutcome(String),
}

//
// ─── OUTCOME ───────────────────────────────────────────────────────────────────
//

/// Result of a user's answer to a multiple-choice item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerOutcome {
    Correct,
    Incorrect,
}

impl AnswerOutcome {
    #[must_use]
    pub fn from_correct(correct: bool) -> Self {
        if correct {
            Self::Correct
        } else {
            Self::Incorrect
        }
    }

    #[must_use]
    pub fn is_correct(self) -> bool {
        matches!(self, Self::Correct)
    }

    /// Stable string form used for persistence.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Correct => "correct",
            Self::Incorrect => "incorrect",
        }
    }
}

impl fmt::Display for AnswerOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnswerOutcome {
    type Err = ExposureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "correct" => Ok(Self::Correct),
            "incorrect" => Ok(Self::Incorrect),
            other => Err(ExposureError::UnknownOutcome(other.to_string())),
        }
    }
}

//
// ─── EXPOSURE RECORD ───────────────────────────────────────────────────────────
//

/// Last-seen record for a (user, item) pair.
///
/// This is a keyed cache, not a history: each later answer to the same item
/// overwrites `last_seen_at` and `last_outcome` in place. Bounded memory is
/// the point; interval-growing spaced repetition over full answer logs is a
/// documented extension, not something this record tries to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExposureRecord {
    user_id: UserId,
    item_id: ItemId,
    last_seen_at: DateTime<Utc>,
    last_outcome: AnswerOutcome,
}

impl ExposureRecord {
    #[must_use]
    pub fn new(
        user_id: UserId,
        item_id: ItemId,
        last_seen_at: DateTime<Utc>,
        last_outcome: AnswerOutcome,
    ) -> Self {
        Self {
            user_id,
            item_id,
            last_seen_at,
            last_outcome,
        }
    }

    /// Overwrites the record with a newer exposure.
    pub fn touch(&mut self, outcome: AnswerOutcome, at: DateTime<Utc>) {
        self.last_seen_at = at;
        self.last_outcome = outcome;
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn item_id(&self) -> ItemId {
        self.item_id
    }

    #[must_use]
    pub fn last_seen_at(&self) -> DateTime<Utc> {
        self.last_seen_at
    }

    #[must_use]
    pub fn last_outcome(&self) -> AnswerOutcome {
        self.last_outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;
    use chrono::Duration;

    #[test]
    fn touch_overwrites_in_place() {
        let now = fixed_now();
        let mut record = ExposureRecord::new(
            UserId::new(1),
            ItemId::new(10),
            now,
            AnswerOutcome::Incorrect,
        );

        let later = now + Duration::hours(2);
        record.touch(AnswerOutcome::Correct, later);

        assert_eq!(record.last_seen_at(), later);
        assert_eq!(record.last_outcome(), AnswerOutcome::Correct);
        assert_eq!(record.item_id(), ItemId::new(10));
    }

    #[test]
    fn outcome_round_trips_as_str() {
        for outcome in [AnswerOutcome::Correct, AnswerOutcome::Incorrect] {
            assert_eq!(outcome.as_str().parse::<AnswerOutcome>().unwrap(), outcome);
        }
        assert!("maybe".parse::<AnswerOutcome>().is_err());
    }

    #[test]
    fn outcome_from_correct() {
        assert!(AnswerOutcome::from_correct(true).is_correct());
        assert!(!AnswerOutcome::from_correct(false).is_correct());
    }
}
