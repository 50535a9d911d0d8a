use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::ids::{SessionId, UserId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ScoreError {
    #[error("correct count {correct} exceeds total {total}")]
    CorrectExceedsTotal { correct: u32, total: u32 },

    #[error("persisted score {stored} does not match recomputed {computed}")]
    Mismatch { stored: u8, computed: u8 },

    #[error("completed_at is before started_at")]
    InvalidTimeRange,
}

//
// ─── SESSION SCORE ─────────────────────────────────────────────────────────────
//

/// The one true aggregate score of a session.
///
/// `score` is always the round-half-up percentage of `correct` over `total`,
/// an integer in `[0, 100]`, and `0` when nothing was sent. Persisting the raw
/// correct count as "the score" is exactly the historical bug this type
/// exists to make unrepresentable: there is no way to construct a
/// `SessionScore` whose `score` field is anything but the percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionScore {
    score: u8,
    correct: u32,
    total: u32,
}

impl SessionScore {
    /// Computes the score from sent-answer tallies.
    ///
    /// # Errors
    ///
    /// Returns `ScoreError::CorrectExceedsTotal` when the tallies are
    /// inconsistent.
    pub fn from_tallies(correct: u32, total: u32) -> Result<Self, ScoreError> {
        if correct > total {
            return Err(ScoreError::CorrectExceedsTotal { correct, total });
        }
        Ok(Self {
            score: percentage(correct, total),
            correct,
            total,
        })
    }

    /// Rehydrates a score from storage, re-verifying the percentage.
    ///
    /// # Errors
    ///
    /// Returns `ScoreError::Mismatch` when the stored score is not the
    /// percentage of the stored tallies.
    pub fn from_persisted(score: u8, correct: u32, total: u32) -> Result<Self, ScoreError> {
        let recomputed = Self::from_tallies(correct, total)?;
        if recomputed.score != score {
            return Err(ScoreError::Mismatch {
                stored: score,
                computed: recomputed.score,
            });
        }
        Ok(recomputed)
    }

    #[must_use]
    pub fn score(&self) -> u8 {
        self.score
    }

    #[must_use]
    pub fn correct(&self) -> u32 {
        self.correct
    }

    #[must_use]
    pub fn total(&self) -> u32 {
        self.total
    }
}

/// Round-half-up percentage, 0 for an empty session.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn percentage(correct: u32, total: u32) -> u8 {
    if total == 0 {
        return 0;
    }
    // u32 values are exact in f64, and the result is bounded by 100.
    (f64::from(correct) * 100.0 / f64::from(total)).round() as u8
}

//
// ─── SESSION RESULT ────────────────────────────────────────────────────────────
//

/// Persisted outcome of a completed (or aborted) session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionResult {
    session_id: SessionId,
    user_id: UserId,
    score: SessionScore,
    started_at: DateTime<Utc>,
    completed_at: DateTime<Utc>,
}

impl SessionResult {
    /// Builds a result row.
    ///
    /// # Errors
    ///
    /// Returns `ScoreError::InvalidTimeRange` if `completed_at` precedes
    /// `started_at`.
    pub fn new(
        session_id: SessionId,
        user_id: UserId,
        score: SessionScore,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    ) -> Result<Self, ScoreError> {
        if completed_at < started_at {
            return Err(ScoreError::InvalidTimeRange);
        }
        Ok(Self {
            session_id,
            user_id,
            score,
            started_at,
            completed_at,
        })
    }

    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn score(&self) -> SessionScore {
        self.score
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn completed_at(&self) -> DateTime<Utc> {
        self.completed_at
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;
    use chrono::Duration;

    // The regression set for the historical "persisted 56 instead of 93" bug.
    #[test]
    fn score_is_a_percentage_never_a_raw_count() {
        let cases = [
            (56, 60, 93),
            (11, 15, 73),
            (38, 42, 90),
            (1, 1, 100),
            (1, 51, 2),
            (0, 63, 0),
        ];
        for (correct, total, expected) in cases {
            let score = SessionScore::from_tallies(correct, total).unwrap();
            assert_eq!(score.score(), expected, "{correct}/{total}");
        }
        // the bug persisted the raw correct count as the score
        assert_ne!(u32::from(SessionScore::from_tallies(56, 60).unwrap().score()), 56);
        assert_ne!(u32::from(SessionScore::from_tallies(11, 15).unwrap().score()), 11);
        assert_ne!(u32::from(SessionScore::from_tallies(38, 42).unwrap().score()), 38);
    }

    #[test]
    fn empty_session_scores_zero() {
        let score = SessionScore::from_tallies(0, 0).unwrap();
        assert_eq!(score.score(), 0);
        assert_eq!(score.total(), 0);
    }

    #[test]
    fn rounding_is_half_up() {
        // 1/8 = 12.5 -> 13
        assert_eq!(SessionScore::from_tallies(1, 8).unwrap().score(), 13);
        // 3/8 = 37.5 -> 38
        assert_eq!(SessionScore::from_tallies(3, 8).unwrap().score(), 38);
    }

    #[test]
    fn tallies_must_be_consistent() {
        assert!(matches!(
            SessionScore::from_tallies(5, 3),
            Err(ScoreError::CorrectExceedsTotal {
                correct: 5,
                total: 3
            })
        ));
    }

    #[test]
    fn from_persisted_rejects_tampered_score() {
        assert!(SessionScore::from_persisted(93, 56, 60).is_ok());
        assert!(matches!(
            SessionScore::from_persisted(56, 56, 60),
            Err(ScoreError::Mismatch {
                stored: 56,
                computed: 93
            })
        ));
    }

    #[test]
    fn result_rejects_inverted_time_range() {
        let now = fixed_now();
        let score = SessionScore::from_tallies(2, 4).unwrap();
        let err = SessionResult::new(
            SessionId::generate(),
            UserId::new(1),
            score,
            now,
            now - Duration::minutes(1),
        )
        .unwrap_err();
        assert_eq!(err, ScoreError::InvalidTimeRange);
    }
}
