use std::sync::Arc;

use exam_core::model::{AnswerOutcome, ItemId, SessionScore};
use storage::repository::ItemPoolRepository;

use super::session::ExamSession;
use crate::error::SessionError;

/// The sole component allowed to read answer keys and emit scores.
///
/// Grading happens here when an answer settles as sent; the final score is
/// computed here once the pipeline has drained. No other code path touches
/// `correct_option` or produces a persisted score value.
#[derive(Clone)]
pub struct ScoreAggregator {
    pool: Arc<dyn ItemPoolRepository>,
}

impl ScoreAggregator {
    #[must_use]
    pub fn new(pool: Arc<dyn ItemPoolRepository>) -> Self {
        Self { pool }
    }

    /// Grade one delivered answer against the catalog key.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the key lookup fails.
    pub async fn grade(
        &self,
        item_id: ItemId,
        chosen_option: u32,
    ) -> Result<AnswerOutcome, SessionError> {
        let correct = self.pool.correct_option(item_id).await?;
        Ok(AnswerOutcome::from_correct(correct == chosen_option))
    }

    /// Compute the final score over terminal answers.
    ///
    /// Only `sent` answers count toward either tally; abandoned answers are
    /// excluded from both. Calling this while any answer is unsettled is a
    /// programmer error, asserted and reported as `SessionError::Invariant`.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Invariant` when the pipeline has not drained or
    /// the tallies disagree with the ledger.
    pub fn aggregate(&self, session: &ExamSession) -> Result<SessionScore, SessionError> {
        if session.ledger().has_in_flight() {
            debug_assert!(false, "scoring with attempts still in flight");
            return Err(SessionError::Invariant(
                "cannot score while attempts are in flight".into(),
            ));
        }
        let unsettled = session
            .ledger()
            .answers()
            .filter(|answer| !answer.is_terminal())
            .count();
        if unsettled > 0 {
            debug_assert!(false, "scoring with {unsettled} unsettled answers");
            return Err(SessionError::Invariant(format!(
                "cannot score with {unsettled} unsettled answers"
            )));
        }

        let sent = session.ledger().sent_count();
        if session.running_total() as usize != sent {
            return Err(SessionError::Invariant(format!(
                "running total {} disagrees with {} sent answers",
                session.running_total(),
                sent
            )));
        }

        let score =
            SessionScore::from_tallies(session.running_correct(), session.running_total())?;
        Ok(score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exam_core::model::Difficulty;
    use storage::repository::{InMemoryRepository, ItemRecord};

    fn build_record(id: u64, correct_option: u32) -> ItemRecord {
        ItemRecord {
            id: ItemId::new(id),
            category: "math".to_string(),
            topic: "fractions".to_string(),
            difficulty: Difficulty::Medium,
            prompt: format!("Q{id}"),
            options: vec!["a".to_string(), "b".to_string(), "c".to_string()],
            figure: None,
            correct_option,
        }
    }

    #[tokio::test]
    async fn grade_compares_against_the_key() {
        let repo = InMemoryRepository::new();
        repo.upsert_item(&build_record(1, 2)).await.unwrap();

        let aggregator = ScoreAggregator::new(Arc::new(repo));
        assert_eq!(
            aggregator.grade(ItemId::new(1), 2).await.unwrap(),
            AnswerOutcome::Correct
        );
        assert_eq!(
            aggregator.grade(ItemId::new(1), 0).await.unwrap(),
            AnswerOutcome::Incorrect
        );
    }

    #[tokio::test]
    async fn grade_surfaces_missing_items() {
        let aggregator = ScoreAggregator::new(Arc::new(InMemoryRepository::new()));
        assert!(matches!(
            aggregator.grade(ItemId::new(404), 0).await,
            Err(SessionError::Storage(_))
        ));
    }
}
