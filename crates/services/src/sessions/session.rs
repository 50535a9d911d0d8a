use std::fmt;

use chrono::{DateTime, Utc};

use exam_core::model::{AnswerOutcome, Item, ItemId, SessionId, SessionScore, UserId};

use super::difficulty::{DifficultyController, Pace};
use super::plan::SessionPlan;
use super::progress::SessionProgress;
use super::submission::AnswerLedger;

/// In-memory state of one exam session.
///
/// Holds the plan, the serving cursor, the running tallies and the pace
/// controller. `running_total` counts sent answers only; abandoned answers
/// never enter either tally.
pub struct ExamSession {
    id: SessionId,
    user_id: UserId,
    plan: SessionPlan,
    current: usize,
    running_correct: u32,
    running_total: u32,
    controller: DifficultyController,
    ledger: AnswerLedger,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    final_score: Option<SessionScore>,
    result_id: Option<i64>,
}

impl ExamSession {
    pub(crate) fn new(user_id: UserId, plan: SessionPlan, started_at: DateTime<Utc>) -> Self {
        let id = SessionId::generate();
        let controller = DifficultyController::for_session_len(plan.len());
        Self {
            id,
            user_id,
            plan,
            current: 0,
            running_correct: 0,
            running_total: 0,
            controller,
            ledger: AnswerLedger::new(id),
            started_at,
            completed_at: None,
            final_score: None,
            result_id: None,
        }
    }

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn plan(&self) -> &SessionPlan {
        &self.plan
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    #[must_use]
    pub fn final_score(&self) -> Option<SessionScore> {
        self.final_score
    }

    #[must_use]
    pub fn result_id(&self) -> Option<i64> {
        self.result_id
    }

    #[must_use]
    pub fn running_correct(&self) -> u32 {
        self.running_correct
    }

    /// Count of answers that reached `sent`.
    #[must_use]
    pub fn running_total(&self) -> u32 {
        self.running_total
    }

    #[must_use]
    pub fn pace(&self) -> Pace {
        self.controller.pace()
    }

    #[must_use]
    pub fn ledger(&self) -> &AnswerLedger {
        &self.ledger
    }

    pub(crate) fn ledger_mut(&mut self) -> &mut AnswerLedger {
        &mut self.ledger
    }

    /// The item currently being served, if any remain.
    #[must_use]
    pub fn current_item(&self) -> Option<&Item> {
        self.plan.get(self.current).map(|entry| entry.item())
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.completed_at.is_some()
    }

    /// True once every buffered answer is terminal and nothing is in flight.
    #[must_use]
    pub fn is_drained(&self) -> bool {
        self.ledger.all_terminal() && !self.ledger.has_in_flight()
    }

    #[must_use]
    pub fn progress(&self) -> SessionProgress {
        let total = self.plan.len();
        let answered = self.ledger.len();
        SessionProgress {
            total,
            answered,
            remaining: total.saturating_sub(answered),
            is_complete: self.is_complete(),
        }
    }

    /// Move the cursor past the item just submitted, when it was the one
    /// being served. Retries of earlier items leave the cursor alone.
    pub(crate) fn advance_past(&mut self, item: ItemId) {
        if self
            .plan
            .get(self.current)
            .is_some_and(|entry| entry.item().id() == item)
        {
            self.current += 1;
        }
    }

    /// Record a delivered, graded answer: update tallies, feed the pace
    /// controller, and re-bias the unserved tail on a transition.
    pub(crate) fn apply_sent(&mut self, outcome: AnswerOutcome) {
        self.running_total += 1;
        if outcome.is_correct() {
            self.running_correct += 1;
        }
        debug_assert_eq!(
            self.running_total as usize,
            self.ledger.sent_count(),
            "running_total must equal the number of sent answers"
        );

        if let Some(change) = self.controller.observe(outcome.is_correct()) {
            tracing::info!(
                session = %self.id,
                from = ?change.from,
                to = ?change.to,
                accuracy = change.accuracy,
                "session pace changed"
            );
            match change.to {
                Pace::Eased => self.plan.ease_tail(self.current),
                Pace::Normal => self.plan.restore_tail(self.current),
            }
        }
    }

    pub(crate) fn mark_completed(&mut self, score: SessionScore, at: DateTime<Utc>) {
        self.completed_at = Some(at);
        self.final_score = Some(score);
    }

    pub(crate) fn set_result_id(&mut self, id: i64) {
        self.result_id = Some(id);
    }
}

impl fmt::Debug for ExamSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExamSession")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("plan_len", &self.plan.len())
            .field("current", &self.current)
            .field("running_correct", &self.running_correct)
            .field("running_total", &self.running_total)
            .field("pace", &self.controller.pace())
            .field("started_at", &self.started_at)
            .field("completed_at", &self.completed_at)
            .finish_non_exhaustive()
    }
}
