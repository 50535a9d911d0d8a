use std::sync::Arc;
use std::time::Duration;

use exam_core::model::{
    AnswerStatus, ItemId, PendingAnswer, SessionResult, SessionScore, UserId,
};
use exam_core::time::Clock;
use storage::repository::{
    AnswerSpoolRepository, ExposureRepository, ItemPoolRepository, SessionResultRepository,
};

use super::plan::SessionAssembler;
use super::score::ScoreAggregator;
use super::session::ExamSession;
use super::submission::{AnswerPipeline, AttemptResolution, RecoveryAction, RecoveryPrompt};
use crate::error::SessionError;
use crate::exposure::ExposureTracker;
use crate::remote::RemoteAnswerSink;

/// A persisted, finished session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletedSession {
    pub result_id: i64,
    pub score: SessionScore,
}

/// What `complete_session` produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionOutcome {
    /// Every answer reached a terminal state; the score is persisted and the
    /// local buffer cleared.
    Completed(CompletedSession),
    /// A failed answer still needs a retry/skip/abort decision.
    NeedsDecision(RecoveryPrompt),
}

/// Orchestrates session assembly, optimistic submission and completion.
#[derive(Clone)]
pub struct ExamLoopService {
    clock: Clock,
    pool: Arc<dyn ItemPoolRepository>,
    tracker: ExposureTracker,
    pipeline: AnswerPipeline,
    results: Arc<dyn SessionResultRepository>,
    aggregator: ScoreAggregator,
    tie_break_seed: Option<u64>,
}

impl ExamLoopService {
    #[must_use]
    pub fn new(
        clock: Clock,
        pool: Arc<dyn ItemPoolRepository>,
        exposures: Arc<dyn ExposureRepository>,
        spool: Arc<dyn AnswerSpoolRepository>,
        results: Arc<dyn SessionResultRepository>,
        sink: Arc<dyn RemoteAnswerSink>,
    ) -> Self {
        Self {
            clock,
            pool: Arc::clone(&pool),
            tracker: ExposureTracker::new(exposures),
            pipeline: AnswerPipeline::new(spool, sink),
            results,
            aggregator: ScoreAggregator::new(pool),
            tie_break_seed: None,
        }
    }

    /// Shuffle fresh candidates with an explicit, reported seed.
    #[must_use]
    pub fn with_tie_break_seed(mut self, seed: u64) -> Self {
        self.tie_break_seed = Some(seed);
        self
    }

    /// Bound each remote attempt with this timeout.
    #[must_use]
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.pipeline = self.pipeline.with_attempt_timeout(timeout);
        self
    }

    /// Assemble and start a session.
    ///
    /// A pool smaller than `size` yields a smaller session; an exhausted pool
    /// is reported on the plan, not an error. Exposure-store outages fail
    /// open to never-seen.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` only when the catalog itself cannot be
    /// listed.
    pub async fn start_session(
        &self,
        user_id: UserId,
        category: Option<&str>,
        size: usize,
    ) -> Result<ExamSession, SessionError> {
        let pool_items = self.pool.list_items(category).await?;
        let classified = self.tracker.classify(user_id, pool_items).await;

        let mut assembler = SessionAssembler::new();
        if let Some(seed) = self.tie_break_seed {
            assembler = assembler.with_tie_break_seed(seed);
        }
        let plan = assembler.build(classified, size);

        if plan.pool_exhausted() {
            tracing::warn!(
                user = %user_id,
                requested = size,
                planned = plan.len(),
                "item pool exhausted; serving a smaller session"
            );
        }
        tracing::debug!(
            user = %user_id,
            planned = plan.len(),
            fresh = plan.fresh_selected(),
            repeats = plan.repeat_selected(),
            "session plan assembled"
        );

        Ok(ExamSession::new(user_id, plan, self.clock.now()))
    }

    /// Submit an answer: buffer locally, launch the remote attempt, advance.
    ///
    /// Returns a snapshot of the buffered answer. Resubmitting an item that
    /// already reached `sent` returns the existing record unchanged; a failed
    /// item is re-attempted.
    ///
    /// # Errors
    ///
    /// Returns `SessionError` for unknown items, out-of-range options,
    /// in-flight or abandoned answers, completed sessions, and buffer
    /// failures.
    pub async fn submit_answer(
        &self,
        session: &mut ExamSession,
        item_id: ItemId,
        option: u32,
    ) -> Result<PendingAnswer, SessionError> {
        if session.is_complete() {
            return Err(SessionError::Completed);
        }
        let Some(index) = session.plan().position(item_id) else {
            return Err(SessionError::UnknownItem(item_id));
        };
        let option_count = session
            .plan()
            .get(index)
            .map(|entry| entry.item().content().option_count())
            .unwrap_or_default();
        if option as usize >= option_count {
            return Err(SessionError::InvalidOption { item_id, option });
        }

        let user_id = session.user_id();
        let now = self.clock.now();

        match session.ledger().answer(item_id).map(PendingAnswer::status) {
            // sole source of truth once sent; never double-counted
            Some(AnswerStatus::Sent) => {
                return session
                    .ledger()
                    .answer(item_id)
                    .cloned()
                    .ok_or_else(|| SessionError::Invariant("sent answer vanished".into()));
            }
            Some(AnswerStatus::Sending) => return Err(SessionError::AnswerInFlight(item_id)),
            Some(AnswerStatus::Abandoned) => return Err(SessionError::AnswerSettled(item_id)),
            Some(AnswerStatus::Failed) => {
                self.pipeline
                    .retry(session.ledger_mut(), user_id, item_id, now)
                    .await?;
            }
            Some(AnswerStatus::Unsent) | None => {
                self.pipeline
                    .submit(session.ledger_mut(), user_id, item_id, option, now)
                    .await?;
                session.advance_past(item_id);
            }
        }

        session
            .ledger()
            .answer(item_id)
            .cloned()
            .ok_or_else(|| SessionError::Invariant("submitted answer missing from ledger".into()))
    }

    /// Settle the oldest in-flight attempt, if any.
    ///
    /// On success the answer is graded, the tallies and pace controller are
    /// updated, and the exposure record is overwritten. On failure a recovery
    /// prompt is returned.
    ///
    /// # Errors
    ///
    /// Returns `SessionError` on grading or buffer failures.
    pub async fn pump(
        &self,
        session: &mut ExamSession,
    ) -> Result<Option<RecoveryPrompt>, SessionError> {
        let Some(item_id) = session.ledger().next_in_flight() else {
            return Ok(None);
        };
        self.settle(session, item_id).await
    }

    async fn settle(
        &self,
        session: &mut ExamSession,
        item_id: ItemId,
    ) -> Result<Option<RecoveryPrompt>, SessionError> {
        let index = session
            .plan()
            .position(item_id)
            .ok_or(SessionError::UnknownItem(item_id))?;
        let now = self.clock.now();

        match self
            .pipeline
            .settle(session.ledger_mut(), item_id, index, now)
            .await?
        {
            AttemptResolution::Delivered(item_id) => {
                let chosen = session
                    .ledger()
                    .answer(item_id)
                    .map(PendingAnswer::chosen_option)
                    .ok_or_else(|| {
                        SessionError::Invariant("delivered answer missing from ledger".into())
                    })?;
                let outcome = self.aggregator.grade(item_id, chosen).await?;
                session.apply_sent(outcome);
                self.tracker
                    .record_outcome(session.user_id(), item_id, outcome, now)
                    .await;
                Ok(None)
            }
            AttemptResolution::NeedsDecision(prompt) => Ok(Some(prompt)),
        }
    }

    /// Apply the user's recovery decision for a failed answer.
    ///
    /// `Retry` re-attempts now and settles the attempt before returning;
    /// `Skip` abandons the answer but keeps its local copy; `Abort` ends the
    /// session (see `abort_session`).
    ///
    /// # Errors
    ///
    /// Returns `SessionError` on illegal states or storage failures.
    pub async fn resolve(
        &self,
        session: &mut ExamSession,
        item_id: ItemId,
        action: RecoveryAction,
    ) -> Result<Option<RecoveryPrompt>, SessionError> {
        match action {
            RecoveryAction::Retry => {
                let now = self.clock.now();
                let user_id = session.user_id();
                self.pipeline
                    .retry(session.ledger_mut(), user_id, item_id, now)
                    .await?;
                self.settle(session, item_id).await
            }
            RecoveryAction::Skip => {
                self.pipeline
                    .skip(session.ledger_mut(), item_id, self.clock.now())
                    .await?;
                Ok(None)
            }
            RecoveryAction::Abort => {
                self.abort_session(session).await?;
                Ok(None)
            }
        }
    }

    /// Complete the session: drain the pipeline, aggregate, persist, clear.
    ///
    /// If a failed answer still needs a decision, returns `NeedsDecision`
    /// instead; resolve it and call again. Calling on an already-completed
    /// session returns the stored outcome.
    ///
    /// # Errors
    ///
    /// Returns `SessionError` on grading, aggregation or persistence
    /// failures.
    pub async fn complete_session(
        &self,
        session: &mut ExamSession,
    ) -> Result<CompletionOutcome, SessionError> {
        if session.is_complete() {
            return Self::stored_outcome(session);
        }

        // Drain: every in-flight attempt settles (each bounded by the attempt
        // timeout), failures surface as decisions.
        while let Some(item_id) = session.ledger().next_in_flight() {
            if let Some(prompt) = self.settle(session, item_id).await? {
                return Ok(CompletionOutcome::NeedsDecision(prompt));
            }
        }
        if let Some(failed) = session.ledger().next_failed() {
            let item_id = failed.item_id();
            let attempts = failed.attempts();
            let item_index = session
                .plan()
                .position(item_id)
                .ok_or(SessionError::UnknownItem(item_id))?;
            return Ok(CompletionOutcome::NeedsDecision(RecoveryPrompt {
                item_id,
                item_index,
                attempts,
            }));
        }

        let score = self.aggregator.aggregate(session)?;
        let now = self.clock.now();
        let result = SessionResult::new(
            session.id(),
            session.user_id(),
            score,
            session.started_at(),
            now,
        )?;
        let result_id = self.results.append_result(&result).await?;
        session.mark_completed(score, now);
        session.set_result_id(result_id);

        if let Err(err) = self.pipeline.clear(session.ledger()).await {
            tracing::warn!(
                session = %session.id(),
                error = %err,
                "completed session buffer could not be cleared"
            );
        }

        tracing::info!(
            session = %session.id(),
            score = score.score(),
            correct = score.correct(),
            total = score.total(),
            "session completed"
        );
        Ok(CompletionOutcome::Completed(CompletedSession {
            result_id,
            score,
        }))
    }

    /// Abort the session: stop awaiting in-flight attempts, abandon every
    /// non-terminal answer, persist the score over what was sent.
    ///
    /// The local buffer is intentionally NOT cleared; the rows stay for an
    /// external reconciliation pass.
    ///
    /// # Errors
    ///
    /// Returns `SessionError` on aggregation or persistence failures.
    pub async fn abort_session(
        &self,
        session: &mut ExamSession,
    ) -> Result<CompletedSession, SessionError> {
        if session.is_complete() {
            return Err(SessionError::Completed);
        }

        let now = self.clock.now();
        self.pipeline.abort(session.ledger_mut(), now).await?;

        let score = self.aggregator.aggregate(session)?;
        let result = SessionResult::new(
            session.id(),
            session.user_id(),
            score,
            session.started_at(),
            now,
        )?;
        let result_id = self.results.append_result(&result).await?;
        session.mark_completed(score, now);
        session.set_result_id(result_id);

        tracing::info!(
            session = %session.id(),
            score = score.score(),
            total = score.total(),
            "session aborted; local answers preserved"
        );
        Ok(CompletedSession { result_id, score })
    }

    fn stored_outcome(session: &ExamSession) -> Result<CompletionOutcome, SessionError> {
        match (session.result_id(), session.final_score()) {
            (Some(result_id), Some(score)) => Ok(CompletionOutcome::Completed(CompletedSession {
                result_id,
                score,
            })),
            _ => Err(SessionError::Completed),
        }
    }
}
