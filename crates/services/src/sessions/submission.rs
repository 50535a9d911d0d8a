use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;

use exam_core::model::{AnswerStatus, ItemId, PendingAnswer, SessionId, UserId};
use storage::repository::AnswerSpoolRepository;

use crate::error::{RemoteSinkError, SessionError};
use crate::remote::{AnswerEnvelope, RemoteAnswerSink};

const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(10);

/// The user's three choices when a remote write fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Re-attempt delivery now.
    Retry,
    /// Mark abandoned, keep the local copy, continue the session.
    Skip,
    /// End the session, preserving all local copies for reconciliation.
    Abort,
}

/// Surfaced when an answer needs a recovery decision.
///
/// The answer is already safe in the local buffer whatever the user picks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryPrompt {
    pub item_id: ItemId,
    pub item_index: usize,
    pub attempts: u32,
}

/// Outcome of settling one remote attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptResolution {
    Delivered(ItemId),
    NeedsDecision(RecoveryPrompt),
}

/// Per-session answer records plus their in-flight delivery attempts.
///
/// The session owning this ledger is the buffer's single writer; nothing else
/// mutates these records.
pub struct AnswerLedger {
    session_id: SessionId,
    answers: BTreeMap<ItemId, PendingAnswer>,
    in_flight: HashMap<ItemId, JoinHandle<Result<(), RemoteSinkError>>>,
}

impl AnswerLedger {
    #[must_use]
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            answers: BTreeMap::new(),
            in_flight: HashMap::new(),
        }
    }

    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    #[must_use]
    pub fn answer(&self, item_id: ItemId) -> Option<&PendingAnswer> {
        self.answers.get(&item_id)
    }

    pub fn answers(&self) -> impl Iterator<Item = &PendingAnswer> {
        self.answers.values()
    }

    /// Number of buffered answers, terminal or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.answers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }

    #[must_use]
    pub fn sent_count(&self) -> usize {
        self.answers
            .values()
            .filter(|a| a.status() == AnswerStatus::Sent)
            .count()
    }

    #[must_use]
    pub fn all_terminal(&self) -> bool {
        self.answers.values().all(PendingAnswer::is_terminal)
    }

    #[must_use]
    pub fn has_in_flight(&self) -> bool {
        !self.in_flight.is_empty()
    }

    /// Lowest-item-id in-flight attempt, for a deterministic drain order.
    #[must_use]
    pub fn next_in_flight(&self) -> Option<ItemId> {
        self.in_flight.keys().min().copied()
    }

    /// First answer still awaiting a recovery decision.
    #[must_use]
    pub fn next_failed(&self) -> Option<&PendingAnswer> {
        self.answers
            .values()
            .find(|a| a.status() == AnswerStatus::Failed)
    }
}

impl std::fmt::Debug for AnswerLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnswerLedger")
            .field("session_id", &self.session_id)
            .field("answers_len", &self.answers.len())
            .field("in_flight", &self.in_flight.len())
            .finish_non_exhaustive()
    }
}

/// Local-first delivery pipeline.
///
/// Every answer lands in the durable session buffer before its remote attempt
/// launches; the remote write runs as a detached task bounded by a timeout,
/// and the session keeps moving while it is in flight.
#[derive(Clone)]
pub struct AnswerPipeline {
    spool: Arc<dyn AnswerSpoolRepository>,
    sink: Arc<dyn RemoteAnswerSink>,
    attempt_timeout: Duration,
}

impl AnswerPipeline {
    #[must_use]
    pub fn new(spool: Arc<dyn AnswerSpoolRepository>, sink: Arc<dyn RemoteAnswerSink>) -> Self {
        Self {
            spool,
            sink,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }

    /// Bound each remote attempt; a timeout follows the same failure path as
    /// any sink error.
    #[must_use]
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Buffer a new answer locally, then launch its first remote attempt.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::AnswerSettled` if an answer for the item already
    /// exists, or a storage error if the buffer write fails. The buffer write
    /// happens strictly before the remote attempt.
    pub async fn submit(
        &self,
        ledger: &mut AnswerLedger,
        user_id: UserId,
        item_id: ItemId,
        chosen_option: u32,
        now: DateTime<Utc>,
    ) -> Result<(), SessionError> {
        if ledger.answers.contains_key(&item_id) {
            return Err(SessionError::AnswerSettled(item_id));
        }

        let mut answer = PendingAnswer::new(item_id, chosen_option, now);
        self.spool.upsert_answer(ledger.session_id, &answer).await?;

        answer.begin_attempt(now)?;
        self.spool.upsert_answer(ledger.session_id, &answer).await?;

        let envelope = AnswerEnvelope {
            session_id: ledger.session_id,
            user_id,
            item_id,
            chosen_option,
            attempt: answer.attempts(),
            submitted_at: now,
        };
        ledger.answers.insert(item_id, answer);
        self.launch(ledger, envelope);

        Ok(())
    }

    /// Re-attempt delivery of a failed answer.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::UnknownItem` if no answer exists, or an
    /// `AnswerError` if the record is not in a retryable state.
    pub async fn retry(
        &self,
        ledger: &mut AnswerLedger,
        user_id: UserId,
        item_id: ItemId,
        now: DateTime<Utc>,
    ) -> Result<(), SessionError> {
        let answer = ledger
            .answers
            .get_mut(&item_id)
            .ok_or(SessionError::UnknownItem(item_id))?;

        answer.begin_attempt(now)?;
        self.spool.upsert_answer(ledger.session_id, answer).await?;

        let envelope = AnswerEnvelope {
            session_id: ledger.session_id,
            user_id,
            item_id,
            chosen_option: answer.chosen_option(),
            attempt: answer.attempts(),
            submitted_at: now,
        };
        self.launch(ledger, envelope);

        Ok(())
    }

    fn launch(&self, ledger: &mut AnswerLedger, envelope: AnswerEnvelope) {
        let sink = Arc::clone(&self.sink);
        let timeout = self.attempt_timeout;
        let item_id = envelope.item_id;

        let handle = tokio::spawn(async move {
            match tokio::time::timeout(timeout, sink.push(&envelope)).await {
                Ok(result) => result,
                Err(_) => Err(RemoteSinkError::Timeout(timeout)),
            }
        });
        ledger.in_flight.insert(item_id, handle);
    }

    /// Await one in-flight attempt and record its outcome.
    ///
    /// On failure the answer becomes `Failed` (still buffered locally) and a
    /// recovery prompt is returned for the caller to surface.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Invariant` if no attempt is in flight for the
    /// item, or a storage error if the buffer update fails.
    pub async fn settle(
        &self,
        ledger: &mut AnswerLedger,
        item_id: ItemId,
        item_index: usize,
        now: DateTime<Utc>,
    ) -> Result<AttemptResolution, SessionError> {
        let handle = ledger.in_flight.remove(&item_id).ok_or_else(|| {
            SessionError::Invariant(format!("no in-flight attempt for item {item_id}"))
        })?;

        let result = match handle.await {
            Ok(result) => result,
            Err(join_err) => {
                tracing::warn!(item = %item_id, error = %join_err, "remote attempt task died");
                Err(RemoteSinkError::Interrupted)
            }
        };

        let answer = ledger.answers.get_mut(&item_id).ok_or_else(|| {
            SessionError::Invariant(format!("in-flight attempt without a record: {item_id}"))
        })?;

        match result {
            Ok(()) => {
                answer.mark_sent(now)?;
                self.spool.upsert_answer(ledger.session_id, answer).await?;
                Ok(AttemptResolution::Delivered(item_id))
            }
            Err(err) => {
                answer.mark_failed(now)?;
                self.spool.upsert_answer(ledger.session_id, answer).await?;
                tracing::warn!(
                    item = %item_id,
                    attempts = answer.attempts(),
                    error = %err,
                    "remote answer write failed; answer kept in local buffer"
                );
                Ok(AttemptResolution::NeedsDecision(RecoveryPrompt {
                    item_id,
                    item_index,
                    attempts: answer.attempts(),
                }))
            }
        }
    }

    /// Mark a failed answer abandoned, keeping its local copy.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::UnknownItem` if no answer exists, or an
    /// `AnswerError` from a non-abandonable state.
    pub async fn skip(
        &self,
        ledger: &mut AnswerLedger,
        item_id: ItemId,
        now: DateTime<Utc>,
    ) -> Result<(), SessionError> {
        let answer = ledger
            .answers
            .get_mut(&item_id)
            .ok_or(SessionError::UnknownItem(item_id))?;
        answer.abandon(now)?;
        self.spool.upsert_answer(ledger.session_id, answer).await?;
        Ok(())
    }

    /// Stop awaiting every in-flight attempt and abandon all non-terminal
    /// answers.
    ///
    /// The spawned attempt tasks are detached, not killed: a write that
    /// already fired may still land remotely. Local copies are never
    /// discarded.
    ///
    /// # Errors
    ///
    /// Returns a storage error if a buffer update fails.
    pub async fn abort(
        &self,
        ledger: &mut AnswerLedger,
        now: DateTime<Utc>,
    ) -> Result<(), SessionError> {
        ledger.in_flight.clear();

        for answer in ledger.answers.values_mut() {
            if !answer.is_terminal() {
                answer.abandon(now)?;
                self.spool.upsert_answer(ledger.session_id, answer).await?;
            }
        }
        Ok(())
    }

    /// Drop the session's buffer rows after a successful completion.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the delete fails.
    pub async fn clear(&self, ledger: &AnswerLedger) -> Result<(), SessionError> {
        self.spool.clear_session(ledger.session_id).await?;
        Ok(())
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
