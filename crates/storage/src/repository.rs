use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use thiserror::Error;

use exam_core::model::{
    AnswerOutcome, Difficulty, ExposureRecord, Item, ItemContent, ItemError, ItemId, PendingAnswer,
    SessionId, SessionResult, UserId,
};

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Persisted shape for a catalog item, answer key included.
///
/// The domain `Item` never carries the correct option; this record is the only
/// place the key travels together with the content, and it stays inside the
/// storage layer.
#[derive(Debug, Clone)]
pub struct ItemRecord {
    pub id: ItemId,
    pub category: String,
    pub topic: String,
    pub difficulty: Difficulty,
    pub prompt: String,
    pub options: Vec<String>,
    pub figure: Option<String>,
    pub correct_option: u32,
}

impl ItemRecord {
    #[must_use]
    pub fn from_item(item: &Item, correct_option: u32) -> Self {
        Self {
            id: item.id(),
            category: item.category().to_owned(),
            topic: item.topic().to_owned(),
            difficulty: item.difficulty(),
            prompt: item.content().prompt().to_owned(),
            options: item.content().options().to_vec(),
            figure: item.content().figure().map(|u| u.as_str().to_owned()),
            correct_option,
        }
    }

    /// Convert the record back into a domain `Item`, dropping the answer key.
    ///
    /// # Errors
    ///
    /// Returns `ItemError` if the persisted content fails validation.
    pub fn into_item(self) -> Result<Item, ItemError> {
        let content = ItemContent::new(self.prompt, self.options, self.figure.as_deref())?;
        Item::new(self.id, self.category, self.topic, self.difficulty, content)
    }
}

/// Read-only catalog access plus the answer key lookup.
///
/// `correct_option` exists for the score aggregator alone; nothing served to
/// a session may call it.
#[async_trait]
pub trait ItemPoolRepository: Send + Sync {
    /// Persist or update a catalog item (seeding and tests; authoring is
    /// external).
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the item cannot be stored.
    async fn upsert_item(&self, record: &ItemRecord) -> Result<(), StorageError>;

    /// List catalog items in stable catalog order, optionally filtered by
    /// category. Correct options are never included.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on storage failures.
    async fn list_items(&self, category: Option<&str>) -> Result<Vec<Item>, StorageError>;

    /// Fetch the answer key for one item.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the item is missing.
    async fn correct_option(&self, item_id: ItemId) -> Result<u32, StorageError>;
}

/// Last-seen exposure store, keyed (user, item), overwrite on upsert.
#[async_trait]
pub trait ExposureRepository: Send + Sync {
    /// Fetch exposure records for the given items.
    ///
    /// Items the user has never seen simply have no record; the result may be
    /// shorter than `item_ids`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on storage failures.
    async fn exposures_for(
        &self,
        user_id: UserId,
        item_ids: &[ItemId],
    ) -> Result<Vec<ExposureRecord>, StorageError>;

    /// Insert or overwrite the single record for (user, item).
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on storage failures.
    async fn upsert_exposure(
        &self,
        user_id: UserId,
        item_id: ItemId,
        seen_at: DateTime<Utc>,
        outcome: AnswerOutcome,
    ) -> Result<(), StorageError>;
}

/// Session-scoped local durable buffer for answers.
///
/// Keyed by item id within a session, update-in-place, single writer. Rows
/// survive remote failures and are cleared only by successful completion.
#[async_trait]
pub trait AnswerSpoolRepository: Send + Sync {
    /// Insert or update the buffered answer for (session, item).
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the answer cannot be stored.
    async fn upsert_answer(
        &self,
        session_id: SessionId,
        answer: &PendingAnswer,
    ) -> Result<(), StorageError>;

    /// All buffered answers for a session, in item-id order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on storage failures.
    async fn answers_for_session(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<PendingAnswer>, StorageError>;

    /// Drop every buffered answer for a session.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on storage failures.
    async fn clear_session(&self, session_id: SessionId) -> Result<(), StorageError>;
}

/// Persisted final scores.
#[async_trait]
pub trait SessionResultRepository: Send + Sync {
    /// Append a completed session's result and return its row id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the session already has a result.
    async fn append_result(&self, result: &SessionResult) -> Result<i64, StorageError>;

    /// Fetch one result by row id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing.
    async fn get_result(&self, id: i64) -> Result<SessionResult, StorageError>;

    /// Recent results for a user, newest completion first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on storage failures.
    async fn results_for_user(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> Result<Vec<SessionResult>, StorageError>;
}

/// Simple in-memory implementation for tests and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    items: Arc<Mutex<BTreeMap<ItemId, ItemRecord>>>,
    exposures: Arc<Mutex<HashMap<(UserId, ItemId), ExposureRecord>>>,
    spool: Arc<Mutex<HashMap<SessionId, BTreeMap<ItemId, PendingAnswer>>>>,
    results: Arc<Mutex<Vec<SessionResult>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock<'a, T>(
        mutex: &'a Mutex<T>,
    ) -> Result<std::sync::MutexGuard<'a, T>, StorageError> {
        mutex
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }
}

#[async_trait]
impl ItemPoolRepository for InMemoryRepository {
    async fn upsert_item(&self, record: &ItemRecord) -> Result<(), StorageError> {
        let mut guard = Self::lock(&self.items)?;
        guard.insert(record.id, record.clone());
        Ok(())
    }

    async fn list_items(&self, category: Option<&str>) -> Result<Vec<Item>, StorageError> {
        let guard = Self::lock(&self.items)?;
        let mut out = Vec::new();
        for record in guard.values() {
            if let Some(filter) = category {
                if record.category != filter {
                    continue;
                }
            }
            let item = record
                .clone()
                .into_item()
                .map_err(|e| StorageError::Serialization(e.to_string()))?;
            out.push(item);
        }
        Ok(out)
    }

    async fn correct_option(&self, item_id: ItemId) -> Result<u32, StorageError> {
        let guard = Self::lock(&self.items)?;
        guard
            .get(&item_id)
            .map(|record| record.correct_option)
            .ok_or(StorageError::NotFound)
    }
}

#[async_trait]
impl ExposureRepository for InMemoryRepository {
    async fn exposures_for(
        &self,
        user_id: UserId,
        item_ids: &[ItemId],
    ) -> Result<Vec<ExposureRecord>, StorageError> {
        let guard = Self::lock(&self.exposures)?;
        let mut out = Vec::new();
        for item_id in item_ids {
            if let Some(record) = guard.get(&(user_id, *item_id)) {
                out.push(record.clone());
            }
        }
        Ok(out)
    }

    async fn upsert_exposure(
        &self,
        user_id: UserId,
        item_id: ItemId,
        seen_at: DateTime<Utc>,
        outcome: AnswerOutcome,
    ) -> Result<(), StorageError> {
        let mut guard = Self::lock(&self.exposures)?;
        guard
            .entry((user_id, item_id))
            .and_modify(|record| record.touch(outcome, seen_at))
            .or_insert_with(|| ExposureRecord::new(user_id, item_id, seen_at, outcome));
        Ok(())
    }
}

#[async_trait]
impl AnswerSpoolRepository for InMemoryRepository {
    async fn upsert_answer(
        &self,
        session_id: SessionId,
        answer: &PendingAnswer,
    ) -> Result<(), StorageError> {
        let mut guard = Self::lock(&self.spool)?;
        guard
            .entry(session_id)
            .or_default()
            .insert(answer.item_id(), answer.clone());
        Ok(())
    }

    async fn answers_for_session(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<PendingAnswer>, StorageError> {
        let guard = Self::lock(&self.spool)?;
        Ok(guard
            .get(&session_id)
            .map(|answers| answers.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn clear_session(&self, session_id: SessionId) -> Result<(), StorageError> {
        let mut guard = Self::lock(&self.spool)?;
        guard.remove(&session_id);
        Ok(())
    }
}

#[async_trait]
impl SessionResultRepository for InMemoryRepository {
    async fn append_result(&self, result: &SessionResult) -> Result<i64, StorageError> {
        let mut guard = Self::lock(&self.results)?;
        if guard
            .iter()
            .any(|existing| existing.session_id() == result.session_id())
        {
            return Err(StorageError::Conflict);
        }
        guard.push(result.clone());
        i64::try_from(guard.len()).map_err(|_| StorageError::Serialization("row id overflow".into()))
    }

    async fn get_result(&self, id: i64) -> Result<SessionResult, StorageError> {
        let guard = Self::lock(&self.results)?;
        let index = usize::try_from(id.checked_sub(1).ok_or(StorageError::NotFound)?)
            .map_err(|_| StorageError::NotFound)?;
        guard.get(index).cloned().ok_or(StorageError::NotFound)
    }

    async fn results_for_user(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> Result<Vec<SessionResult>, StorageError> {
        let guard = Self::lock(&self.results)?;
        let mut out: Vec<SessionResult> = guard
            .iter()
            .filter(|result| result.user_id() == user_id)
            .cloned()
            .collect();
        out.sort_by_key(|result| std::cmp::Reverse(result.completed_at()));
        out.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(out)
    }
}

/// Aggregates the engine's repositories behind trait objects for easy backend
/// swapping.
#[derive(Clone)]
pub struct Storage {
    pub items: Arc<dyn ItemPoolRepository>,
    pub exposures: Arc<dyn ExposureRepository>,
    pub spool: Arc<dyn AnswerSpoolRepository>,
    pub results: Arc<dyn SessionResultRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        Self {
            items: Arc::new(repo.clone()),
            exposures: Arc::new(repo.clone()),
            spool: Arc::new(repo.clone()),
            results: Arc::new(repo),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use exam_core::model::{AnswerStatus, SessionScore};
    use exam_core::time::fixed_now;

    fn build_record(id: u64, category: &str, difficulty: Difficulty) -> ItemRecord {
        ItemRecord {
            id: ItemId::new(id),
            category: category.to_string(),
            topic: "fractions".to_string(),
            difficulty,
            prompt: format!("Q{id}"),
            options: vec!["a".to_string(), "b".to_string(), "c".to_string()],
            figure: None,
            correct_option: 1,
        }
    }

    #[tokio::test]
    async fn list_items_filters_by_category_and_hides_key() {
        let repo = InMemoryRepository::new();
        repo.upsert_item(&build_record(1, "math", Difficulty::Easy))
            .await
            .unwrap();
        repo.upsert_item(&build_record(2, "reading", Difficulty::Hard))
            .await
            .unwrap();
        repo.upsert_item(&build_record(3, "math", Difficulty::Medium))
            .await
            .unwrap();

        let math = repo.list_items(Some("math")).await.unwrap();
        assert_eq!(math.len(), 2);
        assert!(math.iter().all(|item| item.category() == "math"));
        // stable catalog order
        assert_eq!(math[0].id(), ItemId::new(1));
        assert_eq!(math[1].id(), ItemId::new(3));

        let all = repo.list_items(None).await.unwrap();
        assert_eq!(all.len(), 3);

        assert_eq!(repo.correct_option(ItemId::new(2)).await.unwrap(), 1);
        assert!(matches!(
            repo.correct_option(ItemId::new(99)).await,
            Err(StorageError::NotFound)
        ));
    }

    #[tokio::test]
    async fn exposure_upsert_overwrites_single_record() {
        let repo = InMemoryRepository::new();
        let user = UserId::new(1);
        let item = ItemId::new(10);
        let now = fixed_now();

        repo.upsert_exposure(user, item, now, AnswerOutcome::Incorrect)
            .await
            .unwrap();
        repo.upsert_exposure(user, item, now + Duration::hours(1), AnswerOutcome::Correct)
            .await
            .unwrap();

        let records = repo.exposures_for(user, &[item]).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].last_seen_at(), now + Duration::hours(1));
        assert_eq!(records[0].last_outcome(), AnswerOutcome::Correct);
    }

    #[tokio::test]
    async fn spool_round_trips_and_clears_per_session() {
        let repo = InMemoryRepository::new();
        let session = SessionId::generate();
        let other = SessionId::generate();
        let now = fixed_now();

        let answer = PendingAnswer::new(ItemId::new(1), 2, now);
        repo.upsert_answer(session, &answer).await.unwrap();
        repo.upsert_answer(other, &PendingAnswer::new(ItemId::new(9), 0, now))
            .await
            .unwrap();

        let loaded = repo.answers_for_session(session).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].status(), AnswerStatus::Unsent);

        repo.clear_session(session).await.unwrap();
        assert!(repo.answers_for_session(session).await.unwrap().is_empty());
        assert_eq!(repo.answers_for_session(other).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn results_conflict_on_duplicate_session() {
        let repo = InMemoryRepository::new();
        let now = fixed_now();
        let score = SessionScore::from_tallies(3, 4).unwrap();
        let result = SessionResult::new(SessionId::generate(), UserId::new(1), score, now, now)
            .unwrap();

        let id = repo.append_result(&result).await.unwrap();
        assert_eq!(repo.get_result(id).await.unwrap(), result);
        assert!(matches!(
            repo.append_result(&result).await,
            Err(StorageError::Conflict)
        ));
    }

    #[tokio::test]
    async fn results_for_user_newest_first() {
        let repo = InMemoryRepository::new();
        let now = fixed_now();
        let user = UserId::new(7);
        let score = SessionScore::from_tallies(1, 2).unwrap();

        let older = SessionResult::new(
            SessionId::generate(),
            user,
            score,
            now - Duration::days(2),
            now - Duration::days(2),
        )
        .unwrap();
        let newer =
            SessionResult::new(SessionId::generate(), user, score, now, now).unwrap();
        repo.append_result(&older).await.unwrap();
        repo.append_result(&newer).await.unwrap();

        let listed = repo.results_for_user(user, 10).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].completed_at(), newer.completed_at());
    }
}
