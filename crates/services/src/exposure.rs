use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use exam_core::model::{AnswerOutcome, Item, ItemId, UserId};
use storage::repository::ExposureRepository;

/// Pool split by per-user exposure.
///
/// `seen` is sorted ascending by `last_seen_at`: the longer ago an item was
/// served, the earlier it is offered again.
#[derive(Debug, Clone, PartialEq)]
pub struct Classified {
    pub never_seen: Vec<Item>,
    pub seen: Vec<(Item, DateTime<Utc>)>,
}

/// Splits a candidate pool into never-seen and previously-seen items and
/// records outcomes back into the last-seen cache.
#[derive(Clone)]
pub struct ExposureTracker {
    exposures: Arc<dyn ExposureRepository>,
}

impl ExposureTracker {
    #[must_use]
    pub fn new(exposures: Arc<dyn ExposureRepository>) -> Self {
        Self { exposures }
    }

    /// Classify the pool for one user. O(n log n) over the pool size.
    ///
    /// Fail-open: if the exposure store is unreachable the whole pool is
    /// treated as never-seen. An item may repeat sooner than ideal, but
    /// session creation is never blocked on the cache.
    pub async fn classify(&self, user_id: UserId, pool: Vec<Item>) -> Classified {
        let ids: Vec<ItemId> = pool.iter().map(Item::id).collect();

        let records = match self.exposures.exposures_for(user_id, &ids).await {
            Ok(records) => records,
            Err(err) => {
                tracing::warn!(
                    user = %user_id,
                    pool = pool.len(),
                    error = %err,
                    "exposure store unreachable, treating pool as never-seen"
                );
                Vec::new()
            }
        };

        let last_seen: HashMap<ItemId, DateTime<Utc>> = records
            .into_iter()
            .map(|record| (record.item_id(), record.last_seen_at()))
            .collect();

        let mut never_seen = Vec::new();
        let mut seen = Vec::new();
        for item in pool {
            match last_seen.get(&item.id()) {
                Some(at) => seen.push((item, *at)),
                None => never_seen.push(item),
            }
        }
        seen.sort_by_key(|(item, at)| (*at, item.id().value()));

        Classified { never_seen, seen }
    }

    /// Overwrite the (user, item) exposure record with this outcome.
    ///
    /// Failures are absorbed and logged; a stale cache entry is preferable to
    /// interrupting the session.
    pub async fn record_outcome(
        &self,
        user_id: UserId,
        item_id: ItemId,
        outcome: AnswerOutcome,
        at: DateTime<Utc>,
    ) {
        if let Err(err) = self
            .exposures
            .upsert_exposure(user_id, item_id, at, outcome)
            .await
        {
            tracing::warn!(
                user = %user_id,
                item = %item_id,
                error = %err,
                "failed to record exposure"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Duration;
    use exam_core::model::{Difficulty, ExposureRecord, ItemContent};
    use exam_core::time::fixed_now;
    use storage::repository::{InMemoryRepository, StorageError};

    fn build_item(id: u64) -> Item {
        let content = ItemContent::new(
            format!("Q{id}"),
            vec!["a".to_string(), "b".to_string()],
            None,
        )
        .unwrap();
        Item::new(ItemId::new(id), "math", "fractions", Difficulty::Medium, content).unwrap()
    }

    struct BrokenStore;

    #[async_trait]
    impl ExposureRepository for BrokenStore {
        async fn exposures_for(
            &self,
            _user_id: UserId,
            _item_ids: &[ItemId],
        ) -> Result<Vec<ExposureRecord>, StorageError> {
            Err(StorageError::Connection("store offline".into()))
        }

        async fn upsert_exposure(
            &self,
            _user_id: UserId,
            _item_id: ItemId,
            _seen_at: DateTime<Utc>,
            _outcome: AnswerOutcome,
        ) -> Result<(), StorageError> {
            Err(StorageError::Connection("store offline".into()))
        }
    }

    #[tokio::test]
    async fn classify_partitions_and_sorts_seen_oldest_first() {
        let repo = InMemoryRepository::new();
        let user = UserId::new(1);
        let now = fixed_now();

        // item 2 seen most recently, item 3 seen longest ago, item 1 never
        repo.upsert_exposure(user, ItemId::new(2), now, AnswerOutcome::Correct)
            .await
            .unwrap();
        repo.upsert_exposure(
            user,
            ItemId::new(3),
            now - Duration::days(5),
            AnswerOutcome::Incorrect,
        )
        .await
        .unwrap();
        repo.upsert_exposure(
            user,
            ItemId::new(4),
            now - Duration::days(2),
            AnswerOutcome::Correct,
        )
        .await
        .unwrap();

        let tracker = ExposureTracker::new(Arc::new(repo));
        let pool = vec![build_item(1), build_item(2), build_item(3), build_item(4)];
        let classified = tracker.classify(user, pool).await;

        assert_eq!(classified.never_seen.len(), 1);
        assert_eq!(classified.never_seen[0].id(), ItemId::new(1));

        let seen_ids: Vec<ItemId> = classified.seen.iter().map(|(i, _)| i.id()).collect();
        assert_eq!(
            seen_ids,
            vec![ItemId::new(3), ItemId::new(4), ItemId::new(2)]
        );
        // strictly ascending timestamps
        assert!(classified.seen.windows(2).all(|w| w[0].1 <= w[1].1));
    }

    #[tokio::test]
    async fn classify_fails_open_when_store_is_down() {
        let tracker = ExposureTracker::new(Arc::new(BrokenStore));
        let pool = vec![build_item(1), build_item(2)];
        let classified = tracker.classify(UserId::new(1), pool).await;

        assert_eq!(classified.never_seen.len(), 2);
        assert!(classified.seen.is_empty());
    }

    #[tokio::test]
    async fn record_outcome_overwrites_last_seen() {
        let repo = InMemoryRepository::new();
        let tracker = ExposureTracker::new(Arc::new(repo.clone()));
        let user = UserId::new(1);
        let now = fixed_now();

        tracker
            .record_outcome(user, ItemId::new(9), AnswerOutcome::Incorrect, now)
            .await;
        tracker
            .record_outcome(
                user,
                ItemId::new(9),
                AnswerOutcome::Correct,
                now + Duration::hours(1),
            )
            .await;

        let records = repo.exposures_for(user, &[ItemId::new(9)]).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].last_outcome(), AnswerOutcome::Correct);
        assert_eq!(records[0].last_seen_at(), now + Duration::hours(1));
    }

    #[tokio::test]
    async fn record_outcome_absorbs_store_failures() {
        let tracker = ExposureTracker::new(Arc::new(BrokenStore));
        // must not panic or error
        tracker
            .record_outcome(
                UserId::new(1),
                ItemId::new(1),
                AnswerOutcome::Correct,
                fixed_now(),
            )
            .await;
    }
}
