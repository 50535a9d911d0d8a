use std::collections::HashSet;

use chrono::{DateTime, Utc};

use exam_core::model::{AnswerOutcome, ExposureRecord, ItemId, UserId};

use super::{
    SqliteRepository,
    mapping::{id_i64, map_exposure_row},
};
use crate::repository::{ExposureRepository, StorageError};

#[async_trait::async_trait]
impl ExposureRepository for SqliteRepository {
    async fn exposures_for(
        &self,
        user_id: UserId,
        item_ids: &[ItemId],
    ) -> Result<Vec<ExposureRecord>, StorageError> {
        let user = id_i64("user_id", user_id.value())?;

        // One query for the user's whole cache, filtered in memory; pool-sized
        // IN lists are worse than this for SQLite.
        let rows = sqlx::query(
            r"
                SELECT user_id, item_id, last_seen_at, last_outcome
                FROM exposures
                WHERE user_id = ?1
            ",
        )
        .bind(user)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let wanted: HashSet<ItemId> = item_ids.iter().copied().collect();
        let mut out = Vec::new();
        for row in rows {
            let record = map_exposure_row(&row)?;
            if wanted.contains(&record.item_id()) {
                out.push(record);
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
        let user = id_i64("user_id", user_id.value())?;
        let item = id_i64("item_id", item_id.value())?;

        sqlx::query(
            r"
                INSERT INTO exposures (user_id, item_id, last_seen_at, last_outcome)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(user_id, item_id) DO UPDATE SET
                    last_seen_at = excluded.last_seen_at,
                    last_outcome = excluded.last_outcome
            ",
        )
        .bind(user)
        .bind(item)
        .bind(seen_at)
        .bind(outcome.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(())
    }
}
