use exam_core::model::{Item, ItemId};

use super::{
    SqliteRepository,
    mapping::{id_i64, map_item_row, options_to_json, ser, u32_from_i64},
};
use crate::repository::{ItemPoolRepository, ItemRecord, StorageError};

#[async_trait::async_trait]
impl ItemPoolRepository for SqliteRepository {
    async fn upsert_item(&self, record: &ItemRecord) -> Result<(), StorageError> {
        let id = id_i64("item_id", record.id.value())?;
        let options = options_to_json(&record.options)?;

        sqlx::query(
            r"
                INSERT INTO items (
                    id, category, topic, difficulty, prompt, options, figure, correct_option
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ON CONFLICT(id) DO UPDATE SET
                    category = excluded.category,
                    topic = excluded.topic,
                    difficulty = excluded.difficulty,
                    prompt = excluded.prompt,
                    options = excluded.options,
                    figure = excluded.figure,
                    correct_option = excluded.correct_option
            ",
        )
        .bind(id)
        .bind(&record.category)
        .bind(&record.topic)
        .bind(record.difficulty.as_str())
        .bind(&record.prompt)
        .bind(options)
        .bind(&record.figure)
        .bind(i64::from(record.correct_option))
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(())
    }

    async fn list_items(&self, category: Option<&str>) -> Result<Vec<Item>, StorageError> {
        let rows = match category {
            Some(filter) => {
                sqlx::query(
                    r"
                        SELECT id, category, topic, difficulty, prompt, options, figure,
                               correct_option
                        FROM items
                        WHERE category = ?1
                        ORDER BY id ASC
                    ",
                )
                .bind(filter)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(
                    r"
                        SELECT id, category, topic, difficulty, prompt, options, figure,
                               correct_option
                        FROM items
                        ORDER BY id ASC
                    ",
                )
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let item = map_item_row(&row)?.into_item().map_err(ser)?;
            out.push(item);
        }
        Ok(out)
    }

    async fn correct_option(&self, item_id: ItemId) -> Result<u32, StorageError> {
        use sqlx::Row;

        let id = id_i64("item_id", item_id.value())?;
        let row = sqlx::query("SELECT correct_option FROM items WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?
            .ok_or(StorageError::NotFound)?;

        u32_from_i64(
            "correct_option",
            row.try_get::<i64, _>("correct_option").map_err(ser)?,
        )
    }
}
