use exam_core::model::{PendingAnswer, SessionId};

use super::{
    SqliteRepository,
    mapping::{id_i64, map_answer_row},
};
use crate::repository::{AnswerSpoolRepository, StorageError};

#[async_trait::async_trait]
impl AnswerSpoolRepository for SqliteRepository {
    async fn upsert_answer(
        &self,
        session_id: SessionId,
        answer: &PendingAnswer,
    ) -> Result<(), StorageError> {
        let item = id_i64("item_id", answer.item_id().value())?;

        sqlx::query(
            r"
                INSERT INTO answer_spool (
                    session_id, item_id, chosen_option, status, attempts, updated_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT(session_id, item_id) DO UPDATE SET
                    -- chosen_option never changes after the first buffer write
                    status = excluded.status,
                    attempts = excluded.attempts,
                    updated_at = excluded.updated_at
            ",
        )
        .bind(session_id.to_string())
        .bind(item)
        .bind(i64::from(answer.chosen_option()))
        .bind(answer.status().as_str())
        .bind(i64::from(answer.attempts()))
        .bind(answer.updated_at())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(())
    }

    async fn answers_for_session(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<PendingAnswer>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT item_id, chosen_option, status, attempts, updated_at
                FROM answer_spool
                WHERE session_id = ?1
                ORDER BY item_id ASC
            ",
        )
        .bind(session_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_answer_row(&row)?);
        }
        Ok(out)
    }

    async fn clear_session(&self, session_id: SessionId) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM answer_spool WHERE session_id = ?1")
            .bind(session_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(())
    }
}
