use exam_core::model::{SessionResult, UserId};

use super::{
    SqliteRepository,
    mapping::{id_i64, map_result_row},
};
use crate::repository::{SessionResultRepository, StorageError};

fn map_insert_error(e: sqlx::Error) -> StorageError {
    if let Some(db_err) = e.as_database_error() {
        if db_err.is_unique_violation() {
            return StorageError::Conflict;
        }
    }
    StorageError::Connection(e.to_string())
}

#[async_trait::async_trait]
impl SessionResultRepository for SqliteRepository {
    async fn append_result(&self, result: &SessionResult) -> Result<i64, StorageError> {
        let user = id_i64("user_id", result.user_id().value())?;
        let score = result.score();

        let res = sqlx::query(
            r"
                INSERT INTO session_results (
                    session_id, user_id, score, correct, total, started_at, completed_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ",
        )
        .bind(result.session_id().to_string())
        .bind(user)
        .bind(i64::from(score.score()))
        .bind(i64::from(score.correct()))
        .bind(i64::from(score.total()))
        .bind(result.started_at())
        .bind(result.completed_at())
        .execute(&self.pool)
        .await
        .map_err(map_insert_error)?;

        Ok(res.last_insert_rowid())
    }

    async fn get_result(&self, id: i64) -> Result<SessionResult, StorageError> {
        let row = sqlx::query(
            r"
                SELECT session_id, user_id, score, correct, total, started_at, completed_at
                FROM session_results
                WHERE id = ?1
            ",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?
        .ok_or(StorageError::NotFound)?;

        map_result_row(&row)
    }

    async fn results_for_user(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> Result<Vec<SessionResult>, StorageError> {
        let user = id_i64("user_id", user_id.value())?;

        let rows = sqlx::query(
            r"
                SELECT session_id, user_id, score, correct, total, started_at, completed_at
                FROM session_results
                WHERE user_id = ?1
                ORDER BY completed_at DESC
                LIMIT ?2
            ",
        )
        .bind(user)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_result_row(&row)?);
        }
        Ok(out)
    }
}
