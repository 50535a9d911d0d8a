use std::sync::Arc;

use chrono::{DateTime, Utc};

use exam_core::model::{SessionResult, UserId};
use storage::repository::SessionResultRepository;

use crate::error::SessionError;

/// Read-side queries over persisted session results.
#[derive(Clone)]
pub struct SessionResultService {
    results: Arc<dyn SessionResultRepository>,
}

impl SessionResultService {
    #[must_use]
    pub fn new(results: Arc<dyn SessionResultRepository>) -> Self {
        Self { results }
    }

    /// Fetch one result by row id.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` if the result is missing or storage
    /// fails.
    pub async fn get(&self, id: i64) -> Result<SessionResult, SessionError> {
        let result = self.results.get_result(id).await?;
        Ok(result)
    }

    /// Results for a user completed within the last `days`, newest first.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` on repository failures.
    pub async fn recent_for_user(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
        days: i64,
        limit: u32,
    ) -> Result<Vec<SessionResult>, SessionError> {
        let from = now - chrono::Duration::days(days);
        let listed = self.results.results_for_user(user_id, limit).await?;
        Ok(listed
            .into_iter()
            .filter(|result| result.completed_at() >= from)
            .collect())
    }
}
