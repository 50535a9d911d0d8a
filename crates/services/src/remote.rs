use std::env;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;

use exam_core::model::{ItemId, SessionId, UserId};

use crate::error::RemoteSinkError;

/// One answer attempt as shipped to the remote results service.
#[derive(Debug, Clone, Serialize)]
pub struct AnswerEnvelope {
    pub session_id: SessionId,
    pub user_id: UserId,
    pub item_id: ItemId,
    pub chosen_option: u32,
    pub attempt: u32,
    pub submitted_at: DateTime<Utc>,
}

/// Destination for answer envelopes.
///
/// One call per delivery attempt; the pipeline owns retries and timeouts.
#[async_trait]
pub trait RemoteAnswerSink: Send + Sync {
    /// Deliver one envelope.
    ///
    /// # Errors
    ///
    /// Returns `RemoteSinkError` when delivery fails; the pipeline maps every
    /// variant to the same retry/skip/abort decision.
    async fn push(&self, envelope: &AnswerEnvelope) -> Result<(), RemoteSinkError>;
}

#[derive(Clone, Debug)]
pub struct SyncConfig {
    pub base_url: String,
    pub token: Option<String>,
}

impl SyncConfig {
    #[must_use]
    pub fn from_env() -> Option<Self> {
        let base_url = env::var("EXAM_SYNC_URL").ok()?;
        if base_url.trim().is_empty() {
            return None;
        }
        let token = env::var("EXAM_SYNC_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty());
        Some(Self { base_url, token })
    }
}

/// HTTP sink posting one JSON envelope per attempt.
#[derive(Clone)]
pub struct HttpAnswerSink {
    client: Client,
    config: Option<SyncConfig>,
}

impl HttpAnswerSink {
    #[must_use]
    pub fn from_env() -> Self {
        Self::new(SyncConfig::from_env())
    }

    #[must_use]
    pub fn new(config: Option<SyncConfig>) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        self.config.is_some()
    }
}

#[async_trait]
impl RemoteAnswerSink for HttpAnswerSink {
    async fn push(&self, envelope: &AnswerEnvelope) -> Result<(), RemoteSinkError> {
        let config = self.config.as_ref().ok_or(RemoteSinkError::Disabled)?;

        let url = format!(
            "{}/sessions/{}/answers",
            config.base_url.trim_end_matches('/'),
            envelope.session_id
        );

        let mut request = self.client.post(url).json(envelope);
        if let Some(token) = &config.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(RemoteSinkError::HttpStatus(response.status()));
        }

        Ok(())
    }
}

/// Sink that accepts every envelope without leaving the process.
///
/// Used by the demo runner and tests where no results service exists.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopAnswerSink;

#[async_trait]
impl RemoteAnswerSink for NoopAnswerSink {
    async fn push(&self, _envelope: &AnswerEnvelope) -> Result<(), RemoteSinkError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_sink_rejects_push() {
        let sink = HttpAnswerSink::new(None);
        assert!(!sink.enabled());

        let envelope = AnswerEnvelope {
            session_id: SessionId::generate(),
            user_id: UserId::new(1),
            item_id: ItemId::new(1),
            chosen_option: 0,
            attempt: 1,
            submitted_at: exam_core::time::fixed_now(),
        };

        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let err = rt.block_on(sink.push(&envelope)).unwrap_err();
        assert!(matches!(err, RemoteSinkError::Disabled));
    }

    #[tokio::test]
    async fn noop_sink_accepts_everything() {
        let envelope = AnswerEnvelope {
            session_id: SessionId::generate(),
            user_id: UserId::new(1),
            item_id: ItemId::new(1),
            chosen_option: 2,
            attempt: 3,
            submitted_at: exam_core::time::fixed_now(),
        };
        assert!(NoopAnswerSink.push(&envelope).await.is_ok());
    }
}
