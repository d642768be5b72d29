//! Consumer transport
//!
//! The engine only sees [`ChunkTransport`]; [`HttpTransport`] posts JSON to
//! the run's callback URL. Every call returns an explicit outcome: the
//! decoded acknowledgement on success, or a [`SendFailure`] the engine can
//! reason about.

use std::time::Duration;

use async_trait::async_trait;
use ferry_common::{Acknowledgement, ChunkPayload, CompletionEvent};
use serde::Serialize;
use tracing::trace;

use super::error::SendFailure;

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

#[async_trait]
pub trait ChunkTransport: Send + Sync {
    /// Deliver one chunk; `Ok` only for a positive acknowledgement
    async fn send_chunk(
        &self,
        callback_url: &str,
        payload: &ChunkPayload,
    ) -> Result<Acknowledgement, SendFailure>;

    /// Deliver the completion event; `Ok` only for a positive acknowledgement
    async fn send_completion(
        &self,
        callback_url: &str,
        event: &CompletionEvent,
    ) -> Result<Acknowledgement, SendFailure>;
}

/// Turn a decoded acknowledgement into an outcome
pub fn interpret(ack: Acknowledgement) -> Result<Acknowledgement, SendFailure> {
    if ack.ack {
        Ok(ack)
    } else {
        Err(SendFailure::Rejected(ack.error.unwrap_or_else(|| {
            ferry_common::RejectionReason::Other("unspecified".to_string())
        })))
    }
}

/// JSON-over-HTTP transport
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::new(client))
    }

    async fn post<T: Serialize + Sync>(
        &self,
        url: &str,
        body: &T,
    ) -> Result<Acknowledgement, SendFailure> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| SendFailure::Transport(e.to_string()))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| SendFailure::Transport(e.to_string()))?;

        trace!(%status, len = bytes.len(), "Consumer responded");

        // Rejections may arrive with any status code; the body decides.
        match serde_json::from_slice::<Acknowledgement>(&bytes) {
            Ok(ack) => interpret(ack),
            Err(_) if !status.is_success() => {
                Err(SendFailure::Transport(format!("consumer returned HTTP {}", status)))
            },
            Err(e) => Err(SendFailure::MalformedAck(e.to_string())),
        }
    }
}

#[async_trait]
impl ChunkTransport for HttpTransport {
    async fn send_chunk(
        &self,
        callback_url: &str,
        payload: &ChunkPayload,
    ) -> Result<Acknowledgement, SendFailure> {
        self.post(callback_url, payload).await
    }

    async fn send_completion(
        &self,
        callback_url: &str,
        event: &CompletionEvent,
    ) -> Result<Acknowledgement, SendFailure> {
        self.post(callback_url, event).await
    }
}
