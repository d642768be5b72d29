//! HTTP API client for the dataferry server

use crate::api::{endpoints, types::*};
use crate::error::{CliError, Result};
use ferry_common::protocol::{IngestionRequest, IngestionStarted};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;

// ============================================================================
// API Client Constants
// ============================================================================

/// Default timeout for API requests in seconds.
/// Can be overridden via FERRY_API_TIMEOUT_SECS environment variable.
pub const DEFAULT_API_TIMEOUT_SECS: u64 = 30;

/// Default server URL when not specified via flag or environment variable.
pub const DEFAULT_SERVER_URL: &str = "http://localhost:8000";

/// API client for the dataferry server
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let timeout_secs = std::env::var("FERRY_API_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_API_TIMEOUT_SECS);

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        let base_url =
            std::env::var("FERRY_SERVER_URL").unwrap_or_else(|_| DEFAULT_SERVER_URL.to_string());

        Self::new(base_url)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check server health. An unhealthy server still answers with a body.
    pub async fn health_check(&self) -> Result<HealthStatus> {
        let url = endpoints::health_url(&self.base_url);
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;

        serde_json::from_slice(&bytes).map_err(|_| {
            CliError::UnexpectedResponse(format!("health check returned {}", status.as_u16()))
        })
    }

    /// Start an ingestion run
    pub async fn submit(&self, request: &IngestionRequest) -> Result<IngestionStarted> {
        let url = endpoints::ingest_url(&self.base_url);
        tracing::debug!(url = %url, file_path = %request.file_path, "Submitting ingestion");

        let response = self.client.post(&url).json(request).send().await?;
        parse_response(response).await
    }

    /// Fetch run status and delivery progress
    pub async fn ingestion_status(&self, ingestion_id: &str) -> Result<IngestionStatus> {
        let url = endpoints::ingestion_status_url(&self.base_url, ingestion_id);
        let response = self.client.get(&url).send().await?;
        parse_response(response).await
    }
}

/// Decode a success body, or turn the server's error envelope into a
/// [`CliError::Server`]. Bodies without the envelope keep their raw text.
async fn parse_response<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    let bytes = response.bytes().await?;

    if status.is_success() {
        return serde_json::from_slice(&bytes)
            .map_err(|e| CliError::UnexpectedResponse(e.to_string()));
    }

    match serde_json::from_slice::<ErrorResponse>(&bytes) {
        Ok(body) => Err(CliError::server(body.error.status, body.error.message)),
        Err(_) => Err(CliError::server(
            status.as_u16(),
            String::from_utf8_lossy(&bytes).trim().to_string(),
        )),
    }
}
