//! API response types
//!
//! Client-side views of the server's JSON. Status strings are kept as
//! strings so newer server states still display.

use ferry_common::protocol::{ChunkingMode, FileType};
use serde::{Deserialize, Serialize};

/// `GET /health` body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

/// Delivery cursor of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Progress {
    pub last_chunk: i64,
    pub total_records: u64,
    pub status: String,
}

/// `GET /api/ingestions/:id` body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionStatus {
    pub ingestion_id: String,
    pub file_id: String,
    pub source_path: String,
    pub file_type: FileType,
    pub callback_url: String,
    pub chunking: ChunkingMode,
    pub status: String,
    pub chunks_sent: u64,
    pub records_sent: u64,
    #[serde(default)]
    pub last_error: Option<String>,
    pub progress: Option<Progress>,
    pub created_at: String,
    pub updated_at: String,
}

/// Error envelope returned by the server for non-2xx responses
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorDetail {
    pub message: String,
    pub status: u16,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_without_progress() {
        let status: IngestionStatus = serde_json::from_value(serde_json::json!({
            "ingestion_id": "abc",
            "file_id": "def",
            "source_path": "/data/p.json",
            "file_type": "json",
            "callback_url": "http://c/callback",
            "chunking": {"mode": "records", "value": 100},
            "status": "RUNNING",
            "chunks_sent": 0,
            "records_sent": 0,
            "progress": null,
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        }))
        .unwrap();

        assert_eq!(status.chunking, ChunkingMode::Records(100));
        assert!(status.progress.is_none());
        assert!(status.last_error.is_none());
    }

    #[test]
    fn test_unhealthy_body() {
        let health: HealthStatus = serde_json::from_str(
            r#"{"status":"unhealthy","database":"disconnected","error":"pool closed"}"#,
        )
        .unwrap();
        assert!(!health.is_healthy());
        assert_eq!(health.error.as_deref(), Some("pool closed"));
    }
}
