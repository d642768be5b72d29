//! Get ingestion status query

use chrono::{DateTime, Utc};
use ferry_common::protocol::{ChunkingMode, FileType};
use ferry_common::FerryError;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::ingest::{ProgressCursor, ProgressStore, RunRegistry, RunStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetIngestionStatusQuery {
    pub ingestion_id: String,
}

/// Registry row merged with the progress cursor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionStatusResponse {
    pub ingestion_id: String,
    pub file_id: String,
    pub source_path: String,
    pub file_type: FileType,
    pub callback_url: String,
    pub chunking: ChunkingMode,
    pub status: RunStatus,
    pub chunks_sent: u64,
    pub records_sent: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// `None` until the first chunk is acknowledged
    pub progress: Option<ProgressCursor>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum GetIngestionStatusError {
    #[error("Ingestion '{0}' not found")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] FerryError),
}

impl From<GetIngestionStatusError> for AppError {
    fn from(err: GetIngestionStatusError) -> Self {
        match err {
            GetIngestionStatusError::NotFound(_) => AppError::NotFound(err.to_string()),
            GetIngestionStatusError::Store(e) => AppError::Ferry(e),
        }
    }
}

#[tracing::instrument(skip(registry, store), fields(ingestion_id = %query.ingestion_id))]
pub async fn handle(
    registry: &RunRegistry,
    store: &dyn ProgressStore,
    query: GetIngestionStatusQuery,
) -> Result<IngestionStatusResponse, GetIngestionStatusError> {
    let record = registry
        .get(&query.ingestion_id)
        .await?
        .ok_or_else(|| GetIngestionStatusError::NotFound(query.ingestion_id.clone()))?;
    let progress = store.load(&query.ingestion_id).await?;

    let config = record.config;
    Ok(IngestionStatusResponse {
        ingestion_id: config.ingestion_id,
        file_id: config.file_id,
        source_path: config.source,
        file_type: config.file_type,
        callback_url: config.callback_url,
        chunking: config.chunking,
        status: record.status,
        chunks_sent: record.chunks_sent,
        records_sent: record.records_sent,
        last_error: record.last_error,
        progress,
        created_at: record.created_at,
        updated_at: record.updated_at,
    })
}
