//! Submit ingestion command
//!
//! Validates a submission, derives the run's identity and hands the run to
//! the dispatcher. The HTTP response is sent as soon as the run is queued;
//! delivery happens in the background.

use ferry_common::identity::{self, RunVersion};
use ferry_common::protocol::{ChunkingMode, FileType, IngestionRequest, IngestionStarted};
use ferry_common::FerryError;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::AppError;
use crate::ingest::progress::ProgressStatus;
use crate::ingest::source::is_remote;
use crate::ingest::{DispatchError, Dispatcher, RunConfig};

/// Command to start an ingestion run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitIngestionCommand {
    #[serde(flatten)]
    pub request: IngestionRequest,
}

impl From<IngestionRequest> for SubmitIngestionCommand {
    fn from(request: IngestionRequest) -> Self {
        Self { request }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SubmitIngestionError {
    #[error("{0}")]
    InvalidChunking(FerryError),

    #[error("callback_url must be an http(s) URL, got '{0}'")]
    InvalidCallback(String),

    #[error("file_path must not be empty")]
    EmptyPath,

    #[error("file type '{0}' is not supported for chunked delivery")]
    UnsupportedFileType(FileType),

    #[error("Source not found: {0}")]
    SourceNotFound(String),

    #[error(
        "Ingestion {} was started chunked by {} ({}); resume it with the same chunk size",
        .ingestion_id, .stored.kind(), .stored.value()
    )]
    ChunkingConflict {
        ingestion_id: String,
        stored: ChunkingMode,
    },

    #[error("Failed to read progress: {0}")]
    Progress(FerryError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

impl From<SubmitIngestionError> for AppError {
    fn from(err: SubmitIngestionError) -> Self {
        match err {
            SubmitIngestionError::InvalidChunking(_)
            | SubmitIngestionError::InvalidCallback(_)
            | SubmitIngestionError::EmptyPath => AppError::BadRequest(err.to_string()),
            SubmitIngestionError::UnsupportedFileType(_) => AppError::Unprocessable(err.to_string()),
            SubmitIngestionError::SourceNotFound(_) => AppError::NotFound(err.to_string()),
            SubmitIngestionError::ChunkingConflict { .. } => AppError::Conflict(err.to_string()),
            SubmitIngestionError::Progress(e) => AppError::Ferry(e),
            SubmitIngestionError::Dispatch(e) => e.into(),
        }
    }
}

impl SubmitIngestionCommand {
    /// Check the request shape and return the chunking mode it selects
    #[tracing::instrument(skip(self), fields(file_path = %self.request.file_path))]
    pub fn validate(&self) -> Result<ChunkingMode, SubmitIngestionError> {
        let request = &self.request;

        if request.file_path.trim().is_empty() {
            return Err(SubmitIngestionError::EmptyPath);
        }

        if !is_remote(&request.callback_url) {
            return Err(SubmitIngestionError::InvalidCallback(request.callback_url.clone()));
        }

        let chunking =
            ChunkingMode::from_request(request.chunk_size_by_records, request.chunk_size_by_memory)
                .map_err(SubmitIngestionError::InvalidChunking)?;

        if request.file_type != FileType::Json {
            return Err(SubmitIngestionError::UnsupportedFileType(request.file_type));
        }

        Ok(chunking)
    }

    /// Identity and configuration of the run this command starts
    pub fn run_config(&self, chunking: ChunkingMode, version: &RunVersion) -> RunConfig {
        let request = &self.request;
        let file_type = request.file_type.as_str();
        let file_id = identity::file_id(&request.file_path, file_type);

        RunConfig {
            ingestion_id: identity::ingestion_id(&file_id, &version.token()),
            file_id,
            source: request.file_path.clone(),
            file_type: request.file_type,
            callback_url: request.callback_url.clone(),
            chunking,
        }
    }

    pub fn version(&self) -> RunVersion {
        if self.request.resume {
            RunVersion::Resume
        } else {
            RunVersion::fresh_now()
        }
    }
}

/// Validate, derive the ingestion id, and dispatch the run
#[tracing::instrument(
    skip(dispatcher, command),
    fields(file_path = %command.request.file_path, resume = command.request.resume)
)]
pub async fn handle(
    dispatcher: &Dispatcher,
    command: SubmitIngestionCommand,
) -> Result<IngestionStarted, SubmitIngestionError> {
    let chunking = command.validate()?;

    let path = &command.request.file_path;
    if !is_remote(path) && !tokio::fs::try_exists(Path::new(path)).await.unwrap_or(false) {
        return Err(SubmitIngestionError::SourceNotFound(path.clone()));
    }

    let config = command.run_config(chunking, &command.version());
    let ingestion_id = config.ingestion_id.clone();

    // A resumed cursor counts chunks under the boundaries it was recorded with
    if command.request.resume {
        let cursor = dispatcher
            .store()
            .load(&ingestion_id)
            .await
            .map_err(SubmitIngestionError::Progress)?;
        if let Some(cursor) = cursor {
            if cursor.status != ProgressStatus::Completed && !cursor.matches(&chunking) {
                return Err(SubmitIngestionError::ChunkingConflict {
                    ingestion_id,
                    stored: cursor.chunking.unwrap_or(chunking),
                });
            }
        }
    }

    dispatcher.submit(config).await?;
    tracing::info!(ingestion_id = %ingestion_id, "Ingestion started");

    Ok(IngestionStarted::new(ingestion_id))
}
