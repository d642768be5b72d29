//! Wire protocol between the producer and a consumer endpoint
//!
//! All messages are JSON objects. The producer POSTs [`ChunkPayload`]s followed by
//! a single [`CompletionEvent`]; the consumer answers every message with an
//! [`Acknowledgement`].

use serde::{Deserialize, Serialize};

use crate::error::{FerryError, Result};

/// One record: field name to scalar (or nested) JSON value
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Upper bound for record-count chunking
pub const MAX_RECORDS_PER_CHUNK: u32 = 4000;

/// Chunk payload sent for every chunk of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkPayload {
    pub ingestion_id: String,
    pub chunk_number: i64,
    pub chunk_id: String,
    /// Hex SHA-256 of the canonical serialization of `records`
    pub checksum: String,
    pub records: Vec<Record>,
    pub is_last: bool,
}

/// Marker for the terminal event; serialized as `"COMPLETED"`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompletionStatus {
    #[serde(rename = "COMPLETED")]
    Completed,
}

/// Terminal event sent once every chunk has been acknowledged
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionEvent {
    pub ingestion_id: String,
    pub status: CompletionStatus,
    /// Number of the final chunk, `-1` when the source held no records
    pub chunk_number: i64,
    pub total_records: u64,
}

impl CompletionEvent {
    pub fn new(ingestion_id: impl Into<String>, chunk_number: i64, total_records: u64) -> Self {
        Self {
            ingestion_id: ingestion_id.into(),
            status: CompletionStatus::Completed,
            chunk_number,
            total_records,
        }
    }
}

/// Anything a consumer can receive on its callback endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConsumerMessage {
    Completion(CompletionEvent),
    Chunk(ChunkPayload),
}

/// Reason a consumer gives for a negative acknowledgement.
///
/// The protocol defines a closed set; anything else a consumer sends is kept
/// verbatim in [`RejectionReason::Other`] so the producer can still log it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RejectionReason {
    OutOfOrderChunk,
    ChecksumMismatch,
    EmptyChunk,
    Other(String),
}

impl RejectionReason {
    pub fn as_str(&self) -> &str {
        match self {
            RejectionReason::OutOfOrderChunk => "OUT_OF_ORDER_CHUNK",
            RejectionReason::ChecksumMismatch => "CHECKSUM_MISMATCH",
            RejectionReason::EmptyChunk => "EMPTY_CHUNK",
            RejectionReason::Other(reason) => reason,
        }
    }
}

impl From<String> for RejectionReason {
    fn from(s: String) -> Self {
        match s.as_str() {
            "OUT_OF_ORDER_CHUNK" => RejectionReason::OutOfOrderChunk,
            "CHECKSUM_MISMATCH" => RejectionReason::ChecksumMismatch,
            "EMPTY_CHUNK" => RejectionReason::EmptyChunk,
            _ => RejectionReason::Other(s),
        }
    }
}

impl From<RejectionReason> for String {
    fn from(reason: RejectionReason) -> Self {
        reason.as_str().to_string()
    }
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured acknowledgement returned by the consumer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acknowledgement {
    pub ack: bool,
    #[serde(default)]
    pub ingestion_id: String,
    #[serde(default)]
    pub chunk_number: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RejectionReason>,
}

impl Acknowledgement {
    pub fn accepted(ingestion_id: impl Into<String>, chunk_number: i64) -> Self {
        Self {
            ack: true,
            ingestion_id: ingestion_id.into(),
            chunk_number,
            error: None,
        }
    }

    pub fn rejected(
        ingestion_id: impl Into<String>,
        chunk_number: i64,
        reason: RejectionReason,
    ) -> Self {
        Self {
            ack: false,
            ingestion_id: ingestion_id.into(),
            chunk_number,
            error: Some(reason),
        }
    }
}

/// Source format of an ingestion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Json,
    Excel,
}

impl FileType {
    pub fn as_str(&self) -> &str {
        match self {
            FileType::Json => "json",
            FileType::Excel => "excel",
        }
    }
}

impl std::str::FromStr for FileType {
    type Err = FerryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "json" => Ok(FileType::Json),
            "excel" | "xlsx" => Ok(FileType::Excel),
            other => Err(FerryError::InvalidRequest(format!("Unknown file type: {}", other))),
        }
    }
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Chunk boundary policy. Exactly one is active per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "value", rename_all = "snake_case")]
pub enum ChunkingMode {
    /// At most this many records per chunk (1..=4000)
    Records(u32),
    /// At most this many canonical bytes per chunk
    Bytes(u64),
}

impl ChunkingMode {
    /// Build the mode from the two optional request fields, enforcing that
    /// exactly one is set and within range.
    pub fn from_request(by_records: Option<u32>, by_memory: Option<u64>) -> Result<Self> {
        match (by_records, by_memory) {
            (Some(_), Some(_)) => Err(FerryError::InvalidRequest(
                "chunk_size_by_records and chunk_size_by_memory are mutually exclusive".to_string(),
            )),
            (None, None) => Err(FerryError::InvalidRequest(
                "one of chunk_size_by_records or chunk_size_by_memory is required".to_string(),
            )),
            (Some(n), None) if n == 0 || n > MAX_RECORDS_PER_CHUNK => {
                Err(FerryError::InvalidRequest(format!(
                    "chunk_size_by_records must be between 1 and {}, got {}",
                    MAX_RECORDS_PER_CHUNK, n
                )))
            },
            (Some(n), None) => Ok(ChunkingMode::Records(n)),
            (None, Some(0)) => Err(FerryError::InvalidRequest(
                "chunk_size_by_memory must be greater than 0".to_string(),
            )),
            (None, Some(bytes)) => Ok(ChunkingMode::Bytes(bytes)),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ChunkingMode::Records(_) => "records",
            ChunkingMode::Bytes(_) => "bytes",
        }
    }

    pub fn value(&self) -> u64 {
        match self {
            ChunkingMode::Records(n) => u64::from(*n),
            ChunkingMode::Bytes(b) => *b,
        }
    }

    /// Inverse of `kind()`/`value()`, used when reloading persisted runs
    pub fn from_parts(kind: &str, value: u64) -> Result<Self> {
        match kind {
            "records" => {
                let n = u32::try_from(value).map_err(|_| {
                    FerryError::InvalidRequest(format!("record bound out of range: {}", value))
                })?;
                Self::from_request(Some(n), None)
            },
            "bytes" => Self::from_request(None, Some(value)),
            other => Err(FerryError::InvalidRequest(format!("Unknown chunking mode: {}", other))),
        }
    }
}

/// Ingestion submission accepted by `POST /api/ingest`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionRequest {
    /// Local path, directory, or http(s) URL of the source
    pub file_path: String,
    #[serde(default = "default_file_type")]
    pub file_type: FileType,
    /// Consumer endpoint that receives chunks
    pub callback_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_size_by_records: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_size_by_memory: Option<u64>,
    /// Continue the canonical resumable run of this file instead of starting fresh
    #[serde(default)]
    pub resume: bool,
}

fn default_file_type() -> FileType {
    FileType::Json
}

/// Immediate response to a submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionStarted {
    pub status: String,
    pub ingestion_id: String,
}

impl IngestionStarted {
    pub fn new(ingestion_id: impl Into<String>) -> Self {
        Self {
            status: "STARTED".to_string(),
            ingestion_id: ingestion_id.into(),
        }
    }
}
