//! Run configuration and outcome types

use ferry_common::protocol::{ChunkingMode, FileType};
use serde::{Deserialize, Serialize};

/// Fully-typed configuration of one ingestion run, built once at submission
/// and moved into the delivery engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    pub ingestion_id: String,
    pub file_id: String,
    /// Local file, local directory, or http(s) URL
    pub source: String,
    pub file_type: FileType,
    pub callback_url: String,
    pub chunking: ChunkingMode,
}

/// Lifecycle status of a run in the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Running,
    Completed,
    Aborted,
}

impl RunStatus {
    pub fn as_str(&self) -> &str {
        match self {
            RunStatus::Running => "RUNNING",
            RunStatus::Completed => "COMPLETED",
            RunStatus::Aborted => "ABORTED",
        }
    }
}

impl From<String> for RunStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "COMPLETED" => RunStatus::Completed,
            "ABORTED" => RunStatus::Aborted,
            _ => RunStatus::Running,
        }
    }
}

/// What a finished run did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Chunks transmitted and acknowledged during this run
    pub chunks_sent: u64,
    /// Chunks suppressed because an earlier run already had them acknowledged
    pub chunks_skipped: u64,
    /// Cumulative records acknowledged, including earlier runs
    pub total_records: u64,
    /// Number of the final chunk, `-1` for an empty source
    pub final_chunk: i64,
    /// The store already had this run marked completed; nothing was sent
    pub already_completed: bool,
}
