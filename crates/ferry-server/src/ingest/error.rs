//! Delivery error types
//!
//! Sending a chunk returns an explicit [`SendFailure`] instead of raising; the
//! engine decides from the failure kind and the configured policy whether to
//! retry the same chunk or abort the run.

use ferry_common::protocol::ChunkingMode;
use ferry_common::{FerryError, RejectionReason};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What to do when a consumer reports `CHECKSUM_MISMATCH`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumMismatchPolicy {
    /// Re-send like any other rejection
    #[default]
    Retry,
    /// Abort the run on the first mismatch
    Fatal,
}

impl std::str::FromStr for ChecksumMismatchPolicy {
    type Err = FerryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "retry" => Ok(ChecksumMismatchPolicy::Retry),
            "fatal" => Ok(ChecksumMismatchPolicy::Fatal),
            other => Err(FerryError::Config(format!(
                "Invalid checksum mismatch policy: {} (expected retry or fatal)",
                other
            ))),
        }
    }
}

/// Outcome of one failed send attempt
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendFailure {
    #[error("rejected by consumer: {0}")]
    Rejected(RejectionReason),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed acknowledgement: {0}")]
    MalformedAck(String),
}

impl SendFailure {
    pub fn is_retryable(&self, policy: ChecksumMismatchPolicy) -> bool {
        match self {
            SendFailure::Rejected(RejectionReason::ChecksumMismatch) => {
                policy == ChecksumMismatchPolicy::Retry
            },
            _ => true,
        }
    }
}

/// Why a run aborted
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Missing or malformed source; never retried
    #[error("source error: {0}")]
    Source(#[source] FerryError),

    #[error("chunk {chunk_number} failed after {attempts} attempts: {last}")]
    Exhausted {
        chunk_number: i64,
        attempts: u32,
        last: SendFailure,
    },

    #[error("chunk {chunk_number} rejected without retry: {failure}")]
    Fatal {
        chunk_number: i64,
        failure: SendFailure,
    },

    #[error("completion event not acknowledged after {attempts} attempts: {last}")]
    Completion { attempts: u32, last: SendFailure },

    #[error("progress store error: {0}")]
    Store(#[source] FerryError),

    /// The stored cursor counts chunks under different boundaries
    #[error(
        "run was chunked by {} ({}), cannot resume chunked by {} ({})",
        .stored.kind(), .stored.value(), .requested.kind(), .requested.value()
    )]
    ChunkingChanged {
        stored: ChunkingMode,
        requested: ChunkingMode,
    },
}
