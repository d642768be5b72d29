//! Deterministic identifiers for source files and ingestion runs
//!
//! Identifiers are one-way SHA-256 digests of `|`-joined components. They depend
//! only on path/type identity, never on file content.

use sha2::{Digest, Sha256};

/// Version token meaning "the most recent resumable run of this file".
pub const RESUME_TOKEN: &str = "resume";

/// How an ingestion id is versioned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunVersion {
    /// Fresh run keyed by a millisecond epoch timestamp
    Fresh(i64),
    /// Continuation of the canonical resumable run
    Resume,
}

impl RunVersion {
    /// Fresh version stamped with the current wall clock
    pub fn fresh_now() -> Self {
        RunVersion::Fresh(chrono::Utc::now().timestamp_millis())
    }

    pub fn token(&self) -> String {
        match self {
            RunVersion::Fresh(millis) => millis.to_string(),
            RunVersion::Resume => RESUME_TOKEN.to_string(),
        }
    }
}

fn digest(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.as_bytes()))
}

/// Identity of a source file: `sha256("{path}|{type}")`
pub fn file_id(path: &str, file_type: &str) -> String {
    digest(&format!("{}|{}", path, file_type))
}

/// Identity of an ingestion run: `sha256("{file_id}|{version}")`
pub fn ingestion_id(file_id: &str, version: &str) -> String {
    digest(&format!("{}|{}", file_id, version))
}

/// Convenience for deriving a run id straight from the source identity
pub fn ingestion_id_for(path: &str, file_type: &str, version: &RunVersion) -> String {
    ingestion_id(&file_id(path, file_type), &version.token())
}
