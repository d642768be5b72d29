//! `ferry id` command implementation
//!
//! Derives the same identifiers the server assigns, so a resumable run's id
//! can be known before (or without) submitting it.

use ferry_common::identity::{self, RunVersion};
use ferry_common::protocol::FileType;
use serde::Serialize;

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Identifiers {
    pub file_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingestion_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Compute identifiers. Without a version only the file id is known.
pub fn compute(
    path: &str,
    file_type: &str,
    resume: bool,
    version: Option<&str>,
) -> Result<Identifiers> {
    let file_type: FileType = file_type.parse()?;
    let file_id = identity::file_id(path, file_type.as_str());

    let version = match (resume, version) {
        (true, _) => Some(RunVersion::Resume.token()),
        (false, Some(token)) => Some(token.to_string()),
        (false, None) => None,
    };

    Ok(Identifiers {
        ingestion_id: version.as_deref().map(|v| identity::ingestion_id(&file_id, v)),
        file_id,
        version,
    })
}

pub fn run(path: &str, file_type: &str, resume: bool, version: Option<&str>, json: bool) -> Result<()> {
    let ids = compute(path, file_type, resume, version)?;

    if json {
        return super::print_json(&ids);
    }

    println!("file_id:      {}", ids.file_id);
    if let (Some(ingestion_id), Some(version)) = (&ids.ingestion_id, &ids.version) {
        println!("ingestion_id: {}", ingestion_id);
        println!("version:      {}", version);
    }
    Ok(())
}
