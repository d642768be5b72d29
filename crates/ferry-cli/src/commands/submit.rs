//! `ferry submit` command implementation

use colored::Colorize;
use ferry_common::protocol::{ChunkingMode, FileType, IngestionRequest};

use crate::api::ApiClient;
use crate::error::{CliError, Result};

/// Arguments of `ferry submit`
#[derive(Debug, Clone)]
pub struct SubmitArgs {
    pub file: String,
    pub callback: String,
    pub records: Option<u32>,
    pub bytes: Option<u64>,
    pub file_type: String,
    pub resume: bool,
}

impl SubmitArgs {
    /// Build the request body, rejecting what the server would reject anyway
    pub fn to_request(&self) -> Result<IngestionRequest> {
        let file_type: FileType = self.file_type.parse()?;
        ChunkingMode::from_request(self.records, self.bytes)
            .map_err(|e| CliError::invalid_args(e.to_string()))?;

        Ok(IngestionRequest {
            file_path: self.file.clone(),
            file_type,
            callback_url: self.callback.clone(),
            chunk_size_by_records: self.records,
            chunk_size_by_memory: self.bytes,
            resume: self.resume,
        })
    }
}

pub async fn run(server_url: String, args: SubmitArgs, json: bool) -> Result<()> {
    let request = args.to_request()?;
    let client = ApiClient::new(server_url)?;

    let started = client.submit(&request).await?;

    if json {
        return super::print_json(&started);
    }

    println!("{} {}", "Ingestion started:".green().bold(), started.ingestion_id);
    println!("  Source:   {}", request.file_path);
    println!("  Callback: {}", request.callback_url);
    println!();
    println!("Track it with 'ferry status {}'", started.ingestion_id);

    Ok(())
}
