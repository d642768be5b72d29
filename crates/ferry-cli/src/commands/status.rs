//! `ferry status` command implementation

use colored::Colorize;

use crate::api::{ApiClient, IngestionStatus};
use crate::error::Result;

pub async fn run(server_url: String, ingestion_id: String, json: bool) -> Result<()> {
    let client = ApiClient::new(server_url)?;
    let status = client.ingestion_status(&ingestion_id).await?;

    if json {
        return super::print_json(&status);
    }

    print_status(&status);
    Ok(())
}

fn colored_status(status: &str) -> colored::ColoredString {
    match status {
        "COMPLETED" => status.green().bold(),
        "ABORTED" => status.red().bold(),
        _ => status.yellow().bold(),
    }
}

fn print_status(status: &IngestionStatus) {
    println!("{}", status.ingestion_id.cyan());
    println!("  Status:   {}", colored_status(&status.status));
    println!("  Source:   {} ({})", status.source_path, status.file_type);
    println!("  Callback: {}", status.callback_url);
    println!(
        "  Chunking: {} per chunk ({})",
        status.chunking.value(),
        status.chunking.kind()
    );
    println!("  Chunks:   {}", status.chunks_sent);
    println!("  Records:  {}", status.records_sent);

    match &status.progress {
        Some(progress) => println!(
            "  Cursor:   last chunk {}, {} records, {}",
            progress.last_chunk, progress.total_records, progress.status
        ),
        None => println!("  Cursor:   no chunk acknowledged yet"),
    }

    if let Some(error) = &status.last_error {
        println!("  Error:    {}", error.red());
    }

    println!("  Created:  {}", status.created_at);
    println!("  Updated:  {}", status.updated_at);
}
