//! `ferry health` command implementation

use colored::Colorize;

use crate::api::ApiClient;
use crate::error::{CliError, Result};

pub async fn run(server_url: String, json: bool) -> Result<()> {
    let client = ApiClient::new(server_url)?;
    let health = client.health_check().await?;

    if json {
        super::print_json(&health)?;
    } else if health.is_healthy() {
        println!("{} {}", "Server healthy:".green().bold(), client.base_url());
        if let Some(version) = &health.version {
            println!("  Version:  {}", version);
        }
        if let Some(database) = &health.database {
            println!("  Database: {}", database);
        }
    }

    if health.is_healthy() {
        Ok(())
    } else {
        let reason = health
            .error
            .or(health.database)
            .unwrap_or_else(|| health.status.clone());
        Err(CliError::Unhealthy(reason))
    }
}
