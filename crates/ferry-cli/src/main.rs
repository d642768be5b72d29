//! dataferry CLI - Main entry point

use clap::Parser;
use ferry_cli::commands::submit::SubmitArgs;
use ferry_cli::{Cli, Commands};
use ferry_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use std::process;
use tracing::error;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    // Verbose mode logs debug to the console, otherwise only warnings
    let level = if cli.verbose { LogLevel::Debug } else { LogLevel::Warn };
    let log_config = LogConfig::builder()
        .level(level)
        .output(LogOutput::Console)
        .log_file_prefix("ferry-cli")
        .build();

    // Environment variables take precedence; the CLI works without logging
    let log_config = log_config.clone().merge_env().unwrap_or(log_config);
    let _guard = init_logging(&log_config).ok();

    if let Err(e) = execute_command(cli).await {
        error!(error = %e, "Command failed");
        eprintln!("Error: {}", e);
        process::exit(e.exit_code());
    }
}

async fn execute_command(cli: Cli) -> ferry_cli::Result<()> {
    let json = cli.json;

    match cli.command {
        Commands::Submit {
            file,
            callback,
            records,
            bytes,
            file_type,
            resume,
        } => {
            let args = SubmitArgs {
                file,
                callback,
                records,
                bytes,
                file_type,
                resume,
            };
            ferry_cli::commands::submit::run(cli.server_url, args, json).await
        },

        Commands::Status { ingestion_id } => {
            ferry_cli::commands::status::run(cli.server_url, ingestion_id, json).await
        },

        Commands::Health => ferry_cli::commands::health::run(cli.server_url, json).await,

        Commands::Id {
            path,
            file_type,
            resume,
            version,
        } => ferry_cli::commands::id::run(&path, &file_type, resume, version.as_deref(), json),
    }
}
