//! Reference consumer for manual end-to-end runs
//!
//! Serves `POST /callback` (validates chunks and completion events) and
//! `GET /received` (what was accepted so far).

use anyhow::Result;
use clap::Parser;
use ferry_common::logging::{init_logging, LogConfig};
use tracing::info;

use ferry_server::consumer::{consumer_router, ConsumerState};
use ferry_server::middleware;

#[derive(Parser, Debug)]
#[command(name = "ferry-consumer", version, about = "Reference dataferry consumer")]
struct Cli {
    /// Address to listen on
    #[arg(long, env = "FERRY_CONSUMER_ADDR", default_value = "127.0.0.1:9000")]
    addr: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = LogConfig::builder()
        .log_file_prefix("ferry-consumer")
        .build()
        .merge_env()?;
    let _guard = init_logging(&log_config)?;

    let app = consumer_router(ConsumerState::new()).layer(middleware::tracing_layer());

    let listener = tokio::net::TcpListener::bind(&cli.addr).await?;
    info!("Consumer listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    Ok(())
}
