//! dataferry Server - Main entry point

use std::time::Duration;

use anyhow::Result;
use ferry_common::logging::{init_logging, LogConfig};
use tokio::signal;
use tracing::{info, warn};

use ferry_server::{build_state, config::Config, create_router};

#[tokio::main]
async fn main() -> Result<()> {
    let log_config = LogConfig::builder()
        .log_file_prefix("ferry-server")
        .filter_directives("ferry_server=debug,tower_http=debug,sqlx=warn")
        .build()
        .merge_env()?;

    let _guard = init_logging(&log_config)?;

    info!("Starting dataferry server");

    let config = Config::load()?;
    info!("Configuration loaded - server will bind to {}", config.bind_address());

    let state = build_state(&config).await?;
    info!("Progress store ready at {}", config.store.database_url);

    let dispatcher = state.dispatcher.clone();
    if config.dispatcher.resume_on_startup {
        match dispatcher.resume_pending().await {
            Ok(0) => {},
            Ok(resumed) => info!(resumed, "Re-dispatched unfinished ingestions"),
            Err(e) => warn!("Could not resume unfinished ingestions: {}", e),
        }
    }

    let app = create_router(state, &config);

    let listener = tokio::net::TcpListener::bind(config.bind_address()).await?;
    info!("Server listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    dispatcher
        .shutdown(Duration::from_secs(config.server.shutdown_timeout_secs))
        .await;

    info!("Server shut down gracefully");

    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting graceful shutdown"),
        _ = terminate => info!("Received terminate signal, starting graceful shutdown"),
    }
}
