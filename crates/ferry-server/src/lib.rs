//! dataferry Server Library
//!
//! Chunked, checksummed, resumable delivery of JSON record sources to HTTP
//! consumers.
//!
//! # Overview
//!
//! - **Ingest pipeline** ([`ingest`]): source resolution, streaming
//!   extraction, delivery with retries, durable progress and the dispatcher
//!   that runs ingestions in the background
//! - **HTTP API** ([`features`]): `POST /api/ingest`,
//!   `GET /api/ingestions/:id`, `GET /health`
//! - **Reference consumer** ([`consumer`]): validator-backed receiving
//!   endpoint used by the `ferry-consumer` binary
//! - **Configuration** ([`config`]): environment-based settings
//!
//! # Example
//!
//! ```no_run
//! use ferry_server::{build_state, config::Config, create_router};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let state = build_state(&config).await?;
//!     let app = create_router(state, &config);
//!     let listener = tokio::net::TcpListener::bind(config.bind_address()).await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod consumer;
pub mod error;
pub mod features;
pub mod ingest;
pub mod middleware;

use std::sync::Arc;

use axum::Router;
use tower_http::compression::CompressionLayer;

use crate::config::Config;
use crate::features::AppState;
use crate::ingest::progress::connect;
use crate::ingest::{
    Dispatcher, DispatcherDeps, HttpTransport, RunRegistry, SourceResolver, SqliteProgressStore,
};

pub use error::AppError;

/// Open the database and wire the dispatcher from configuration
pub async fn build_state(config: &Config) -> anyhow::Result<AppState> {
    let pool = connect(&config.store.database_url, config.store.max_connections).await?;

    let client = reqwest::Client::builder()
        .timeout(config.delivery.request_timeout())
        .build()?;
    // Connect timeout only; source downloads are unbounded in size
    let download_client = reqwest::Client::builder()
        .connect_timeout(config.delivery.request_timeout())
        .build()?;

    let dispatcher = Dispatcher::new(
        DispatcherDeps {
            transport: Arc::new(HttpTransport::new(client)),
            store: Arc::new(SqliteProgressStore::new(pool.clone())),
            registry: RunRegistry::new(pool.clone()),
            resolver: SourceResolver::new(download_client),
            policy: config.delivery.policy(),
        },
        config.dispatcher.max_concurrent_runs,
    );

    Ok(AppState { dispatcher, pool })
}

/// Application router with the middleware stack applied
pub fn create_router(state: AppState, config: &Config) -> Router {
    features::router(state)
        .layer(CompressionLayer::new())
        .layer(middleware::tracing_layer())
        .layer(middleware::cors_layer(&config.cors))
}
