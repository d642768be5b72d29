//! HTTP feature slices
//!
//! Each feature is a vertical slice with its own `commands/`, `queries/` and
//! `routes.rs`.
//!
//! - **ingestions**: submit a run, query its status
//! - **health**: store connectivity

pub mod health;
pub mod ingestions;

use axum::{routing::get, Router};
use sqlx::SqlitePool;

use crate::ingest::Dispatcher;

/// Shared state for all feature routes
#[derive(Clone)]
pub struct AppState {
    /// Runs submissions and owns the registry and progress store
    pub dispatcher: Dispatcher,
    /// Used for health checks
    pub pool: SqlitePool,
}

/// API router without middleware layers
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .nest("/api", ingestions::ingestion_routes())
        .with_state(state)
}
