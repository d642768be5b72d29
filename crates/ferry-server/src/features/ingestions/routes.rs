//! Ingestion API routes
//!
//! - `POST /api/ingest` - Start an ingestion run (returns immediately)
//! - `GET /api/ingestions/:ingestion_id` - Run status and delivery progress

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use ferry_common::protocol::{IngestionRequest, IngestionStarted};

use super::commands::{submit, SubmitIngestionCommand};
use super::queries::{get_status, GetIngestionStatusQuery, IngestionStatusResponse};
use crate::error::AppError;
use crate::features::AppState;

pub fn ingestion_routes() -> Router<AppState> {
    Router::new()
        .route("/ingest", post(submit_ingestion))
        .route("/ingestions/:ingestion_id", get(get_ingestion_status))
}

async fn submit_ingestion(
    State(state): State<AppState>,
    Json(request): Json<IngestionRequest>,
) -> Result<Json<IngestionStarted>, AppError> {
    let started = submit::handle(&state.dispatcher, SubmitIngestionCommand::from(request)).await?;
    Ok(Json(started))
}

async fn get_ingestion_status(
    State(state): State<AppState>,
    Path(ingestion_id): Path<String>,
) -> Result<Json<IngestionStatusResponse>, AppError> {
    let response = get_status::handle(
        state.dispatcher.registry(),
        state.dispatcher.store().as_ref(),
        GetIngestionStatusQuery { ingestion_id },
    )
    .await?;
    Ok(Json(response))
}
