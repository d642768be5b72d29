//! Reference consumer endpoint
//!
//! A minimal receiving side built on [`ChunkValidator`], used for manual
//! end-to-end runs and in tests. Rejections are answered with HTTP 400 and a
//! structured acknowledgement body.

use std::sync::{Arc, Mutex, MutexGuard};

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use ferry_common::protocol::ConsumerMessage;
use ferry_common::validator::ChunkValidator;
use ferry_common::{Acknowledgement, CompletionEvent, RejectionReason};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// A chunk the consumer accepted for the first time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivedChunk {
    pub ingestion_id: String,
    pub chunk_number: i64,
    pub chunk_id: String,
    pub records: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceivedSummary {
    pub total_chunks: usize,
    pub chunks: Vec<ReceivedChunk>,
    pub completions: Vec<CompletionEvent>,
}

#[derive(Debug, Default)]
struct Ledger {
    validator: ChunkValidator,
    chunks: Vec<ReceivedChunk>,
    completions: Vec<CompletionEvent>,
}

#[derive(Debug, Clone, Default)]
pub struct ConsumerState {
    ledger: Arc<Mutex<Ledger>>,
}

impl ConsumerState {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Validate and record one message
    pub fn receive(&self, message: &ConsumerMessage) -> Acknowledgement {
        let mut ledger = self.lock();

        match message {
            ConsumerMessage::Chunk(payload) => {
                let replay = ledger
                    .validator
                    .is_processed(&payload.ingestion_id, &payload.chunk_id);
                let ack = ledger.validator.validate(payload);
                if ack.ack && !replay {
                    ledger.chunks.push(ReceivedChunk {
                        ingestion_id: payload.ingestion_id.clone(),
                        chunk_number: payload.chunk_number,
                        chunk_id: payload.chunk_id.clone(),
                        records: payload.records.len(),
                    });
                }
                ack
            },
            ConsumerMessage::Completion(event) => {
                info!(
                    ingestion_id = %event.ingestion_id,
                    total_records = event.total_records,
                    "Completion received"
                );
                ledger.completions.push(event.clone());
                ledger.validator.complete(event)
            },
        }
    }

    pub fn summary(&self) -> ReceivedSummary {
        let ledger = self.lock();
        ReceivedSummary {
            total_chunks: ledger.chunks.len(),
            chunks: ledger.chunks.clone(),
            completions: ledger.completions.clone(),
        }
    }
}

pub fn consumer_router(state: ConsumerState) -> Router {
    Router::new()
        .route("/callback", post(callback))
        .route("/received", get(received))
        .with_state(state)
}

async fn callback(State(state): State<ConsumerState>, body: Bytes) -> (StatusCode, Json<Acknowledgement>) {
    let message: ConsumerMessage = match serde_json::from_slice(&body) {
        Ok(message) => message,
        Err(e) => {
            warn!(error = %e, "Unreadable message");
            let reason = RejectionReason::Other("MALFORMED_MESSAGE".to_string());
            return (StatusCode::BAD_REQUEST, Json(Acknowledgement::rejected("", -1, reason)));
        },
    };

    let ack = state.receive(&message);
    let status = if ack.ack {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };
    (status, Json(ack))
}

async fn received(State(state): State<ConsumerState>) -> Json<ReceivedSummary> {
    Json(state.summary())
}
