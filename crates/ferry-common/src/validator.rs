//! Reference validator for the consumer side of the protocol
//!
//! A consumer must apply these checks, in this order, for delivery to be safe
//! under retries and restarts:
//!
//! 1. A `chunk_id` that was already accepted is acknowledged again without
//!    reprocessing (idempotent replay).
//! 2. The chunk number must be exactly `last_accepted + 1`, starting at 0.
//! 3. An empty record array is rejected.
//! 4. The recomputed checksum must equal the declared one.
//!
//! Completion events are always acknowledged.

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use crate::integrity;
use crate::protocol::{
    Acknowledgement, ChunkPayload, CompletionEvent, ConsumerMessage, RejectionReason,
};

#[derive(Debug)]
struct IngestionLedger {
    processed: HashSet<String>,
    last_accepted: i64,
}

impl Default for IngestionLedger {
    fn default() -> Self {
        Self {
            processed: HashSet::new(),
            last_accepted: -1,
        }
    }
}

/// In-memory validator state, one ledger per ingestion
#[derive(Debug, Default)]
pub struct ChunkValidator {
    ledgers: HashMap<String, IngestionLedger>,
}

impl ChunkValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatch on message kind
    pub fn handle(&mut self, message: &ConsumerMessage) -> Acknowledgement {
        match message {
            ConsumerMessage::Chunk(payload) => self.validate(payload),
            ConsumerMessage::Completion(event) => self.complete(event),
        }
    }

    /// Validate one chunk and record it on success
    pub fn validate(&mut self, payload: &ChunkPayload) -> Acknowledgement {
        let ledger = self.ledgers.entry(payload.ingestion_id.clone()).or_default();

        if ledger.processed.contains(&payload.chunk_id) {
            debug!(chunk_id = %payload.chunk_id, "Replayed chunk acknowledged without reprocessing");
            return Acknowledgement::accepted(&payload.ingestion_id, payload.chunk_number);
        }

        let expected = ledger.last_accepted + 1;
        if payload.chunk_number != expected {
            warn!(
                chunk_id = %payload.chunk_id,
                expected,
                received = payload.chunk_number,
                "Out-of-order chunk rejected"
            );
            return Acknowledgement::rejected(
                &payload.ingestion_id,
                payload.chunk_number,
                RejectionReason::OutOfOrderChunk,
            );
        }

        if payload.records.is_empty() {
            warn!(chunk_id = %payload.chunk_id, "Empty chunk rejected");
            return Acknowledgement::rejected(
                &payload.ingestion_id,
                payload.chunk_number,
                RejectionReason::EmptyChunk,
            );
        }

        if let Err(e) = integrity::verify(&payload.records, &payload.checksum) {
            warn!(chunk_id = %payload.chunk_id, error = %e, "Checksum mismatch");
            return Acknowledgement::rejected(
                &payload.ingestion_id,
                payload.chunk_number,
                RejectionReason::ChecksumMismatch,
            );
        }

        ledger.processed.insert(payload.chunk_id.clone());
        ledger.last_accepted = payload.chunk_number;
        debug!(chunk_id = %payload.chunk_id, records = payload.records.len(), "Chunk accepted");

        Acknowledgement::accepted(&payload.ingestion_id, payload.chunk_number)
    }

    /// Acknowledge a completion event; no sequence or checksum checks apply
    pub fn complete(&mut self, event: &CompletionEvent) -> Acknowledgement {
        debug!(
            ingestion_id = %event.ingestion_id,
            total_records = event.total_records,
            "Ingestion completed"
        );
        Acknowledgement::accepted(&event.ingestion_id, event.chunk_number)
    }

    /// Last accepted chunk number, `-1` if nothing was accepted yet
    pub fn last_accepted(&self, ingestion_id: &str) -> i64 {
        self.ledgers
            .get(ingestion_id)
            .map(|ledger| ledger.last_accepted)
            .unwrap_or(-1)
    }

    pub fn is_processed(&self, ingestion_id: &str, chunk_id: &str) -> bool {
        self.ledgers
            .get(ingestion_id)
            .is_some_and(|ledger| ledger.processed.contains(chunk_id))
    }
}
