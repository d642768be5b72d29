//! Delivery engine
//!
//! Drives one ingestion run end to end:
//!
//! 1. Load the progress cursor. A run already marked completed sends nothing;
//!    a cursor recorded under other chunk boundaries aborts the run.
//! 2. Resolve the source and stream it into chunks.
//! 3. Suppress chunks at or below the cursor; they were acknowledged by an
//!    earlier run.
//! 4. Send every other chunk, retrying per [`DeliveryPolicy`], and advance the
//!    cursor after each positive acknowledgement.
//! 5. Send the completion event under the same retry budget and mark the run
//!    completed once it is acknowledged.
//!
//! Chunks are strictly sequential: chunk `n + 1` is never sent before chunk
//! `n` is acknowledged. Any failure aborts the run and leaves the cursor at the
//! last acknowledged chunk.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use ferry_common::protocol::FileType;
use ferry_common::{integrity, Acknowledgement, ChunkPayload, CompletionEvent, FerryError};
use tracing::{debug, info, warn, Instrument, Span};

use super::error::{ChecksumMismatchPolicy, DeliveryError, SendFailure};
use super::extractor::{Chunk, ChunkStream};
use super::progress::{ProgressStatus, ProgressStore};
use super::run::{RunConfig, RunSummary};
use super::source::SourceResolver;
use super::transport::ChunkTransport;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Retry behaviour shared by chunk and completion sends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryPolicy {
    /// Attempts per message, first send included
    pub max_attempts: u32,
    /// Pause between attempts; zero retries immediately
    pub retry_backoff: Duration,
    pub checksum_mismatch: ChecksumMismatchPolicy,
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_backoff: Duration::ZERO,
            checksum_mismatch: ChecksumMismatchPolicy::Retry,
        }
    }
}

enum SendError {
    Fatal { attempts: u32, failure: SendFailure },
    Exhausted { attempts: u32, last: SendFailure },
}

pub struct DeliveryEngine {
    transport: Arc<dyn ChunkTransport>,
    store: Arc<dyn ProgressStore>,
    resolver: SourceResolver,
    policy: DeliveryPolicy,
    span: Span,
}

impl DeliveryEngine {
    /// `span` scopes every event the run emits; the owner decides its fields.
    pub fn new(
        transport: Arc<dyn ChunkTransport>,
        store: Arc<dyn ProgressStore>,
        resolver: SourceResolver,
        policy: DeliveryPolicy,
        span: Span,
    ) -> Self {
        Self {
            transport,
            store,
            resolver,
            policy,
            span,
        }
    }

    pub async fn run(self, config: RunConfig) -> Result<RunSummary, DeliveryError> {
        let span = self.span.clone();
        self.execute(config).instrument(span).await
    }

    async fn execute(&self, config: RunConfig) -> Result<RunSummary, DeliveryError> {
        let id = config.ingestion_id.as_str();

        if config.file_type == FileType::Excel {
            return Err(DeliveryError::Source(FerryError::InvalidRequest(
                "excel sources are not supported".to_string(),
            )));
        }

        let cursor = self
            .store
            .load(id)
            .await
            .map_err(DeliveryError::Store)?
            .unwrap_or_default();

        if cursor.status == ProgressStatus::Completed {
            info!(total_records = cursor.total_records, "Run already completed, nothing to send");
            return Ok(RunSummary {
                total_records: cursor.total_records,
                final_chunk: cursor.last_chunk,
                already_completed: true,
                ..Default::default()
            });
        }

        // Chunk numbers from other boundaries would skip or repeat records
        if !cursor.matches(&config.chunking) {
            return Err(DeliveryError::ChunkingChanged {
                stored: cursor.chunking.unwrap_or(config.chunking),
                requested: config.chunking,
            });
        }

        if cursor.last_chunk >= 0 {
            info!(last_chunk = cursor.last_chunk, "Resuming after acknowledged chunk");
        }

        let source = self
            .resolver
            .resolve(&config.source)
            .await
            .map_err(DeliveryError::Source)?;
        info!(
            source = %config.source,
            files = source.files.len(),
            mode = config.chunking.kind(),
            bound = config.chunking.value(),
            "Starting delivery"
        );

        let mut stream = ChunkStream::open(source, config.chunking);
        let mut summary = RunSummary {
            total_records: cursor.total_records,
            final_chunk: -1,
            ..Default::default()
        };

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(DeliveryError::Source)?;
            summary.final_chunk = chunk.number;

            if chunk.number <= cursor.last_chunk {
                debug!(chunk_number = chunk.number, "Skipping acknowledged chunk");
                summary.chunks_skipped += 1;
                continue;
            }

            let records = chunk.records.len() as u64;
            let chunk_number = chunk.number;
            let payload = build_payload(id, chunk);

            self.send_with_retries(|| self.transport.send_chunk(&config.callback_url, &payload))
                .await
                .map_err(|e| match e {
                    SendError::Fatal { failure, .. } => DeliveryError::Fatal {
                        chunk_number,
                        failure,
                    },
                    SendError::Exhausted { attempts, last } => DeliveryError::Exhausted {
                        chunk_number,
                        attempts,
                        last,
                    },
                })?;

            summary.total_records += records;
            summary.chunks_sent += 1;
            self.store
                .record_ack(id, &config.chunking, chunk_number, summary.total_records)
                .await
                .map_err(DeliveryError::Store)?;

            debug!(chunk_number, records, total_records = summary.total_records, "Chunk acknowledged");
        }

        let event = CompletionEvent::new(id, summary.final_chunk, summary.total_records);
        self.send_with_retries(|| self.transport.send_completion(&config.callback_url, &event))
            .await
            .map_err(|e| match e {
                SendError::Fatal { attempts, failure } => DeliveryError::Completion {
                    attempts,
                    last: failure,
                },
                SendError::Exhausted { attempts, last } => DeliveryError::Completion { attempts, last },
            })?;

        self.store
            .mark_completed(id, summary.total_records)
            .await
            .map_err(DeliveryError::Store)?;

        info!(
            chunks_sent = summary.chunks_sent,
            chunks_skipped = summary.chunks_skipped,
            total_records = summary.total_records,
            "Ingestion completed"
        );

        Ok(summary)
    }

    async fn send_with_retries<F, Fut>(&self, mut send: F) -> Result<Acknowledgement, SendError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Acknowledgement, SendFailure>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let failure = match send().await {
                Ok(ack) => return Ok(ack),
                Err(failure) => failure,
            };

            if !failure.is_retryable(self.policy.checksum_mismatch) {
                warn!(attempt, error = %failure, "Send failed, not retrying");
                return Err(SendError::Fatal {
                    attempts: attempt,
                    failure,
                });
            }

            if attempt >= max_attempts {
                warn!(attempt, error = %failure, "Send failed, attempts exhausted");
                return Err(SendError::Exhausted {
                    attempts: attempt,
                    last: failure,
                });
            }

            warn!(attempt, max_attempts, error = %failure, "Send failed, retrying");
            if !self.policy.retry_backoff.is_zero() {
                tokio::time::sleep(self.policy.retry_backoff).await;
            }
            attempt += 1;
        }
    }
}

/// Assemble the wire payload for a chunk
pub fn build_payload(ingestion_id: &str, chunk: Chunk) -> ChunkPayload {
    ChunkPayload {
        ingestion_id: ingestion_id.to_string(),
        chunk_number: chunk.number,
        chunk_id: integrity::chunk_id(ingestion_id, chunk.number),
        checksum: integrity::checksum(&chunk.records),
        records: chunk.records,
        is_last: chunk.is_last,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_build_payload() {
        let records = vec![match json!({"sku": "A-1"}) {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        }];
        let payload = build_payload(
            "abc",
            Chunk {
                number: 7,
                records: records.clone(),
                is_last: true,
            },
        );

        assert_eq!(payload.chunk_id, "abc:7");
        assert_eq!(payload.checksum, integrity::checksum(&records));
        assert!(integrity::verify(&payload.records, &payload.checksum).is_ok());
        assert!(payload.is_last);
    }

    #[test]
    fn test_default_policy() {
        let policy = DeliveryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.checksum_mismatch, ChecksumMismatchPolicy::Retry);
    }
}
