//! Shared fixtures for ferry-server integration tests
//!
//! - [`FakeConsumer`]: in-process [`ChunkTransport`] backed by the reference
//!   validator, with scriptable failures and a log of every attempt
//! - Source fixtures written to temporary directories
//! - An sqlite-backed progress store per test

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ferry_common::protocol::{ChunkingMode, ConsumerMessage, FileType};
use ferry_common::validator::ChunkValidator;
use ferry_common::{Acknowledgement, ChunkPayload, CompletionEvent, RejectionReason};
use ferry_server::ingest::progress::connect;
use ferry_server::ingest::transport::interpret;
use ferry_server::ingest::{
    ChunkTransport, DeliveryEngine, DeliveryPolicy, ProgressStore, RunConfig, SendFailure,
    SourceResolver, SqliteProgressStore,
};
use serde_json::json;
use sqlx::SqlitePool;

/// Initialize tracing for tests
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,ferry_server=debug")),
        )
        .with_test_writer()
        .try_init();
}

/// One call the engine made on the transport
#[derive(Debug, Clone, PartialEq)]
pub enum Attempt {
    Chunk { number: i64, records: usize, is_last: bool },
    Completion(CompletionEvent),
}

type FailureRule = Box<dyn Fn(&ConsumerMessage, usize) -> Option<SendFailure> + Send + Sync>;

/// Validator-backed consumer. `fail_when` sees each message and how many
/// times that same message was attempted before, and may inject a failure.
pub struct FakeConsumer {
    validator: Option<Mutex<ChunkValidator>>,
    attempts: Mutex<Vec<Attempt>>,
    fail_when: Mutex<Option<FailureRule>>,
}

impl FakeConsumer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            validator: Some(Mutex::new(ChunkValidator::new())),
            attempts: Mutex::new(Vec::new()),
            fail_when: Mutex::new(None),
        })
    }

    /// Acknowledges anything not failed by a rule, without validation
    pub fn lenient() -> Arc<Self> {
        Arc::new(Self {
            validator: None,
            attempts: Mutex::new(Vec::new()),
            fail_when: Mutex::new(None),
        })
    }

    pub fn fail_when(
        &self,
        rule: impl Fn(&ConsumerMessage, usize) -> Option<SendFailure> + Send + Sync + 'static,
    ) {
        *self.fail_when.lock().unwrap() = Some(Box::new(rule));
    }

    pub fn heal(&self) {
        *self.fail_when.lock().unwrap() = None;
    }

    pub fn attempts(&self) -> Vec<Attempt> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn clear_attempts(&self) {
        self.attempts.lock().unwrap().clear();
    }

    /// Chunk numbers in the order they were attempted
    pub fn chunk_attempts(&self) -> Vec<i64> {
        self.attempts()
            .into_iter()
            .filter_map(|a| match a {
                Attempt::Chunk { number, .. } => Some(number),
                Attempt::Completion(_) => None,
            })
            .collect()
    }

    pub fn completions(&self) -> Vec<CompletionEvent> {
        self.attempts()
            .into_iter()
            .filter_map(|a| match a {
                Attempt::Completion(event) => Some(event),
                Attempt::Chunk { .. } => None,
            })
            .collect()
    }

    fn deliver(&self, message: ConsumerMessage, attempt: Attempt) -> Result<Acknowledgement, SendFailure> {
        let previous = {
            let mut attempts = self.attempts.lock().unwrap();
            let previous = attempts.iter().filter(|a| **a == attempt).count();
            attempts.push(attempt);
            previous
        };

        if let Some(rule) = self.fail_when.lock().unwrap().as_ref() {
            if let Some(failure) = rule(&message, previous) {
                return Err(failure);
            }
        }

        match &self.validator {
            Some(validator) => interpret(validator.lock().unwrap().handle(&message)),
            None => Ok(match &message {
                ConsumerMessage::Chunk(p) => Acknowledgement::accepted(&p.ingestion_id, p.chunk_number),
                ConsumerMessage::Completion(e) => Acknowledgement::accepted(&e.ingestion_id, e.chunk_number),
            }),
        }
    }
}

#[async_trait]
impl ChunkTransport for FakeConsumer {
    async fn send_chunk(&self, _: &str, payload: &ChunkPayload) -> Result<Acknowledgement, SendFailure> {
        let attempt = Attempt::Chunk {
            number: payload.chunk_number,
            records: payload.records.len(),
            is_last: payload.is_last,
        };
        self.deliver(ConsumerMessage::Chunk(payload.clone()), attempt)
    }

    async fn send_completion(&self, _: &str, event: &CompletionEvent) -> Result<Acknowledgement, SendFailure> {
        self.deliver(ConsumerMessage::Completion(event.clone()), Attempt::Completion(event.clone()))
    }
}

/// Failure for chunk `number` only
pub fn reject_chunk(number: i64, reason: RejectionReason) -> impl Fn(&ConsumerMessage, usize) -> Option<SendFailure> {
    move |message, _| match message {
        ConsumerMessage::Chunk(payload) if payload.chunk_number == number => {
            Some(SendFailure::Rejected(reason.clone()))
        },
        _ => None,
    }
}

/// Write `count` product records starting at id `start` as a JSON array
pub fn write_products(dir: &Path, name: &str, start: usize, count: usize) -> PathBuf {
    let records: Vec<_> = (start..start + count)
        .map(|i| {
            json!({
                "sku": format!("SKU-{:05}", i),
                "name": format!("Product {}", i),
                "price": (i as f64) * 1.25,
                "in_stock": i % 3 != 0,
            })
        })
        .collect();

    let path = dir.join(name);
    std::fs::write(&path, serde_json::to_vec_pretty(&records).unwrap()).unwrap();
    path
}

pub fn run_config(id: &str, source: &Path, chunking: ChunkingMode) -> RunConfig {
    RunConfig {
        ingestion_id: id.to_string(),
        file_id: ferry_common::identity::file_id(&source.display().to_string(), "json"),
        source: source.display().to_string(),
        file_type: FileType::Json,
        callback_url: "http://consumer.test/callback".to_string(),
        chunking,
    }
}

pub async fn sqlite_pool() -> SqlitePool {
    connect("sqlite::memory:", 1).await.unwrap()
}

pub async fn sqlite_store() -> Arc<SqliteProgressStore> {
    Arc::new(SqliteProgressStore::new(sqlite_pool().await))
}

pub fn engine(
    transport: Arc<dyn ChunkTransport>,
    store: Arc<dyn ProgressStore>,
    policy: DeliveryPolicy,
) -> DeliveryEngine {
    DeliveryEngine::new(
        transport,
        store,
        SourceResolver::new(reqwest::Client::new()),
        policy,
        tracing::info_span!("test_run"),
    )
}
