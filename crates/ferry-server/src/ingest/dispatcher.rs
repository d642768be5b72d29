//! Run dispatcher
//!
//! Owns the background tasks that execute ingestion runs. A submission hands
//! its [`RunConfig`] over and returns immediately; the run proceeds on a
//! supervised task bounded by a semaphore. Each run gets its own span so every
//! event it emits carries the `ingestion_id`.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use ferry_common::FerryError;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, info_span, warn, Instrument};

use super::delivery::{DeliveryEngine, DeliveryPolicy};
use super::progress::ProgressStore;
use super::registry::RunRegistry;
use super::run::{RunConfig, RunStatus, RunSummary};
use super::source::SourceResolver;
use super::transport::ChunkTransport;

pub const DEFAULT_MAX_CONCURRENT_RUNS: usize = 4;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Ingestion {0} is already running")]
    AlreadyRunning(String),

    #[error("Failed to register ingestion: {0}")]
    Registry(#[from] FerryError),
}

/// Collaborators shared by every run
pub struct DispatcherDeps {
    pub transport: Arc<dyn ChunkTransport>,
    pub store: Arc<dyn ProgressStore>,
    pub registry: RunRegistry,
    pub resolver: SourceResolver,
    pub policy: DeliveryPolicy,
}

struct Inner {
    deps: DispatcherDeps,
    permits: Arc<Semaphore>,
    active: Mutex<HashSet<String>>,
    tasks: tokio::sync::Mutex<JoinSet<()>>,
}

#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl Dispatcher {
    pub fn new(deps: DispatcherDeps, max_concurrent_runs: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                deps,
                permits: Arc::new(Semaphore::new(max_concurrent_runs.max(1))),
                active: Mutex::new(HashSet::new()),
                tasks: tokio::sync::Mutex::new(JoinSet::new()),
            }),
        }
    }

    pub fn registry(&self) -> &RunRegistry {
        &self.inner.deps.registry
    }

    pub fn store(&self) -> &Arc<dyn ProgressStore> {
        &self.inner.deps.store
    }

    pub fn is_active(&self, ingestion_id: &str) -> bool {
        self.active().contains(ingestion_id)
    }

    /// Register a run and start it in the background
    pub async fn submit(&self, config: RunConfig) -> Result<(), DispatchError> {
        if !self.claim(&config.ingestion_id) {
            return Err(DispatchError::AlreadyRunning(config.ingestion_id));
        }

        if let Err(e) = self.inner.deps.registry.register(&config).await {
            self.release(&config.ingestion_id);
            return Err(e.into());
        }

        self.spawn(config).await;
        Ok(())
    }

    /// Re-dispatch every run the registry still lists as running
    pub async fn resume_pending(&self) -> Result<usize, FerryError> {
        let pending = self.inner.deps.registry.list_running().await?;
        let mut resumed = 0;

        for record in pending {
            if !self.claim(&record.config.ingestion_id) {
                continue;
            }
            info!(ingestion_id = %record.config.ingestion_id, "Resuming unfinished ingestion");
            self.spawn(record.config).await;
            resumed += 1;
        }

        Ok(resumed)
    }

    /// Wait for in-flight runs, aborting whatever is left after `timeout`.
    /// Aborted runs stay `RUNNING` in the registry and resume on next start.
    pub async fn shutdown(&self, timeout: Duration) {
        let mut tasks = self.inner.tasks.lock().await;
        if tasks.is_empty() {
            return;
        }

        info!(runs = tasks.len(), "Waiting for ingestion runs to finish");
        let drained = tokio::time::timeout(timeout, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            warn!(runs = tasks.len(), "Shutdown timeout reached, aborting ingestion runs");
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
        }
    }

    fn active(&self) -> MutexGuard<'_, HashSet<String>> {
        self.inner.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn claim(&self, ingestion_id: &str) -> bool {
        self.active().insert(ingestion_id.to_string())
    }

    fn release(&self, ingestion_id: &str) {
        self.active().remove(ingestion_id);
    }

    async fn spawn(&self, config: RunConfig) {
        let span = info_span!("ingestion", ingestion_id = %config.ingestion_id, source = %config.source);
        let this = self.clone();

        let mut tasks = self.inner.tasks.lock().await;
        while tasks.try_join_next().is_some() {}

        tasks.spawn(
            async move {
                let Ok(_permit) = this.inner.permits.clone().acquire_owned().await else {
                    return;
                };
                this.execute(config).await;
            }
            .instrument(span),
        );
    }

    async fn execute(&self, config: RunConfig) {
        let deps = &self.inner.deps;
        let id = config.ingestion_id.clone();

        let (start_chunk, _) = self.acked(&id).await;
        let engine = DeliveryEngine::new(
            deps.transport.clone(),
            deps.store.clone(),
            deps.resolver.clone(),
            deps.policy,
            tracing::Span::current(),
        );

        let finished = match engine.run(config).await {
            Ok(summary) => deps.registry.finish(&id, RunStatus::Completed, &summary, None).await,
            Err(e) => {
                error!(error = %e, "Ingestion aborted");
                // Chunks acknowledged before the failure still count
                let (last_chunk, total_records) = self.acked(&id).await;
                let summary = RunSummary {
                    total_records,
                    chunks_sent: (last_chunk - start_chunk).max(0) as u64,
                    final_chunk: last_chunk,
                    ..Default::default()
                };
                deps.registry
                    .finish(&id, RunStatus::Aborted, &summary, Some(&e.to_string()))
                    .await
            },
        };

        if let Err(e) = finished {
            error!(error = %e, "Failed to record run outcome");
        }

        self.release(&id);
    }

    /// Last acknowledged chunk and record total, `(-1, 0)` when unknown
    async fn acked(&self, ingestion_id: &str) -> (i64, u64) {
        match self.inner.deps.store.load(ingestion_id).await {
            Ok(Some(cursor)) => (cursor.last_chunk, cursor.total_records),
            Ok(None) => (-1, 0),
            Err(e) => {
                warn!(error = %e, "Failed to read progress cursor");
                (-1, 0)
            },
        }
    }
}
