//! Chunked delivery pipeline
//!
//! # Architecture
//!
//! - **source**: resolves a submitted path or URL into the files to read
//! - **extractor**: streams records and cuts them into chunks
//! - **transport**: posts chunks and the completion event to the consumer
//! - **progress**: durable per-run cursor used for resume
//! - **registry**: submitted runs and their outcome
//! - **delivery**: the engine tying the above together for one run
//! - **dispatcher**: background execution of runs

pub mod delivery;
pub mod dispatcher;
pub mod error;
pub mod extractor;
pub mod progress;
pub mod registry;
pub mod run;
pub mod source;
pub mod transport;

pub use delivery::{DeliveryEngine, DeliveryPolicy};
pub use dispatcher::{DispatchError, Dispatcher, DispatcherDeps};
pub use error::{ChecksumMismatchPolicy, DeliveryError, SendFailure};
pub use progress::{MemoryProgressStore, ProgressCursor, ProgressStatus, ProgressStore, SqliteProgressStore};
pub use registry::{RunRecord, RunRegistry};
pub use run::{RunConfig, RunStatus, RunSummary};
pub use source::SourceResolver;
pub use transport::{ChunkTransport, HttpTransport};
