//! Ingestion commands (write operations)

pub mod submit;

pub use submit::{SubmitIngestionCommand, SubmitIngestionError};
