//! Ingestion queries (read operations)

pub mod get_status;

pub use get_status::{GetIngestionStatusError, GetIngestionStatusQuery, IngestionStatusResponse};
