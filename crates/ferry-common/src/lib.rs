//! dataferry Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, integrity utilities, and error handling for dataferry.
//!
//! # Overview
//!
//! This crate provides the pieces of the chunked-delivery protocol that both
//! sides of the wire need:
//!
//! - **Identity**: deterministic file and ingestion identifiers
//! - **Integrity**: canonical serialization, chunk checksums and chunk ids
//! - **Protocol**: chunk payloads, completion events and acknowledgements
//! - **Validator**: the consumer-side reference validator
//! - **Logging**: tracing subscriber setup shared by every binary
//!
//! # Example
//!
//! ```
//! use ferry_common::{identity, integrity, Record};
//!
//! let file_id = identity::file_id("/data/products.json", "json");
//! let ingestion_id = identity::ingestion_id(&file_id, identity::RESUME_TOKEN);
//!
//! let mut record = Record::new();
//! record.insert("sku".to_string(), "A-1".into());
//! record.insert("price".to_string(), 9.5_f64.into());
//! let records = vec![record];
//! let checksum = integrity::checksum(&records);
//! let chunk_id = integrity::chunk_id(&ingestion_id, 0);
//! assert_eq!(checksum.len(), 64);
//! assert!(chunk_id.ends_with(":0"));
//! ```

pub mod error;
pub mod identity;
pub mod integrity;
pub mod logging;
pub mod protocol;
pub mod validator;

// Re-export commonly used types
pub use error::{FerryError, Result};
pub use protocol::{Acknowledgement, ChunkPayload, CompletionEvent, Record, RejectionReason};
