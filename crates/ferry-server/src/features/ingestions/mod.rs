//! Ingestion submission and status

pub mod commands;
pub mod queries;
pub mod routes;

pub use routes::ingestion_routes;
