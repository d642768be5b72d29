//! API endpoint URL builders

fn base(base_url: &str) -> &str {
    base_url.trim_end_matches('/')
}

/// Build health check URL
pub fn health_url(base_url: &str) -> String {
    format!("{}/health", base(base_url))
}

/// Build ingestion submission URL
pub fn ingest_url(base_url: &str) -> String {
    format!("{}/api/ingest", base(base_url))
}

/// Build ingestion status URL
pub fn ingestion_status_url(base_url: &str, ingestion_id: &str) -> String {
    format!("{}/api/ingestions/{}", base(base_url), ingestion_id)
}
