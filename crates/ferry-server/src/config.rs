//! Configuration management

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ingest::delivery::{DeliveryPolicy, DEFAULT_MAX_ATTEMPTS};
use crate::ingest::dispatcher::DEFAULT_MAX_CONCURRENT_RUNS;
use crate::ingest::transport::DEFAULT_REQUEST_TIMEOUT_SECS;
use crate::ingest::ChecksumMismatchPolicy;

// ============================================================================
// Server Configuration Constants
// ============================================================================

/// Default server host binding.
pub const DEFAULT_SERVER_HOST: &str = "127.0.0.1";

/// Default server port.
pub const DEFAULT_SERVER_PORT: u16 = 8000;

/// Default shutdown timeout in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Default progress database, created next to the working directory.
pub const DEFAULT_DATABASE_URL: &str = "sqlite://ferry.db";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 5;

/// Default pause between send attempts in milliseconds.
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 0;

/// Default CORS allowed origin for local development.
pub const DEFAULT_CORS_ALLOWED_ORIGIN: &str = "http://localhost:3000";

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub delivery: DeliveryConfig,
    pub dispatcher: DispatcherConfig,
    pub cors: CorsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub shutdown_timeout_secs: u64,
}

/// Progress store and run registry database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub database_url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    pub max_attempts: u32,
    pub request_timeout_secs: u64,
    pub checksum_mismatch_policy: ChecksumMismatchPolicy,
    pub retry_backoff_ms: u64,
}

impl DeliveryConfig {
    pub fn policy(&self) -> DeliveryPolicy {
        DeliveryPolicy {
            max_attempts: self.max_attempts,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
            checksum_mismatch: self.checksum_mismatch_policy,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    pub max_concurrent_runs: usize,
    /// Re-dispatch runs left `RUNNING` by a previous process
    pub resume_on_startup: bool,
}

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allow_credentials: bool,
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from `.env`, the environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let checksum_mismatch_policy = match std::env::var("FERRY_CHECKSUM_POLICY") {
            Ok(value) => value.parse()?,
            Err(_) => ChecksumMismatchPolicy::default(),
        };

        let config = Config {
            server: ServerConfig {
                host: std::env::var("FERRY_HOST").unwrap_or_else(|_| DEFAULT_SERVER_HOST.to_string()),
                port: env_parse("FERRY_PORT", DEFAULT_SERVER_PORT),
                shutdown_timeout_secs: env_parse("FERRY_SHUTDOWN_TIMEOUT", DEFAULT_SHUTDOWN_TIMEOUT_SECS),
            },
            store: StoreConfig {
                database_url: std::env::var("FERRY_DATABASE_URL")
                    .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
                max_connections: env_parse(
                    "FERRY_DATABASE_MAX_CONNECTIONS",
                    DEFAULT_DATABASE_MAX_CONNECTIONS,
                ),
            },
            delivery: DeliveryConfig {
                max_attempts: env_parse("FERRY_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS),
                request_timeout_secs: env_parse("FERRY_REQUEST_TIMEOUT", DEFAULT_REQUEST_TIMEOUT_SECS),
                checksum_mismatch_policy,
                retry_backoff_ms: env_parse("FERRY_RETRY_BACKOFF_MS", DEFAULT_RETRY_BACKOFF_MS),
            },
            dispatcher: DispatcherConfig {
                max_concurrent_runs: env_parse("FERRY_MAX_CONCURRENT_RUNS", DEFAULT_MAX_CONCURRENT_RUNS),
                resume_on_startup: env_parse("FERRY_RESUME_ON_STARTUP", true),
            },
            cors: CorsConfig {
                allowed_origins: std::env::var("CORS_ALLOWED_ORIGINS")
                    .unwrap_or_else(|_| DEFAULT_CORS_ALLOWED_ORIGIN.to_string())
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
                allow_credentials: env_parse("CORS_ALLOW_CREDENTIALS", false),
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port must be greater than 0");
        }

        if self.store.database_url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        if self.store.max_connections == 0 {
            anyhow::bail!("Database max_connections must be greater than 0");
        }

        if self.delivery.max_attempts == 0 {
            anyhow::bail!("max_attempts must be at least 1");
        }

        if self.delivery.request_timeout_secs == 0 {
            anyhow::bail!("Request timeout must be greater than 0");
        }

        if self.dispatcher.max_concurrent_runs == 0 {
            anyhow::bail!("max_concurrent_runs must be at least 1");
        }

        if self.cors.allowed_origins.is_empty() {
            tracing::warn!("No CORS origins configured - all origins will be allowed");
        }

        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: DEFAULT_SERVER_HOST.to_string(),
                port: DEFAULT_SERVER_PORT,
                shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
            },
            store: StoreConfig {
                database_url: DEFAULT_DATABASE_URL.to_string(),
                max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
            },
            delivery: DeliveryConfig {
                max_attempts: DEFAULT_MAX_ATTEMPTS,
                request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
                checksum_mismatch_policy: ChecksumMismatchPolicy::default(),
                retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
            },
            dispatcher: DispatcherConfig {
                max_concurrent_runs: DEFAULT_MAX_CONCURRENT_RUNS,
                resume_on_startup: true,
            },
            cors: CorsConfig {
                allowed_origins: vec![DEFAULT_CORS_ALLOWED_ORIGIN.to_string()],
                allow_credentials: false,
            },
        }
    }
}
