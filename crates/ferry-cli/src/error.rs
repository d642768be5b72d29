//! Error types for the ferry CLI
//!
//! Messages are user-facing and say what to check next.

use thiserror::Error;

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Error, Debug)]
pub enum CliError {
    /// The server answered with an error body
    #[error("Server rejected the request ({status}): {message}")]
    Server { status: u16, message: String },

    /// The server answered with something that is not the expected JSON
    #[error("Unexpected server response: {0}. Check that --server-url points at a dataferry server.")]
    UnexpectedResponse(String),

    /// Health endpoint reported a problem
    #[error("Server is unhealthy: {0}")]
    Unhealthy(String),

    /// Arguments that clap cannot express on its own
    #[error("Invalid arguments: {0}")]
    InvalidArgs(String),

    /// HTTP request failed
    #[error("Network request failed: {0}. Ensure the dataferry server is running (check with 'ferry health').")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed
    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error(transparent)]
    Common(#[from] ferry_common::FerryError),
}

impl CliError {
    pub fn server(status: u16, message: impl Into<String>) -> Self {
        Self::Server {
            status,
            message: message.into(),
        }
    }

    pub fn invalid_args(msg: impl Into<String>) -> Self {
        Self::InvalidArgs(msg.into())
    }

    /// Exit code for this error: 2 for bad input, 1 otherwise
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::InvalidArgs(_) | CliError::Common(_) => 2,
            CliError::Server { status, .. } if (400..500).contains(status) => 2,
            _ => 1,
        }
    }
}
