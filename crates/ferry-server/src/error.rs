//! Server-specific error types

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use ferry_common::FerryError;
use serde_json::json;
use thiserror::Error;

use crate::ingest::DispatchError;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unprocessable: {0}")]
    Unprocessable(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Dataferry error: {0}")]
    Ferry(#[from] FerryError),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Ferry(e) => match e {
                FerryError::SourceNotFound(_) => StatusCode::NOT_FOUND,
                FerryError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
                FerryError::Parse(_) => StatusCode::UNPROCESSABLE_ENTITY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl From<DispatchError> for AppError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::AlreadyRunning(id) => {
                AppError::Conflict(format!("Ingestion {} is already running", id))
            },
            DispatchError::Registry(e) => AppError::Ferry(e),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            AppError::NotFound(message)
            | AppError::BadRequest(message)
            | AppError::Unprocessable(message)
            | AppError::Conflict(message) => message,
            AppError::Internal(message) => {
                tracing::error!("Internal error: {}", message);
                message
            },
            AppError::Ferry(e) if status.is_server_error() => {
                tracing::error!("Server error: {:?}", e);
                match e {
                    FerryError::Database(_) => "A database error occurred".to_string(),
                    other => other.to_string(),
                }
            },
            AppError::Ferry(e) => e.to_string(),
        };

        let body = Json(json!({
            "error": {
                "message": message,
                "status": status.as_u16(),
            }
        }));

        (status, body).into_response()
    }
}
