//! Error handling for camstream

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Unknown device, session, or file
    #[error("Not found: {0}")]
    NotFound(String),

    /// Device exists but is not in a usable state (e.g. offline)
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// No playable source URL could be derived for a device
    #[error("Cannot resolve source URL: {0}")]
    Resolution(String),

    /// Transcoder process could not be started
    #[error("Failed to start transcoder: {0}")]
    Spawn(String),

    /// Operation exceeded its time budget
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Output artifact not written yet (transcoder still starting)
    #[error("Not ready: {0}")]
    NotReady(String),

    /// Single frame capture failed
    #[error("Capture failed: {0}")]
    Capture(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Conflict (duplicate)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// SQLx database error
    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

impl Error {
    /// HTTP status and stable error code for this error
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Error::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Error::InvalidState(_) => (StatusCode::BAD_REQUEST, "INVALID_STATE"),
            Error::Resolution(_) => (StatusCode::BAD_REQUEST, "RESOLUTION_FAILED"),
            Error::Spawn(_) => (StatusCode::INTERNAL_SERVER_ERROR, "SPAWN_FAILED"),
            Error::Timeout(_) => (StatusCode::INTERNAL_SERVER_ERROR, "TIMEOUT"),
            Error::NotReady(_) => (StatusCode::SERVICE_UNAVAILABLE, "NOT_READY"),
            Error::Capture(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CAPTURE_FAILED"),
            Error::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            Error::Conflict(_) => (StatusCode::BAD_REQUEST, "CONFLICT"),
            Error::Database(_) | Error::Sqlx(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR")
            }
            Error::Serialization(_) => (StatusCode::INTERNAL_SERVER_ERROR, "SERIALIZATION_ERROR"),
            Error::Http(_) => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR"),
            Error::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR"),
            Error::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_code) = self.status_and_code();
        let message = self.to_string();

        if status.is_server_error() {
            tracing::error!(
                status = %status,
                error_code = %error_code,
                message = %message,
                "Request error"
            );
        } else {
            tracing::debug!(
                status = %status,
                error_code = %error_code,
                message = %message,
                "Request rejected"
            );
        }

        let body = Json(json!({
            "success": false,
            "error_code": error_code,
            "message": message
        }));

        (status, body).into_response()
    }
}
