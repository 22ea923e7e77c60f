//! WebAPI - REST API Endpoints
//!
//! ## Responsibilities
//!
//! - HTTP API routes
//! - Request validation
//! - Response formatting

mod ai_routes;
mod routes;
mod stream_routes;

pub use ai_routes::ai_routes;
pub use routes::create_router;
pub use stream_routes::stream_routes;

use axum::body::Bytes;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::de::DeserializeOwned;

use crate::error::{Error, Result};
use crate::models::HealthResponse;
use crate::state::AppState;

/// Parse an optional JSON request body
///
/// An empty body yields `T::default()`. Anything else must be valid JSON for
/// `T`, with or without a `Content-Type` header.
pub(crate) fn optional_json<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| Error::Validation(format!("Invalid request body: {}", e)))
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let response = HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_sec: state.started_at.elapsed().as_secs(),
        active_streams: state.stream.status().await.len(),
    };

    Json(response)
}

#[cfg(all(test, unix))]
mod tests;
