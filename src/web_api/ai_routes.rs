//! AI API Routes
//!
//! ## Endpoints
//! - GET /ai/models - Registered analyzers
//! - POST /ai/start/:device_id - Validate a device for analysis
//! - POST /ai/analyze/:device_id - Snapshot -> analyzers -> recorded events

use axum::{
    body::Bytes,
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use super::optional_json;
use crate::detection::{Frame, DEFAULT_KINDS};
use crate::device_registry::Device;
use crate::error::{Error, Result};
use crate::state::AppState;

/// Create AI routes
pub fn ai_routes() -> Router<AppState> {
    Router::new()
        .route("/models", get(list_models))
        .route("/start/:device_id", post(start_analysis))
        .route("/analyze/:device_id", post(analyze_device))
}

#[derive(Debug, Default, Deserialize)]
struct AnalysisRequest {
    analysis_types: Option<Vec<String>>,
}

impl AnalysisRequest {
    fn kinds(self) -> Vec<String> {
        self.analysis_types
            .filter(|k| !k.is_empty())
            .unwrap_or_else(|| DEFAULT_KINDS.iter().map(|k| k.to_string()).collect())
    }
}

async fn list_models(State(state): State<AppState>) -> impl IntoResponse {
    let models = state.analysis.models();
    Json(json!({
        "success": true,
        "data": {
            "total_models": models.len(),
            "models": models,
        }
    }))
}

/// Device must exist and be online
async fn online_device(state: &AppState, device_id: &str) -> Result<Device> {
    let device = state
        .lookup
        .find_device(device_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Device {}", device_id)))?;
    if !device.is_online() {
        return Err(Error::InvalidState(format!(
            "Device {} is {}, not online",
            device_id, device.status
        )));
    }
    Ok(device)
}

async fn start_analysis(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse> {
    let kinds = optional_json::<AnalysisRequest>(&body)?.kinds();
    online_device(&state, &device_id).await?;

    Ok(Json(json!({
        "success": true,
        "message": "AI analysis started",
        "analysis_types": kinds,
    })))
}

async fn analyze_device(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse> {
    online_device(&state, &device_id).await?;
    if state.analysis.is_empty() {
        return Err(Error::InvalidState("No analyzers configured".to_string()));
    }
    let kinds = optional_json::<AnalysisRequest>(&body)?.kinds();

    let snapshot = state.stream.snapshot(&device_id).await?;
    let jpeg = tokio::fs::read(&snapshot.path).await?;
    let frame = Frame::new(&device_id, jpeg);

    let detections = state.analysis.analyze(&frame, &kinds).await;
    let events = state.recorder.record(&frame, &detections).await?;

    Ok(Json(json!({
        "success": true,
        "data": {
            "snapshotUrl": snapshot.url,
            "detections": detections,
            "events": events,
        }
    })))
}
