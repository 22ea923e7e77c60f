//! Stream API Routes
//!
//! ## Endpoints
//! - POST /stream/start/:device_id - Start (or join) a device stream
//! - POST /stream/stop/:device_id - Stop a device stream
//! - GET /stream/play/:device_id - HLS playlist or MJPEG multipart
//! - GET /stream/play/:device_id/:segment - HLS segment
//! - GET /stream/status - All sessions
//! - POST /stream/snapshot/:device_id - Capture one frame
//! - GET /stream/snapshot/:device_id/:timestamp - Captured frame

use axum::{
    body::{Body, Bytes},
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;

use super::optional_json;
use crate::error::{Error, Result};
use crate::stream_manager::{
    OutputFormat, Playback, StartOutcome, StopOutcome, HLS_CONTENT_TYPE, MJPEG_CONTENT_TYPE,
    SEGMENT_CONTENT_TYPE,
};
use crate::state::AppState;

/// Create stream routes
pub fn stream_routes() -> Router<AppState> {
    Router::new()
        .route("/start/:device_id", post(start_stream))
        .route("/stop/:device_id", post(stop_stream))
        .route("/play/:device_id", get(play_stream))
        .route("/play/:device_id/:segment", get(play_segment))
        .route("/status", get(stream_status))
        .route("/snapshot/:device_id", post(capture_snapshot))
        .route("/snapshot/:device_id/:timestamp", get(get_snapshot))
}

#[derive(Debug, Default, Deserialize)]
struct StartStreamRequest {
    format: Option<String>,
}

async fn start_stream(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse> {
    let req: StartStreamRequest = optional_json(&body)?;
    let format = match req.format {
        None => OutputFormat::default(),
        Some(f) => OutputFormat::parse(&f)
            .ok_or_else(|| Error::Validation(format!("Unsupported format: {}", f)))?,
    };

    let outcome = state.stream.start(&device_id, format).await?;
    let message = match &outcome {
        StartOutcome::AlreadyRunning(_) => "Stream already running",
        StartOutcome::Started(_) => "Stream started",
    };
    let playback = outcome.playback_ref();

    Ok(Json(json!({
        "success": true,
        "message": message,
        "streamUrl": playback.stream_url,
        "sourceUrl": playback.source_url,
        "format": playback.format,
    })))
}

async fn stop_stream(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> Result<impl IntoResponse> {
    match state.stream.stop(&device_id).await {
        StopOutcome::Stopped(termination) => Ok(Json(json!({
            "success": true,
            "message": "Stream stopped",
            "termination": termination,
        }))),
        StopOutcome::NotFound => Err(Error::NotFound(format!(
            "No active stream for device {}",
            device_id
        ))),
    }
}

async fn play_stream(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> Result<Response> {
    let response = match state.stream.play(&device_id).await? {
        Playback::Playlist(playlist) => (
            [
                (header::CONTENT_TYPE, HLS_CONTENT_TYPE),
                (header::CACHE_CONTROL, "no-cache"),
            ],
            playlist,
        )
            .into_response(),
        Playback::Mjpeg(frames) => {
            // Ends when the session is stopped; a disconnecting viewer just drops it
            let body = Body::from_stream(frames.map(Ok::<_, Infallible>));
            (
                [
                    (header::CONTENT_TYPE, MJPEG_CONTENT_TYPE),
                    (header::CACHE_CONTROL, "no-cache"),
                ],
                body,
            )
                .into_response()
        }
    };
    Ok(response)
}

async fn play_segment(
    State(state): State<AppState>,
    Path((device_id, segment)): Path<(String, String)>,
) -> Result<impl IntoResponse> {
    let data = state.stream.segment(&device_id, &segment).await?;
    Ok(([(header::CONTENT_TYPE, SEGMENT_CONTENT_TYPE)], data))
}

async fn stream_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "success": true,
        "data": state.stream.status().await,
    }))
}

async fn capture_snapshot(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> Result<impl IntoResponse> {
    let snapshot = state.stream.snapshot(&device_id).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Snapshot captured",
        "snapshotPath": snapshot.path,
        "snapshotUrl": snapshot.url,
    })))
}

async fn get_snapshot(
    State(state): State<AppState>,
    Path((device_id, timestamp)): Path<(String, i64)>,
) -> Result<impl IntoResponse> {
    let data = state.stream.snapshot_file(&device_id, timestamp).await?;
    Ok(([(header::CONTENT_TYPE, "image/jpeg")], data))
}
