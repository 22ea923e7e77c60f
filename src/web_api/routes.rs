//! API Routes

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{get, put},
    Json, Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::ai_routes::ai_routes;
use super::stream_routes::stream_routes;
use crate::detection::{CreateEventRequest, EventCounts, EventQuery, Statistics};
use crate::device_registry::{
    assign_device_id, CreateDeviceRequest, DeviceStatus, UpdateDeviceRequest, UpdateStatusRequest,
};
use crate::error::{Error, Result};
use crate::models::ApiResponse;
use crate::state::AppState;
use crate::stream_manager::{validate_device_id, StopOutcome};

/// Create API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/healthz", get(super::health_check))
        // Devices
        .route("/devices", get(list_devices).post(create_device))
        .route(
            "/devices/:device_id",
            get(get_device).put(update_device).delete(delete_device),
        )
        .route("/devices/:device_id/status", put(update_device_status))
        // Events
        .route("/events", get(list_events).post(create_event))
        .route("/statistics", get(statistics))
        // Streams / AI
        .nest("/stream", stream_routes())
        .nest("/ai", ai_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ========================================
// Device Handlers
// ========================================

async fn list_devices(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let devices = state.devices.list().await?;
    Ok(Json(ApiResponse::success(devices)))
}

async fn get_device(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> Result<impl IntoResponse> {
    let device = state
        .devices
        .get(&device_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Device {}", device_id)))?;
    Ok(Json(ApiResponse::success(device)))
}

async fn create_device(
    State(state): State<AppState>,
    Json(req): Json<CreateDeviceRequest>,
) -> Result<impl IntoResponse> {
    let device_id = assign_device_id(req.device_id.as_deref());
    validate_device_id(&device_id)?;

    let device = state.devices.create(&device_id, &req).await?;
    tracing::info!(device_id = %device.device_id, protocol = %device.protocol, "Device created");
    Ok(Json(ApiResponse::success(device)))
}

async fn update_device(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    Json(req): Json<UpdateDeviceRequest>,
) -> Result<impl IntoResponse> {
    let device = state.devices.update(&device_id, &req).await?;
    Ok(Json(ApiResponse::success(device)))
}

async fn delete_device(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> Result<impl IntoResponse> {
    state.devices.delete(&device_id).await?;

    // A deleted device keeps no transcoder
    if let StopOutcome::Stopped(outcome) = state.stream.stop(&device_id).await {
        tracing::info!(device_id = %device_id, outcome = ?outcome, "Stream of deleted device stopped");
    }

    Ok(Json(ApiResponse::message("Device deleted")))
}

async fn update_device_status(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<impl IntoResponse> {
    let status = DeviceStatus::parse(&req.status).ok_or_else(|| {
        Error::Validation(format!(
            "Invalid status: {} (expected online, offline or error)",
            req.status
        ))
    })?;

    let device = state.devices.update_status(&device_id, status).await?;
    Ok(Json(ApiResponse::success(device)))
}

// ========================================
// Event Handlers
// ========================================

async fn list_events(
    State(state): State<AppState>,
    Query(query): Query<EventQuery>,
) -> Result<impl IntoResponse> {
    let page = state.events.list(&query).await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "data": page.events,
        "pagination": page.pagination,
    })))
}

async fn create_event(
    State(state): State<AppState>,
    Json(req): Json<CreateEventRequest>,
) -> Result<impl IntoResponse> {
    let event = state.events.insert(&req).await?;
    Ok(Json(ApiResponse::success(event)))
}

async fn statistics(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let stats = Statistics {
        devices: state.devices.counts().await?,
        events: EventCounts {
            today: state.events.count_today().await?,
            by_type: state.events.count_by_type().await?,
        },
    };
    Ok(Json(ApiResponse::success(stats)))
}
