//! Router tests against a fake transcoder, in-memory devices and events

use super::create_router;
use crate::detection::testing::{FixedAnalyzer, MemoryEvents};
use crate::detection::AnalysisEngine;
use crate::device_registry::test_device;
use crate::device_registry::testing::MemoryDevices;
use crate::state::{AppConfig, AppState};
use crate::stream_manager::StopOutcome;
use crate::test_support::{self, Behavior};
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    response::Response,
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

struct Harness {
    dir: TempDir,
    state: AppState,
    router: Router,
    events: Arc<MemoryEvents>,
}

fn harness(behavior: Behavior, engine: AnalysisEngine) -> Harness {
    let dir = TempDir::new().unwrap();
    let config = AppConfig {
        ffmpeg_path: test_support::fake_ffmpeg(dir.path(), behavior),
        stream_root: dir.path().join("streams"),
        snapshot_root: dir.path().join("snapshots"),
        detection_root: dir.path().join("detections"),
        stop_grace: Duration::from_secs(2),
        snapshot_timeout: Duration::from_secs(2),
        mjpeg_poll_interval: Duration::from_millis(50),
        sweep_interval: None,
        ..AppConfig::default()
    };

    let mut offline = test_device("cam-off", "RTSP");
    offline.status = "offline".to_string();
    let lookup = Arc::new(MemoryDevices::with(vec![test_device("cam1", "RTSP"), offline]));
    let events = Arc::new(MemoryEvents::default());

    // Never connected: only device/event CRUD routes touch it
    let pool = sqlx::mysql::MySqlPoolOptions::new()
        .connect_lazy("mysql://root@127.0.0.1:1/unused")
        .unwrap();

    let state = AppState::new(pool, config, lookup, events.clone(), engine);
    let router = create_router(state.clone());
    Harness {
        dir,
        state,
        router,
        events,
    }
}

async fn send(router: &Router, method: Method, uri: &str, body: Option<Value>) -> Response {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(v) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(v.to_string())
        }
        None => Body::empty(),
    };
    router
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap()
}

/// Raw body, no `Content-Type`
async fn send_raw(router: &Router, uri: &str, body: &str) -> Response {
    let req = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .body(Body::from(body.to_string()))
        .unwrap();
    router.clone().oneshot(req).await.unwrap()
}

async fn json_body(resp: Response) -> Value {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn content_type(resp: &Response) -> &str {
    resp.headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

#[tokio::test]
async fn test_healthz() {
    let h = harness(Behavior::Idle, AnalysisEngine::new());
    let resp = send(&h.router, Method::GET, "/healthz", None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["active_streams"], 0);
}

#[tokio::test]
async fn test_start_stop_flow() {
    let h = harness(Behavior::Idle, AnalysisEngine::new());

    let resp = send(&h.router, Method::POST, "/stream/start/cam1", None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Stream started");
    assert_eq!(body["streamUrl"], "/stream/play/cam1");
    assert_eq!(body["sourceUrl"], "rtsp://10.0.0.5:554/stream");

    let resp = send(
        &h.router,
        Method::POST,
        "/stream/start/cam1",
        Some(json!({"format": "hls"})),
    )
    .await;
    let body = json_body(resp).await;
    assert_eq!(body["message"], "Stream already running");
    assert_eq!(body["streamUrl"], "/stream/play/cam1");
    assert_eq!(test_support::spawn_count(h.dir.path()), 1);

    let resp = send(&h.router, Method::GET, "/stream/status", None).await;
    let body = json_body(resp).await;
    assert_eq!(body["data"]["cam1"]["running"], true);
    assert_eq!(body["data"]["cam1"]["format"], "hls");
    assert!(body["data"]["cam1"]["startTime"].as_f64().unwrap() > 0.0);
    assert!(body["data"]["cam1"]["duration"].as_f64().is_some());

    let resp = send(&h.router, Method::POST, "/stream/stop/cam1", None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_body(resp).await["success"], true);

    let resp = send(&h.router, Method::GET, "/stream/status", None).await;
    assert_eq!(json_body(resp).await["data"], json!({}));

    let resp = send(&h.router, Method::POST, "/stream/stop/cam1", None).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(resp).await["success"], false);
}

#[tokio::test]
async fn test_start_rejections() {
    let h = harness(Behavior::Idle, AnalysisEngine::new());

    let resp = send(
        &h.router,
        Method::POST,
        "/stream/start/cam1",
        Some(json!({"format": "webrtc"})),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = send(&h.router, Method::POST, "/stream/start/ghost", None).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body = json_body(resp).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error_code"], "NOT_FOUND");

    let resp = send(&h.router, Method::POST, "/stream/start/cam-off", None).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    assert_eq!(test_support::spawn_count(h.dir.path()), 0);
}

#[tokio::test]
async fn test_start_rejects_unusable_body() {
    let h = harness(Behavior::Idle, AnalysisEngine::new());

    let resp = send(
        &h.router,
        Method::POST,
        "/stream/start/cam1",
        Some(json!({"format": 5})),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(resp).await["error_code"], "VALIDATION_ERROR");

    let resp = send_raw(&h.router, "/stream/start/cam1", "{\"format\": ").await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    assert_eq!(test_support::spawn_count(h.dir.path()), 0);
}

#[tokio::test]
async fn test_start_body_without_content_type() {
    let h = harness(Behavior::Idle, AnalysisEngine::new());

    let resp = send_raw(&h.router, "/stream/start/cam1", r#"{"format":"mjpeg"}"#).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_body(resp).await["format"], "mjpeg");

    // Empty body means the default format
    let resp = send_raw(&h.router, "/stream/start/cam1", "").await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_body(resp).await["message"], "Stream already running");

    h.state.stream.shutdown().await;
}

#[tokio::test]
async fn test_play_hls_playlist_and_segment() {
    let h = harness(Behavior::Produce, AnalysisEngine::new());

    let resp = send(&h.router, Method::GET, "/stream/play/cam1", None).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    send(&h.router, Method::POST, "/stream/start/cam1", None).await;

    let mut playlist = None;
    for _ in 0..40 {
        let resp = send(&h.router, Method::GET, "/stream/play/cam1", None).await;
        match resp.status() {
            StatusCode::OK => {
                assert_eq!(content_type(&resp), "application/vnd.apple.mpegurl");
                let bytes = resp.into_body().collect().await.unwrap().to_bytes();
                playlist = Some(String::from_utf8(bytes.to_vec()).unwrap());
                break;
            }
            StatusCode::SERVICE_UNAVAILABLE => tokio::time::sleep(Duration::from_millis(50)).await,
            other => panic!("unexpected status {}", other),
        }
    }
    assert!(playlist.unwrap().starts_with("#EXTM3U"));

    let resp = send(&h.router, Method::GET, "/stream/play/cam1/playlist0.ts", None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(content_type(&resp), "video/mp2t");

    h.state.stream.shutdown().await;
}

#[tokio::test]
async fn test_play_mjpeg_ends_on_stop() {
    let h = harness(Behavior::Produce, AnalysisEngine::new());

    send(
        &h.router,
        Method::POST,
        "/stream/start/cam1",
        Some(json!({"format": "mjpeg"})),
    )
    .await;

    let resp = send(&h.router, Method::GET, "/stream/play/cam1", None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        content_type(&resp),
        "multipart/x-mixed-replace; boundary=frame"
    );

    let mut body = resp.into_body();
    let frame = tokio::time::timeout(Duration::from_secs(2), body.frame())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let data = frame.into_data().unwrap();
    assert!(data.starts_with(b"--frame\r\n"));

    assert!(matches!(
        h.state.stream.stop("cam1").await,
        StopOutcome::Stopped(_)
    ));

    // Drains at most one frame already read, then ends
    let ended = tokio::time::timeout(Duration::from_secs(1), async {
        while let Some(frame) = body.frame().await {
            frame.unwrap();
        }
    })
    .await;
    assert!(ended.is_ok());
}

#[tokio::test]
async fn test_snapshot_routes() {
    let h = harness(Behavior::SingleFrame, AnalysisEngine::new());

    let resp = send(&h.router, Method::POST, "/stream/snapshot/cam1", None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    let url = body["snapshotUrl"].as_str().unwrap().to_string();
    assert!(url.starts_with("/stream/snapshot/cam1/"));
    assert!(body["snapshotPath"].as_str().unwrap().ends_with(".jpg"));

    let resp = send(&h.router, Method::GET, &url, None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(content_type(&resp), "image/jpeg");

    let resp = send(&h.router, Method::GET, "/stream/snapshot/cam1/1", None).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = send(&h.router, Method::POST, "/stream/snapshot/ghost", None).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_ai_routes() {
    let mut engine = AnalysisEngine::new();
    engine.register(Arc::new(FixedAnalyzer::hits("person_detection", &[0.7])));
    let h = harness(Behavior::SingleFrame, engine);

    let resp = send(&h.router, Method::GET, "/ai/models", None).await;
    let body = json_body(resp).await;
    assert_eq!(body["data"]["total_models"], 1);
    assert_eq!(body["data"]["models"][0]["kind"], "person_detection");

    let resp = send(&h.router, Method::POST, "/ai/start/cam1", None).await;
    let body = json_body(resp).await;
    assert_eq!(
        body["analysis_types"],
        json!(["face_detection", "person_detection"])
    );

    let resp = send(&h.router, Method::POST, "/ai/start/cam-off", None).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = send(
        &h.router,
        Method::POST,
        "/ai/start/cam1",
        Some(json!({"analysis_types": "face_detection"})),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = send_raw(&h.router, "/ai/start/cam1", r#"{"analysis_types":["person_detection"]}"#).await;
    assert_eq!(json_body(resp).await["analysis_types"], json!(["person_detection"]));

    let resp = send(
        &h.router,
        Method::POST,
        "/ai/analyze/cam1",
        Some(json!({"analysis_types": ["person_detection"]})),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body["data"]["detections"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"]["events"][0]["event_type"], "person_detection");

    let recorded = h.events.events.lock().unwrap().clone();
    assert_eq!(recorded.len(), 1);
    let image = recorded[0].image_path.clone().unwrap();
    assert_eq!(std::fs::read(image).unwrap(), b"JPEGSNAP");
}
