//! Camstream Library
//!
//! Camera stream session manager
//!
//! ## Architecture
//!
//! 1. DeviceRegistry - Device records and lookup
//! 2. UrlResolver - Device -> ingest URL
//! 3. StreamManager - One ffmpeg transcoder per device, HLS/MJPEG playback
//! 4. SnapshotService - Single frame capture
//! 5. Detection - Analyzers, detection events, statistics
//! 6. WebAPI - REST API endpoints
//!
//! ## Design Principles
//!
//! - One live transcoder per device, owned by the session registry
//! - Every spawned process is reaped on stop, sweep or shutdown

pub mod detection;
pub mod device_registry;
pub mod error;
pub mod models;
pub mod snapshot_service;
pub mod state;
pub mod stream_manager;
pub mod url_resolver;
pub mod web_api;

#[cfg(all(test, unix))]
mod test_support;

pub use error::{Error, Result};
pub use state::AppState;
