//! Application state
//!
//! Holds all shared components and state

use crate::detection::{
    AnalysisEngine, DetectionRecorder, EventRepository, EventStore, RemoteAnalyzer,
};
use crate::device_registry::{DeviceLookup, DeviceRepository};
use crate::error::Result;
use crate::stream_manager::{SessionRegistry, StreamConfig, StreamService};
use sqlx::MySqlPool;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Database URL
    pub database_url: String,
    /// Server port
    pub port: u16,
    /// Server host
    pub host: String,
    /// ffmpeg binary
    pub ffmpeg_path: PathBuf,
    /// Transcoder output root (`{root}/{device_id}/...`)
    pub stream_root: PathBuf,
    /// Snapshot root
    pub snapshot_root: PathBuf,
    /// Detection image root
    pub detection_root: PathBuf,
    pub stop_grace: Duration,
    pub snapshot_timeout: Duration,
    pub mjpeg_poll_interval: Duration,
    /// Dead session sweep, unset = disabled
    pub sweep_interval: Option<Duration>,
    /// Remote inference service (unset = no analyzers)
    pub analyzer_url: Option<String>,
    /// Kinds served by the remote analyzer
    pub analyzer_kinds: Vec<String>,
    pub analyzer_timeout: Duration,
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn env_path(key: &str, default: &str) -> PathBuf {
    std::env::var(key)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(default))
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "mysql://root@localhost/surveillance".to_string()),
            port: env_parse("PORT").unwrap_or(5000),
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            ffmpeg_path: env_path("FFMPEG_PATH", "ffmpeg"),
            stream_root: env_path("STREAM_ROOT", "/tmp/streams"),
            snapshot_root: env_path("SNAPSHOT_ROOT", "/tmp/snapshots"),
            detection_root: env_path("DETECTION_ROOT", "/tmp/ai_detections"),
            stop_grace: Duration::from_secs(env_parse("STREAM_STOP_GRACE_SEC").unwrap_or(5)),
            snapshot_timeout: Duration::from_secs(env_parse("SNAPSHOT_TIMEOUT_SEC").unwrap_or(10)),
            mjpeg_poll_interval: Duration::from_millis(env_parse("MJPEG_POLL_MS").unwrap_or(100)),
            sweep_interval: env_parse::<u64>("STREAM_SWEEP_INTERVAL_SEC")
                .filter(|&s| s > 0)
                .map(Duration::from_secs),
            analyzer_url: std::env::var("ANALYZER_URL").ok().filter(|s| !s.is_empty()),
            analyzer_kinds: std::env::var("ANALYZER_KINDS")
                .map(|v| {
                    v.split(',')
                        .map(|k| k.trim().to_string())
                        .filter(|k| !k.is_empty())
                        .collect()
                })
                .unwrap_or_else(|_| {
                    crate::detection::DEFAULT_KINDS
                        .iter()
                        .map(|k| k.to_string())
                        .collect()
                }),
            analyzer_timeout: Duration::from_secs(env_parse("ANALYZER_TIMEOUT_SEC").unwrap_or(30)),
        }
    }
}

impl AppConfig {
    /// Stream manager settings
    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig {
            ffmpeg_path: self.ffmpeg_path.clone(),
            stream_root: self.stream_root.clone(),
            snapshot_root: self.snapshot_root.clone(),
            stop_grace: self.stop_grace,
            snapshot_timeout: self.snapshot_timeout,
            mjpeg_poll_interval: self.mjpeg_poll_interval,
            sweep_interval: self.sweep_interval,
        }
    }

    /// Analysis engine with one remote analyzer per configured kind
    pub fn analysis_engine(&self) -> Result<AnalysisEngine> {
        let mut engine = AnalysisEngine::new();
        if let Some(url) = &self.analyzer_url {
            for kind in &self.analyzer_kinds {
                engine.register(Arc::new(RemoteAnalyzer::new(
                    url,
                    kind,
                    self.analyzer_timeout,
                )?));
            }
        }
        Ok(engine)
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Application config
    pub config: AppConfig,
    /// Device CRUD
    pub devices: DeviceRepository,
    /// Device lookup shared with the stream manager
    pub lookup: Arc<dyn DeviceLookup>,
    /// Detection events
    pub events: EventRepository,
    /// Stream session manager
    pub stream: Arc<StreamService>,
    /// Registered analyzers
    pub analysis: Arc<AnalysisEngine>,
    /// Detection image + event writer
    pub recorder: Arc<DetectionRecorder>,
    pub started_at: Instant,
}

impl AppState {
    /// Wire services over one pool
    ///
    /// # Arguments
    /// * `lookup` - Device lookup for the stream manager
    /// * `store` - Event sink for the recorder
    pub fn new(
        pool: MySqlPool,
        config: AppConfig,
        lookup: Arc<dyn DeviceLookup>,
        store: Arc<dyn EventStore>,
        analysis: AnalysisEngine,
    ) -> Self {
        let stream = Arc::new(StreamService::new(
            config.stream_config(),
            lookup.clone(),
            Arc::new(SessionRegistry::new()),
        ));
        let recorder = Arc::new(DetectionRecorder::new(config.detection_root.clone(), store));

        Self {
            devices: DeviceRepository::new(pool.clone()),
            lookup,
            events: EventRepository::new(pool),
            config,
            stream,
            analysis: Arc::new(analysis),
            recorder,
            started_at: Instant::now(),
        }
    }

    /// Production wiring: MySQL-backed lookup and event store
    pub fn with_pool(pool: MySqlPool, config: AppConfig, analysis: AnalysisEngine) -> Self {
        let lookup = Arc::new(DeviceRepository::new(pool.clone()));
        let store = Arc::new(EventRepository::new(pool.clone()));
        Self::new(pool, config, lookup, store, analysis)
    }
}
