//! StreamService - start/stop/status/play orchestration
//!
//! ## Responsibilities
//!
//! - Device lookup, online check, source URL resolution
//! - Spawning through the registry so each device has at most one transcoder
//! - Graceful termination on stop and on process-wide shutdown
//! - Playback (HLS playlist/segments, MJPEG frame stream)
//! - One-shot snapshots, independent of running sessions
//!
//! ## Design
//!
//! All outcomes are explicit types; a termination that needs SIGKILL is a
//! `TerminateOutcome::Killed`, never an error.

use super::playback::{mjpeg_frames, MjpegFrames};
use super::process::{OutputFormat, TerminateOutcome, TranscodeProcess};
use super::registry::{Insertion, SessionRegistry};
use super::session::{PlaybackRef, StreamSession};
use crate::device_registry::{Device, DeviceLookup};
use crate::error::{Error, Result};
use crate::snapshot_service::{Snapshot, SnapshotService};
use crate::url_resolver;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Stream manager settings
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub ffmpeg_path: PathBuf,
    /// Per-device output directories live under here
    pub stream_root: PathBuf,
    pub snapshot_root: PathBuf,
    /// SIGTERM -> SIGKILL grace period
    pub stop_grace: Duration,
    pub snapshot_timeout: Duration,
    pub mjpeg_poll_interval: Duration,
    /// Dead-session sweep period; `None` disables the sweep
    pub sweep_interval: Option<Duration>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            stream_root: PathBuf::from("/tmp/streams"),
            snapshot_root: PathBuf::from("/tmp/snapshots"),
            stop_grace: Duration::from_secs(5),
            snapshot_timeout: Duration::from_secs(10),
            mjpeg_poll_interval: Duration::from_millis(100),
            sweep_interval: None,
        }
    }
}

/// Result of a start request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// A session already existed; nothing was spawned
    AlreadyRunning(PlaybackRef),
    Started(PlaybackRef),
}

impl StartOutcome {
    pub fn playback_ref(&self) -> &PlaybackRef {
        match self {
            StartOutcome::AlreadyRunning(p) | StartOutcome::Started(p) => p,
        }
    }
}

/// Result of a stop request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped(TerminateOutcome),
    NotFound,
}

/// Per-session entry of the status report
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    /// Fresh liveness check, not cached
    pub running: bool,
    pub format: OutputFormat,
    /// Unix seconds
    pub start_time: f64,
    /// Seconds since start
    pub duration: f64,
}

/// What a viewer gets from `play`
pub enum Playback {
    /// Current playlist text
    Playlist(String),
    /// Multipart frame chunks until the session is stopped
    Mjpeg(MjpegFrames),
}

/// StreamService instance
pub struct StreamService {
    config: StreamConfig,
    devices: Arc<dyn DeviceLookup>,
    registry: Arc<SessionRegistry>,
    snapshots: SnapshotService,
}

impl StreamService {
    /// Create new StreamService
    ///
    /// # Arguments
    /// * `config` - Paths and timings
    /// * `devices` - Device lookup
    /// * `registry` - Session registry owned by this service
    pub fn new(
        config: StreamConfig,
        devices: Arc<dyn DeviceLookup>,
        registry: Arc<SessionRegistry>,
    ) -> Self {
        let snapshots = SnapshotService::new(
            config.ffmpeg_path.clone(),
            config.snapshot_root.clone(),
            config.snapshot_timeout,
        );
        Self {
            config,
            devices,
            registry,
            snapshots,
        }
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Start streaming a device
    ///
    /// Idempotent per device: concurrent or repeated starts share one
    /// transcoder. The format of an existing session wins.
    pub async fn start(&self, device_id: &str, format: OutputFormat) -> Result<StartOutcome> {
        validate_device_id(device_id)?;

        let device = self.find_device(device_id).await?;
        if !device.is_online() {
            return Err(Error::InvalidState(format!(
                "Device {} is {}, not online",
                device_id, device.status
            )));
        }
        let source_url = resolve_source(&device)?;

        let insertion = self
            .registry
            .insert_if_absent(device_id, || {
                self.spawn_session(device_id, &source_url, format)
            })
            .await?;

        match insertion {
            Insertion::Existing(session) => {
                tracing::debug!(
                    device_id = %device_id,
                    format = session.format().as_str(),
                    "Stream already running"
                );
                Ok(StartOutcome::AlreadyRunning(session.playback_ref()))
            }
            Insertion::Created(session) => {
                tracing::info!(
                    device_id = %device_id,
                    format = format.as_str(),
                    source_url = %source_url,
                    "Stream started"
                );
                Ok(StartOutcome::Started(session.playback_ref()))
            }
        }
    }

    async fn spawn_session(
        &self,
        device_id: &str,
        source_url: &str,
        format: OutputFormat,
    ) -> Result<StreamSession> {
        let output_dir = self.config.stream_root.join(device_id);
        let process = TranscodeProcess::spawn(
            &self.config.ffmpeg_path,
            device_id,
            source_url,
            format,
            &output_dir,
        )
        .await?;
        Ok(StreamSession::new(device_id, source_url, process))
    }

    /// Stop a device's stream
    ///
    /// The session leaves the registry first (ending MJPEG viewers), then
    /// its process is terminated within the grace period.
    pub async fn stop(&self, device_id: &str) -> StopOutcome {
        let Some(session) = self.registry.remove(device_id).await else {
            return StopOutcome::NotFound;
        };

        let outcome = session.process().terminate(self.config.stop_grace).await;
        tracing::info!(
            device_id = %device_id,
            outcome = ?outcome,
            uptime_secs = session.uptime_secs(),
            "Stream stopped"
        );
        StopOutcome::Stopped(outcome)
    }

    /// Status of every registered session, keyed by device id
    pub async fn status(&self) -> BTreeMap<String, SessionStatus> {
        self.registry
            .snapshot_all()
            .await
            .into_iter()
            .map(|(id, session)| {
                let status = SessionStatus {
                    running: session.process().is_alive(),
                    format: session.format(),
                    start_time: session.started_at().timestamp_millis() as f64 / 1000.0,
                    duration: session.uptime_secs(),
                };
                (id, status)
            })
            .collect()
    }

    /// Playback for a running session
    pub async fn play(&self, device_id: &str) -> Result<Playback> {
        let session = self.session(device_id).await?;

        match session.format() {
            OutputFormat::Hls => match fs::read_to_string(session.output_path()).await {
                Ok(playlist) => Ok(Playback::Playlist(playlist)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::NotReady(
                    format!("Playlist for device {} not written yet", device_id),
                )),
                Err(e) => Err(e.into()),
            },
            OutputFormat::Mjpeg => Ok(Playback::Mjpeg(mjpeg_frames(
                session.output_path().to_path_buf(),
                session.cancellation(),
                self.config.mjpeg_poll_interval,
            ))),
        }
    }

    /// One HLS segment of a running session
    pub async fn segment(&self, device_id: &str, name: &str) -> Result<Vec<u8>> {
        if !is_segment_name(name) {
            return Err(Error::Validation(format!("Invalid segment name: {}", name)));
        }

        let session = self.session(device_id).await?;
        if session.format() != OutputFormat::Hls {
            return Err(Error::NotFound(format!(
                "Device {} is not streaming HLS",
                device_id
            )));
        }

        let path = session.process().output_dir().join(name);
        match fs::read(&path).await {
            Ok(data) => Ok(data),
            // Rolled out of the playlist window
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::NotFound(format!(
                "Segment {} for device {}",
                name, device_id
            ))),
            Err(e) => Err(e.into()),
        }
    }

    /// Capture one frame from a device, with or without a running stream
    pub async fn snapshot(&self, device_id: &str) -> Result<Snapshot> {
        validate_device_id(device_id)?;
        let device = self.find_device(device_id).await?;
        let source_url = resolve_source(&device)?;
        self.snapshots.capture(device_id, &source_url).await
    }

    /// Previously captured snapshot bytes
    pub async fn snapshot_file(&self, device_id: &str, timestamp: i64) -> Result<Vec<u8>> {
        validate_device_id(device_id)?;
        self.snapshots.read(device_id, timestamp).await
    }

    /// Terminate every session; later starts are rejected
    ///
    /// Returns the number of sessions terminated.
    pub async fn shutdown(&self) -> usize {
        let sessions = self.registry.drain().await;
        let grace = self.config.stop_grace;

        let outcomes = futures::future::join_all(sessions.iter().map(|session| async move {
            (session.device_id(), session.process().terminate(grace).await)
        }))
        .await;

        for (device_id, outcome) in &outcomes {
            tracing::info!(device_id = %device_id, outcome = ?outcome, "Stream terminated on shutdown");
        }
        outcomes.len()
    }

    /// Remove sessions whose transcoder has exited on its own
    pub async fn sweep_dead(&self) -> usize {
        let mut removed = 0;
        for (device_id, session) in self.registry.snapshot_all().await {
            if session.process().is_alive() {
                continue;
            }
            // A restart may have replaced it since the snapshot
            if !self.registry.remove_if_same(&device_id, &session).await {
                continue;
            }
            let outcome = session.process().terminate(self.config.stop_grace).await;
            tracing::warn!(
                device_id = %device_id,
                outcome = ?outcome,
                uptime_secs = session.uptime_secs(),
                "Transcoder exited unexpectedly, session removed"
            );
            removed += 1;
        }
        removed
    }

    /// Run `sweep_dead` every `interval` until shutdown
    pub fn spawn_liveness_sweep(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                if service.registry.is_closed() {
                    break;
                }
                let removed = service.sweep_dead().await;
                if removed > 0 {
                    tracing::info!(removed = removed, "Liveness sweep removed dead sessions");
                }
            }
            tracing::debug!("Liveness sweep stopped");
        })
    }

    async fn find_device(&self, device_id: &str) -> Result<Device> {
        self.devices
            .find_device(device_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Device {}", device_id)))
    }

    async fn session(&self, device_id: &str) -> Result<Arc<StreamSession>> {
        self.registry
            .get(device_id)
            .await
            .ok_or_else(|| Error::NotFound(format!("No active stream for device {}", device_id)))
    }
}

fn resolve_source(device: &Device) -> Result<String> {
    url_resolver::resolve(device).ok_or_else(|| {
        Error::Resolution(format!(
            "device {} (protocol {})",
            device.device_id, device.protocol
        ))
    })
}

/// Device ids become directory names; keep them to one path component
pub fn validate_device_id(device_id: &str) -> Result<()> {
    let valid = !device_id.is_empty()
        && device_id != "."
        && device_id != ".."
        && !device_id.contains(['/', '\\', '\0']);
    if valid {
        Ok(())
    } else {
        Err(Error::Validation(format!("Invalid device id: {:?}", device_id)))
    }
}

fn is_segment_name(name: &str) -> bool {
    name.len() > 3
        && name.ends_with(".ts")
        && !name.starts_with('.')
        && !name.contains(['/', '\\', '\0'])
}
