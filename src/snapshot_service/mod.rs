//! SnapshotService - single frame capture via ffmpeg
//!
//! ## Responsibilities
//!
//! - One-shot RTSP frame grab to `{root}/{device_id}/snapshot_{unix}.jpg`
//! - Bounded by a timeout; the ffmpeg child is killed on timeout
//! - Lookup of previously captured snapshots
//!
//! Independent of stream sessions: a device without a running stream can
//! still be snapshotted.

use crate::error::{Error, Result};
use crate::stream_manager::process::input_args;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::fs;
use tokio::process::Command;

/// A captured snapshot
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub device_id: String,
    pub timestamp: i64,
    pub path: PathBuf,
    /// Retrieval URL served by the web API
    pub url: String,
}

/// Snapshot URL for a device/timestamp pair
pub fn snapshot_url(device_id: &str, timestamp: i64) -> String {
    format!("/stream/snapshot/{}/{}", device_id, timestamp)
}

/// SnapshotService instance
pub struct SnapshotService {
    ffmpeg_path: PathBuf,
    snapshot_root: PathBuf,
    timeout: Duration,
}

impl SnapshotService {
    /// Create new SnapshotService
    ///
    /// # Arguments
    /// * `ffmpeg_path` - ffmpeg binary
    /// * `snapshot_root` - Directory holding per-device snapshot folders
    /// * `timeout` - Upper bound for one capture
    pub fn new(ffmpeg_path: PathBuf, snapshot_root: PathBuf, timeout: Duration) -> Self {
        Self {
            ffmpeg_path,
            snapshot_root,
            timeout,
        }
    }

    /// Path of the snapshot taken at `timestamp`
    pub fn snapshot_path(&self, device_id: &str, timestamp: i64) -> PathBuf {
        self.snapshot_root
            .join(device_id)
            .join(format!("snapshot_{}.jpg", timestamp))
    }

    /// Capture a single frame from `source_url`
    ///
    /// Names have one-second resolution: a second capture of the same device
    /// within the same second overwrites the first and returns the same path.
    pub async fn capture(&self, device_id: &str, source_url: &str) -> Result<Snapshot> {
        let timestamp = chrono::Utc::now().timestamp();
        let path = self.snapshot_path(device_id, timestamp);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).await?;
        }

        self.run_ffmpeg(source_url, &path).await?;

        match fs::metadata(&path).await {
            Ok(meta) if meta.len() > 0 => {}
            _ => {
                return Err(Error::Capture(format!(
                    "ffmpeg produced no image for device {}",
                    device_id
                )))
            }
        }

        tracing::info!(
            device_id = %device_id,
            path = %path.display(),
            "Snapshot captured"
        );

        Ok(Snapshot {
            device_id: device_id.to_string(),
            timestamp,
            path,
            url: snapshot_url(device_id, timestamp),
        })
    }

    /// Read a stored snapshot
    pub async fn read(&self, device_id: &str, timestamp: i64) -> Result<Vec<u8>> {
        let path = self.snapshot_path(device_id, timestamp);
        match fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::NotFound(format!(
                "Snapshot {} for device {}",
                timestamp, device_id
            ))),
            Err(e) => Err(e.into()),
        }
    }

    /// Run ffmpeg for one frame
    ///
    /// Uses kill_on_drop(true): when the timeout fires the wait future is
    /// dropped along with the Child, which SIGKILLs ffmpeg.
    async fn run_ffmpeg(&self, source_url: &str, path: &Path) -> Result<()> {
        let mut args = vec!["-loglevel".to_string(), "error".to_string()];
        args.extend(input_args(source_url));
        args.extend([
            "-frames:v".to_string(),
            "1".to_string(),
            "-q:v".to_string(),
            "2".to_string(),
            "-y".to_string(),
            path.to_string_lossy().into_owned(),
        ]);

        let child = Command::new(&self.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Spawn(format!("{}: {}", self.ffmpeg_path.display(), e)))?;

        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                if !output.status.success() {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    return Err(Error::Capture(format!("ffmpeg failed: {}", stderr.trim())));
                }
                Ok(())
            }
            Ok(Err(e)) => Err(Error::Capture(format!("ffmpeg execution failed: {}", e))),
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Snapshot ffmpeg timeout, process killed via kill_on_drop"
                );
                Err(Error::Timeout(format!(
                    "snapshot capture exceeded {}s",
                    self.timeout.as_secs_f32()
                )))
            }
        }
    }
}

/// First line of `ffmpeg -version`
pub async fn check_ffmpeg(ffmpeg_path: &Path) -> Result<String> {
    let output = Command::new(ffmpeg_path)
        .arg("-version")
        .output()
        .await
        .map_err(|e| Error::Spawn(format!("ffmpeg not found: {}", e)))?;

    if !output.status.success() {
        return Err(Error::Internal("ffmpeg version check failed".to_string()));
    }

    let version = String::from_utf8_lossy(&output.stdout);
    let first_line = version.lines().next().unwrap_or("unknown");
    Ok(first_line.to_string())
}
