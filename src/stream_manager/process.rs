//! TranscodeProcess - one ffmpeg child per stream session
//!
//! The child is spawned with `kill_on_drop(true)`: whatever path drops the
//! handle (stop, shutdown, a cancelled request future, a panic unwinding),
//! the process is killed. `terminate` is the graceful path on top of that.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;
use tokio::fs;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};

/// HLS segment length in seconds
pub const HLS_SEGMENT_SECS: u32 = 2;
/// Segments kept in the rolling playlist window
pub const HLS_LIST_SIZE: u32 = 3;
/// MJPEG capture rate
pub const MJPEG_FPS: u32 = 10;

/// Transcoder output format
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Hls,
    Mjpeg,
}

impl OutputFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "hls" => Some(Self::Hls),
            "mjpeg" => Some(Self::Mjpeg),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hls => "hls",
            Self::Mjpeg => "mjpeg",
        }
    }

    /// Artifact file name inside the per-device output directory
    pub fn artifact_name(&self) -> &'static str {
        match self {
            Self::Hls => "playlist.m3u8",
            Self::Mjpeg => "stream.mjpg",
        }
    }
}

/// Result of a terminate request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum TerminateOutcome {
    /// Process had already exited (or was already terminated)
    AlreadyExited,
    /// Process exited after the stop signal, within the grace period
    Exited { code: Option<i32> },
    /// Grace period elapsed, process was force-killed
    Killed,
}

/// Input arguments shared by the transcoder and snapshot capture
pub(crate) fn input_args(source_url: &str) -> Vec<String> {
    let mut args = Vec::with_capacity(4);
    // TCP for RTSP, UDP drops too many packets over WiFi cameras
    if source_url.starts_with("rtsp://") || source_url.starts_with("rtsps://") {
        args.push("-rtsp_transport".to_string());
        args.push("tcp".to_string());
    }
    args.push("-i".to_string());
    args.push(source_url.to_string());
    args
}

/// Build the ffmpeg argument list for a session
pub fn transcode_args(
    device_id: &str,
    source_url: &str,
    format: OutputFormat,
    output_path: &Path,
) -> Vec<String> {
    let mut args = vec!["-loglevel".to_string(), "warning".to_string(), "-nostdin".to_string()];
    args.extend(input_args(source_url));

    let output_args: Vec<String> = match format {
        OutputFormat::Hls => vec![
            "-c:v".into(),
            "libx264".into(),
            "-preset".into(),
            "ultrafast".into(),
            "-tune".into(),
            "zerolatency".into(),
            "-c:a".into(),
            "aac".into(),
            "-f".into(),
            "hls".into(),
            "-hls_time".into(),
            HLS_SEGMENT_SECS.to_string(),
            "-hls_list_size".into(),
            HLS_LIST_SIZE.to_string(),
            "-hls_flags".into(),
            "delete_segments".into(),
            // Segments are served under the playback URL
            "-hls_base_url".into(),
            format!("/stream/play/{}/", device_id),
        ],
        OutputFormat::Mjpeg => vec![
            "-an".into(),
            "-c:v".into(),
            "mjpeg".into(),
            "-q:v".into(),
            "5".into(),
            "-r".into(),
            MJPEG_FPS.to_string(),
            "-f".into(),
            "image2".into(),
            "-update".into(),
            "1".into(),
            // Temp file + rename, viewers never see a partial frame
            "-atomic_writing".into(),
            "1".into(),
            "-y".into(),
        ],
    };
    args.extend(output_args);
    args.push(output_path.to_string_lossy().into_owned());
    args
}

/// Owned handle to a running transcoder
pub struct TranscodeProcess {
    pid: Option<u32>,
    format: OutputFormat,
    output_dir: PathBuf,
    output_path: PathBuf,
    started_at: DateTime<Utc>,
    /// `None` once terminate has taken ownership of the child
    child: Mutex<Option<Child>>,
}

impl TranscodeProcess {
    /// Spawn the transcoder
    ///
    /// Creates `output_dir` if needed and removes a stale artifact left by an
    /// earlier session, so readers never mistake old output for new.
    pub async fn spawn(
        ffmpeg_path: &Path,
        device_id: &str,
        source_url: &str,
        format: OutputFormat,
        output_dir: &Path,
    ) -> Result<Self> {
        fs::create_dir_all(output_dir).await?;

        let output_path = output_dir.join(format.artifact_name());
        match fs::remove_file(&output_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let args = transcode_args(device_id, source_url, format, &output_path);

        let mut child = Command::new(ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::Spawn(format!("{}: {}", ffmpeg_path.display(), e))
            })?;

        let pid = child.id();

        if let Some(stderr) = child.stderr.take() {
            let device_id = device_id.to_string();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(device_id = %device_id, "ffmpeg: {}", line);
                }
            });
        }

        tracing::info!(
            device_id = %device_id,
            pid = ?pid,
            format = format.as_str(),
            output = %output_path.display(),
            "Transcoder spawned"
        );

        Ok(Self {
            pid,
            format,
            output_dir: output_dir.to_path_buf(),
            output_path,
            started_at: Utc::now(),
            child: Mutex::new(Some(child)),
        })
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Non-blocking liveness check
    pub fn is_alive(&self) -> bool {
        let mut guard = self.child.lock().unwrap_or_else(|e| e.into_inner());
        match guard.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// Stop the process: SIGTERM, wait up to `grace`, then SIGKILL
    ///
    /// Never fails; a grace timeout is recovered by escalating to kill.
    pub async fn terminate(&self, grace: Duration) -> TerminateOutcome {
        let taken = {
            let mut guard = self.child.lock().unwrap_or_else(|e| e.into_inner());
            guard.take()
        };
        // Dropping `child` on any early return (or if this future is
        // cancelled) kills it via kill_on_drop.
        let Some(mut child) = taken else {
            return TerminateOutcome::AlreadyExited;
        };

        if let Ok(Some(_)) = child.try_wait() {
            return TerminateOutcome::AlreadyExited;
        }

        if !request_stop(&mut child) {
            tracing::debug!(pid = ?self.pid, "Stop signal not delivered, killing");
            return kill(&mut child, self.pid).await;
        }

        match tokio::time::timeout(grace, child.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!(pid = ?self.pid, status = %status, "Transcoder exited");
                TerminateOutcome::Exited {
                    code: status.code(),
                }
            }
            Ok(Err(e)) => {
                tracing::warn!(pid = ?self.pid, error = %e, "Wait on transcoder failed, killing");
                kill(&mut child, self.pid).await
            }
            Err(_) => {
                tracing::warn!(
                    pid = ?self.pid,
                    grace_ms = grace.as_millis() as u64,
                    "Transcoder did not exit within grace period, killing"
                );
                kill(&mut child, self.pid).await
            }
        }
    }
}

async fn kill(child: &mut Child, pid: Option<u32>) -> TerminateOutcome {
    if let Err(e) = child.kill().await {
        // kill() on an already-reaped child errors; nothing left to do
        tracing::error!(pid = ?pid, error = %e, "Failed to kill transcoder");
    }
    TerminateOutcome::Killed
}

/// Ask the child to exit (SIGTERM). ffmpeg flushes its outputs on SIGTERM.
#[cfg(unix)]
fn request_stop(child: &mut Child) -> bool {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    match child.id() {
        Some(pid) => kill(Pid::from_raw(pid as i32), Signal::SIGTERM).is_ok(),
        None => false,
    }
}

#[cfg(not(unix))]
fn request_stop(child: &mut Child) -> bool {
    child.start_kill().is_ok()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::test_support::{self, Behavior};
    use tempfile::TempDir;

    #[test]
    fn test_format_parse() {
        assert_eq!(OutputFormat::parse("hls"), Some(OutputFormat::Hls));
        assert_eq!(OutputFormat::parse("MJPEG"), Some(OutputFormat::Mjpeg));
        assert_eq!(OutputFormat::parse("webrtc"), None);
        assert_eq!(OutputFormat::default(), OutputFormat::Hls);
    }

    #[test]
    fn test_hls_args() {
        let args = transcode_args(
            "cam1",
            "rtsp://10.0.0.5:554/stream",
            OutputFormat::Hls,
            Path::new("/tmp/streams/cam1/playlist.m3u8"),
        );
        let joined = args.join(" ");
        assert!(joined.contains("-rtsp_transport tcp -i rtsp://10.0.0.5:554/stream"));
        assert!(joined.contains("-hls_time 2"));
        assert!(joined.contains("-hls_list_size 3"));
        assert!(joined.contains("-hls_flags delete_segments"));
        assert!(joined.contains("-preset ultrafast -tune zerolatency"));
        assert!(joined.contains("-hls_base_url /stream/play/cam1/"));
        assert_eq!(args.last().unwrap(), "/tmp/streams/cam1/playlist.m3u8");
    }

    #[test]
    fn test_mjpeg_args() {
        let args = transcode_args(
            "cam1",
            "http://10.0.0.5/video",
            OutputFormat::Mjpeg,
            Path::new("/tmp/streams/cam1/stream.mjpg"),
        );
        let joined = args.join(" ");
        assert!(!joined.contains("-rtsp_transport"));
        assert!(joined.contains("-c:v mjpeg -q:v 5 -r 10"));
        assert!(joined.contains("-f image2 -update 1 -atomic_writing 1 -y"));
        assert_eq!(args.last().unwrap(), "/tmp/streams/cam1/stream.mjpg");
    }

    #[tokio::test]
    async fn test_spawn_missing_binary() {
        let dir = TempDir::new().unwrap();
        let result = TranscodeProcess::spawn(
            &dir.path().join("no-such-ffmpeg"),
            "cam1",
            "rtsp://10.0.0.5:554/stream",
            OutputFormat::Hls,
            &dir.path().join("out"),
        )
        .await;

        assert!(matches!(result, Err(Error::Spawn(_))));
        // Directory is still created up front
        assert!(dir.path().join("out").is_dir());
    }

    #[tokio::test]
    async fn test_spawn_terminate_graceful() {
        let dir = TempDir::new().unwrap();
        let bin = test_support::fake_ffmpeg(dir.path(), Behavior::Idle);

        let process = TranscodeProcess::spawn(
            &bin,
            "cam1",
            "rtsp://10.0.0.5:554/stream",
            OutputFormat::Hls,
            &dir.path().join("cam1"),
        )
        .await
        .unwrap();

        assert!(process.is_alive());
        assert!(process.pid().is_some());

        let outcome = process.terminate(Duration::from_secs(5)).await;
        assert!(matches!(outcome, TerminateOutcome::Exited { .. }));
        assert!(!process.is_alive());

        // Second terminate is a no-op
        assert_eq!(
            process.terminate(Duration::from_secs(1)).await,
            TerminateOutcome::AlreadyExited
        );
    }

    #[tokio::test]
    async fn test_terminate_escalates_to_kill() {
        let dir = TempDir::new().unwrap();
        let bin = test_support::fake_ffmpeg(dir.path(), Behavior::IgnoreTerm);

        let process = TranscodeProcess::spawn(
            &bin,
            "cam1",
            "rtsp://10.0.0.5:554/stream",
            OutputFormat::Mjpeg,
            &dir.path().join("cam1"),
        )
        .await
        .unwrap();

        // Let the shell install its trap
        tokio::time::sleep(Duration::from_millis(200)).await;

        let outcome = process.terminate(Duration::from_millis(300)).await;
        assert_eq!(outcome, TerminateOutcome::Killed);
        assert!(!process.is_alive());
    }

    #[tokio::test]
    async fn test_exited_process_reported_dead() {
        let dir = TempDir::new().unwrap();
        let bin = test_support::fake_ffmpeg(dir.path(), Behavior::ExitImmediately);

        let process = TranscodeProcess::spawn(
            &bin,
            "cam1",
            "rtsp://10.0.0.5:554/stream",
            OutputFormat::Hls,
            &dir.path().join("cam1"),
        )
        .await
        .unwrap();

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(!process.is_alive());
        assert_eq!(
            process.terminate(Duration::from_secs(1)).await,
            TerminateOutcome::AlreadyExited
        );
    }

    #[tokio::test]
    async fn test_stale_artifact_removed_on_spawn() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("cam1");
        std::fs::create_dir_all(&out).unwrap();
        std::fs::write(out.join("playlist.m3u8"), "#EXTM3U\nold\n").unwrap();

        let bin = test_support::fake_ffmpeg(dir.path(), Behavior::Idle);
        let process = TranscodeProcess::spawn(
            &bin,
            "cam1",
            "rtsp://10.0.0.5:554/stream",
            OutputFormat::Hls,
            &out,
        )
        .await
        .unwrap();

        assert!(!out.join("playlist.m3u8").exists());
        process.terminate(Duration::from_secs(5)).await;
    }
}
