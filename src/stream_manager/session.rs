//! StreamSession - live binding of a device to its transcoder

use super::process::{OutputFormat, TranscodeProcess};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use tokio_util::sync::CancellationToken;

/// Externally stable playback URL for a device
pub fn playback_url(device_id: &str) -> String {
    format!("/stream/play/{}", device_id)
}

/// What a client needs to consume a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlaybackRef {
    pub stream_url: String,
    pub source_url: String,
    pub format: OutputFormat,
}

/// One running stream
///
/// Owned by the session registry. The cancellation token fires when the
/// session leaves the registry; playback streams watch it.
pub struct StreamSession {
    device_id: String,
    source_url: String,
    process: TranscodeProcess,
    cancel: CancellationToken,
}

impl StreamSession {
    pub fn new(device_id: &str, source_url: &str, process: TranscodeProcess) -> Self {
        Self {
            device_id: device_id.to_string(),
            source_url: source_url.to_string(),
            process,
            cancel: CancellationToken::new(),
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    pub fn format(&self) -> OutputFormat {
        self.process.format()
    }

    pub fn output_path(&self) -> &Path {
        self.process.output_path()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.process.started_at()
    }

    pub fn process(&self) -> &TranscodeProcess {
        &self.process
    }

    pub fn playback_ref(&self) -> PlaybackRef {
        PlaybackRef {
            stream_url: playback_url(&self.device_id),
            source_url: self.source_url.clone(),
            format: self.format(),
        }
    }

    /// Token cancelled when the session is removed
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub(crate) fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Seconds since start
    pub fn uptime_secs(&self) -> f64 {
        let elapsed = Utc::now() - self.started_at();
        elapsed.num_milliseconds().max(0) as f64 / 1000.0
    }
}
