//! Playback adapters
//!
//! - HLS: the playlist is read as a file snapshot per request
//! - MJPEG: a lazy frame stream over the continuously overwritten JPEG,
//!   ended by the session's cancellation token

use futures::stream::{self, BoxStream, StreamExt};
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Multipart boundary used in the MJPEG content type
pub const MJPEG_BOUNDARY: &str = "frame";
pub const MJPEG_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";
pub const HLS_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";
pub const SEGMENT_CONTENT_TYPE: &str = "video/mp2t";

/// Endless MJPEG multipart chunks, ends when the session is removed
pub type MjpegFrames = BoxStream<'static, Vec<u8>>;

/// Wrap one JPEG in a multipart part
pub fn multipart_chunk(jpeg: &[u8]) -> Vec<u8> {
    let header = format!(
        "--{}\r\nContent-Type: image/jpeg\r\n\r\n",
        MJPEG_BOUNDARY
    );
    let mut chunk = Vec::with_capacity(header.len() + jpeg.len() + 2);
    chunk.extend_from_slice(header.as_bytes());
    chunk.extend_from_slice(jpeg);
    chunk.extend_from_slice(b"\r\n");
    chunk
}

struct FrameCursor {
    path: PathBuf,
    cancel: CancellationToken,
    ticker: tokio::time::Interval,
}

/// Poll `path` every `poll` and yield its contents as multipart chunks
///
/// Missing or empty file means the transcoder has not produced a frame yet;
/// that step yields nothing. Not restartable: once cancelled it is done.
pub fn mjpeg_frames(path: PathBuf, cancel: CancellationToken, poll: Duration) -> MjpegFrames {
    let mut ticker = tokio::time::interval(poll);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let cursor = FrameCursor {
        path,
        cancel,
        ticker,
    };

    stream::unfold(cursor, |mut cursor| async move {
        loop {
            tokio::select! {
                biased;
                _ = cursor.cancel.cancelled() => return None,
                _ = cursor.ticker.tick() => {}
            }

            let data = match tokio::fs::read(&cursor.path).await {
                Ok(data) if !data.is_empty() => data,
                Ok(_) => continue,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    tracing::debug!(path = %cursor.path.display(), error = %e, "MJPEG frame read failed");
                    continue;
                }
            };

            // Stop may have landed while reading
            if cursor.cancel.is_cancelled() {
                return None;
            }
            return Some((multipart_chunk(&data), cursor));
        }
    })
    .fuse()
    .boxed()
}
