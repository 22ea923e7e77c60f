//! StreamManager - live stream session lifecycle
//!
//! ## Components
//!
//! - `process`: one ffmpeg transcoder per session (HLS or MJPEG output)
//! - `registry`: device id -> session, at most one per device
//! - `session`: the live binding of a device to its transcoder
//! - `playback`: playlist / MJPEG frame adapters for viewers
//! - `service`: start/stop/status/play/snapshot/shutdown
//!
//! ## Output layout
//!
//! ```text
//! {stream_root}/{device_id}/playlist.m3u8   HLS (+ playlistN.ts segments)
//! {stream_root}/{device_id}/stream.mjpg     MJPEG, single overwritten frame
//! ```
//!
//! Output directories are never deleted here.

pub mod playback;
pub mod process;
pub mod registry;
pub mod session;
pub mod service;

pub use playback::{MjpegFrames, HLS_CONTENT_TYPE, MJPEG_CONTENT_TYPE, SEGMENT_CONTENT_TYPE};
pub use process::{OutputFormat, TerminateOutcome, TranscodeProcess};
pub use registry::{Insertion, SessionRegistry};
pub use session::{playback_url, PlaybackRef, StreamSession};
pub use service::{
    validate_device_id, Playback, SessionStatus, StartOutcome, StopOutcome, StreamConfig,
    StreamService,
};
