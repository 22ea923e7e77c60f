//! Fake ffmpeg binaries for process tests
//!
//! Each script treats its last argument as the output path, like ffmpeg.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy)]
pub enum Behavior {
    /// Write a playlist / keep overwriting a frame until SIGTERM
    Produce,
    /// Write nothing, exit on SIGTERM
    Idle,
    /// Write nothing, ignore SIGTERM
    IgnoreTerm,
    /// Exit right away with status 1
    ExitImmediately,
    /// Write one frame to the output and exit 0 (snapshot)
    SingleFrame,
    /// Sleep well past any test timeout
    Hang,
}

/// Write an executable fake ffmpeg into `dir`
///
/// Every invocation appends one line to `dir/spawns.log`.
pub fn fake_ffmpeg(dir: &Path, behavior: Behavior) -> PathBuf {
    let log = dir.join("spawns.log");
    let body = match behavior {
        Behavior::Produce => {
            r#"trap 'exit 0' TERM
case "$out" in
  *.m3u8) printf '#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:2\n#EXTINF:2.0,\n/stream/play/cam/playlist0.ts\n' > "$out"
          printf 'TSDATA' > "$(dirname "$out")/playlist0.ts" ;;
esac
while true; do
  case "$out" in
    *.mjpg) printf 'JPEGFRAME' > "$out.tmp" && mv "$out.tmp" "$out" ;;
  esac
  sleep 0.05
done"#
        }
        Behavior::Idle => {
            r#"trap 'exit 0' TERM
while true; do sleep 0.05; done"#
        }
        Behavior::IgnoreTerm => {
            r#"trap '' TERM
while true; do sleep 0.05; done"#
        }
        Behavior::ExitImmediately => "exit 1",
        Behavior::SingleFrame => r#"printf 'JPEGSNAP' > "$out""#,
        Behavior::Hang => "sleep 30",
    };

    let script = format!(
        "#!/bin/sh\necho \"$$\" >> '{}'\nfor out; do :; done\n{}\n",
        log.display(),
        body
    );

    let path = dir.join(format!("ffmpeg-{:?}", behavior).to_lowercase());
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Number of times any fake ffmpeg in `dir` has been started
pub fn spawn_count(dir: &Path) -> usize {
    std::fs::read_to_string(dir.join("spawns.log"))
        .map(|s| s.lines().count())
        .unwrap_or(0)
}
