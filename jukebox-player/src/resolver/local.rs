//! Local file import
//!
//! A local path becomes a track only if its extension is on the audio
//! allowlist; everything else is rejected before any track exists.
//! Duration is probed with ffprobe when the tool answers, and left at 0
//! (unknown) when it does not; probing is best-effort, never a reason to
//! refuse an import.

use jukebox_common::track::UNKNOWN_TITLE;
use jukebox_common::{Error, Result, Track};
use std::path::Path;
use tokio::process::Command;
use tracing::debug;

/// Extensions accepted for local import.
pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "flac", "wav", "ogg", "m4a", "webm", "opus"];

pub struct LocalImporter {
    ffprobe: String,
}

impl LocalImporter {
    pub fn new(ffprobe: String) -> Self {
        Self { ffprobe }
    }

    /// Validate and import a local audio file.
    pub async fn import(&self, path: &str) -> Result<Track> {
        let ext = Path::new(path)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        if !AUDIO_EXTENSIONS.contains(&ext.as_str()) {
            return Err(Error::UnsupportedFormat(path.to_string()));
        }

        tokio::fs::metadata(path).await?;

        let title = Path::new(path)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or(UNKNOWN_TITLE)
            .to_string();

        let duration_sec = self.probe_duration(path).await.unwrap_or(0);

        Ok(Track::local(path, title, duration_sec))
    }

    /// Ask ffprobe for the container duration in whole seconds.
    async fn probe_duration(&self, path: &str) -> Option<u64> {
        let output = Command::new(&self.ffprobe)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(path)
            .output()
            .await
            .ok()?;

        if !output.status.success() {
            debug!(path, "ffprobe could not read duration");
            return None;
        }

        let seconds: f64 = String::from_utf8_lossy(&output.stdout).trim().parse().ok()?;
        if seconds.is_finite() && seconds > 0.0 {
            Some(seconds.round() as u64)
        } else {
            None
        }
    }
}
