//! yt-dlp metadata provider
//!
//! One `yt-dlp --dump-single-json` invocation per lookup: the provider
//! hands back title, duration, thumbnail, the canonical page URL and a
//! fresh (short-lived) stream URL. Search uses the `ytsearchN:` pseudo-URL
//! form. All invocations go through the shared retry/backoff policy since
//! extraction failures are usually transient network trouble.

use super::{retry_with_backoff, TrackResolver};
use async_trait::async_trait;
use jukebox_common::track::UNKNOWN_TITLE;
use jukebox_common::{Error, Result, Track};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::ResolverConfig;

pub struct YtDlpResolver {
    binary: String,
    max_attempts: u32,
    initial_backoff: Duration,
}

/// Subset of the yt-dlp JSON dump this daemon cares about. A playlist or
/// search dump nests its items under `entries`.
#[derive(Debug, Clone, Deserialize)]
struct DumpEntry {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    thumbnail: Option<String>,
    #[serde(default)]
    webpage_url: Option<String>,
    /// Direct media URL for the selected format. Expires within hours.
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    entries: Option<Vec<DumpEntry>>,
}

impl YtDlpResolver {
    pub fn new(binary: String, config: &ResolverConfig) -> Self {
        Self {
            binary,
            max_attempts: config.max_attempts,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
        }
    }

    /// Run one extraction and parse the JSON dump.
    async fn dump(&self, target: &str) -> Result<DumpEntry> {
        let output = tokio::process::Command::new(&self.binary)
            .args([
                "--dump-single-json",
                "--no-warnings",
                "--format",
                "bestaudio/best",
            ])
            .arg(target)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::ResolutionFailed(format!("{} not found in PATH", self.binary))
                } else {
                    Error::ResolutionFailed(format!("failed to run {}: {}", self.binary, e))
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::ResolutionFailed(format!(
                "extraction failed for {}: {}",
                target,
                stderr.trim().lines().last().unwrap_or("unknown error")
            )));
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| Error::ResolutionFailed(format!("unparsable extractor output: {}", e)))
    }
}

#[async_trait]
impl TrackResolver for YtDlpResolver {
    async fn resolve(&self, url: &str) -> Result<Track> {
        let entry = retry_with_backoff(
            "remote resolution",
            self.max_attempts,
            self.initial_backoff,
            || self.dump(url),
        )
        .await?;

        // A playlist URL resolves to its first item.
        let entry = match entry.entries {
            Some(mut entries) if !entries.is_empty() => {
                if entries.len() > 1 {
                    warn!(url, count = entries.len(), "playlist given, taking first entry");
                }
                entries.remove(0)
            }
            Some(_) => {
                return Err(Error::ResolutionFailed(format!("no playable entries at {}", url)))
            }
            None => entry,
        };

        entry_to_track(entry)
            .ok_or_else(|| Error::ResolutionFailed(format!("no stream reference for {}", url)))
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Track>> {
        let target = format!("ytsearch{}:{}", limit.max(1), query);
        let dump = retry_with_backoff(
            "remote search",
            self.max_attempts,
            self.initial_backoff,
            || self.dump(&target),
        )
        .await?;

        let entries = dump.entries.unwrap_or_default();
        let tracks: Vec<Track> = entries.into_iter().filter_map(entry_to_track).collect();

        debug!(query, results = tracks.len(), "search resolved");
        Ok(tracks)
    }
}

/// Fold a dump entry into a track, or nothing when the entry carries no
/// stream reference. Identity prefers the canonical page URL; the direct
/// media URL only ever fills the transient stream slot.
fn entry_to_track(entry: DumpEntry) -> Option<Track> {
    let stream_url = entry.url?;
    let identity = entry
        .webpage_url
        .clone()
        .unwrap_or_else(|| stream_url.clone());

    Some(Track {
        url: identity.clone(),
        title: entry.title.unwrap_or_else(|| UNKNOWN_TITLE.to_string()),
        duration_sec: entry
            .duration
            .filter(|secs| secs.is_finite() && *secs > 0.0)
            .map(|secs| secs.round() as u64)
            .unwrap_or(0),
        is_local: false,
        thumbnail_url: entry.thumbnail,
        webpage_url: entry.webpage_url.or(Some(identity)),
        local_copy: None,
        stream_url: Some(stream_url),
    })
}
