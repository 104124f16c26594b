//! Track catalog entities
//!
//! A `Track` is the unit everything else moves around: queue slots,
//! history entries and favorites all hold tracks by value. Identity is the
//! remote URL or the absolute local path and never changes after
//! construction; metadata may be refined in place as resolution completes.

use serde::{Deserialize, Serialize};

/// Title shown until resolution supplies a real one.
pub const UNKNOWN_TITLE: &str = "Unknown title";

fn default_title() -> String {
    UNKNOWN_TITLE.to_string()
}

/// A playable item, remote or local.
///
/// Persisted list files may come from older releases with missing fields,
/// so every non-identity field tolerates absence on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    /// Remote source URL or absolute local file path. This is the track's
    /// identity.
    pub url: String,

    /// Display title; placeholder until resolution fills it in.
    #[serde(default = "default_title")]
    pub title: String,

    /// Whole seconds, 0 = unknown.
    #[serde(default)]
    pub duration_sec: u64,

    #[serde(default)]
    pub is_local: bool,

    /// Source of the cover image, fetched through the cover cache.
    #[serde(default)]
    pub thumbnail_url: Option<String>,

    /// Browser-facing page for remote tracks; mirrors the path for local
    /// ones.
    #[serde(default)]
    pub webpage_url: Option<String>,

    /// File produced by a completed download job. The track keeps its
    /// original identity; playback just prefers this copy.
    #[serde(default)]
    pub local_copy: Option<String>,

    /// Short-lived playable stream URL for remote tracks. Never persisted:
    /// stream URLs expire, so a reloaded remote track re-resolves before
    /// playback.
    #[serde(skip)]
    pub stream_url: Option<String>,
}

impl Track {
    /// Build a track for a local audio file. The path doubles as the
    /// identity and the playable reference.
    pub fn local(path: impl Into<String>, title: impl Into<String>, duration_sec: u64) -> Self {
        let path = path.into();
        Self {
            webpage_url: Some(path.clone()),
            url: path,
            title: title.into(),
            duration_sec,
            is_local: true,
            thumbnail_url: None,
            local_copy: None,
            stream_url: None,
        }
    }

    /// Stable identity used for history dedupe and favorites keying.
    pub fn identity(&self) -> &str {
        self.webpage_url.as_deref().unwrap_or(&self.url)
    }

    /// The reference handed to the engine, when one is available without
    /// resolution. Downloaded copies win over everything else.
    pub fn playable_ref(&self) -> Option<&str> {
        if let Some(local) = self.local_copy.as_deref() {
            return Some(local);
        }
        if self.is_local {
            return Some(&self.url);
        }
        self.stream_url.as_deref()
    }

    /// True when playback must first go through the resolution pipeline.
    pub fn needs_resolution(&self) -> bool {
        self.playable_ref().is_none()
    }

    /// Client-facing view of this track.
    pub fn projection(&self) -> TrackProjection {
        TrackProjection {
            title: self.title.clone(),
            thumbnail_url: self.thumbnail_url.clone(),
            is_local: self.is_local,
            duration_sec: self.duration_sec,
            webpage_url: self.webpage_url.clone(),
            url: self.url.clone(),
        }
    }
}

/// Wire projection of a track as embedded in the status snapshot and the
/// list endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackProjection {
    pub title: String,
    pub thumbnail_url: Option<String>,
    pub is_local: bool,
    pub duration_sec: u64,
    pub webpage_url: Option<String>,
    pub url: String,
}
