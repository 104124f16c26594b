//! External playback engine boundary
//!
//! The daemon never decodes audio. Everything the engine does is reached
//! through [`AudioEngine`], a small capability surface with bounded-time
//! semantics: every call resolves within the configured request timeout,
//! and callers fall back to last-known values when the engine is slow or
//! gone. The engine owns position/duration/playing truth; the controller
//! owns queue position and volume.

mod mpv;

pub use mpv::MpvEngine;

use async_trait::async_trait;
use jukebox_common::Result;

/// Live report from the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EngineStatus {
    pub position_ms: u64,
    /// 0 while the engine has not determined the duration.
    pub duration_ms: u64,
    pub playing: bool,
    /// Explicit end-of-stream marker; set once the loaded media has been
    /// played to the end and until other media replaces it.
    pub reached_end: bool,
    /// True when the engine has no media loaded at all. Distinct from
    /// `reached_end`: finished media stays loaded, a crashed-and-respawned
    /// engine comes back empty.
    pub idle: bool,
}

/// Capability surface of the external media engine.
#[async_trait]
pub trait AudioEngine: Send + Sync {
    /// Load a playable reference and begin playback.
    async fn load(&self, stream_ref: &str) -> Result<()>;

    /// Resume the loaded media.
    async fn play(&self) -> Result<()>;

    /// Pause the loaded media.
    async fn pause(&self) -> Result<()>;

    /// Jump to an absolute position.
    async fn seek(&self, position_ms: u64) -> Result<()>;

    /// Canonical 0–100 volume; each adapter translates to its native
    /// scale internally.
    async fn set_volume(&self, volume: u8) -> Result<()>;

    /// Query position/duration/playing plus the end-of-stream flag.
    async fn query_position(&self) -> Result<EngineStatus>;

    /// Unload whatever is playing and go quiet.
    async fn stop(&self) -> Result<()>;

    /// Terminate the engine on daemon shutdown.
    async fn shutdown(&self) -> Result<()>;
}
