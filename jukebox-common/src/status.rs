//! Status snapshot wire types
//!
//! Every mutating player command and the polling endpoint return the same
//! shape, so command responses and poll responses are indistinguishable to
//! the client.

use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;
use crate::track::TrackProjection;

/// Authoritative view of the player, produced only by the controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub is_playing: bool,
    pub current_track: Option<TrackProjection>,
    /// −1 when nothing is selected.
    pub current_track_index: i64,
    pub current_time_ms: u64,
    /// 0 until the engine reports the real duration.
    pub duration_ms: u64,
    /// Canonical 0–100 range.
    pub volume: u8,
    /// Most recent absorbed failure, cleared by the next successful
    /// track start.
    pub last_error: Option<LastError>,
}

/// Absorbed failure surfaced through the snapshot instead of being thrown
/// across the command boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastError {
    pub kind: ErrorKind,
    pub message: String,
}
