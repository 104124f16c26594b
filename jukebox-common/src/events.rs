//! Event types for the jukebox event system
//!
//! Events describe state changes after they happen; they never carry
//! authority. The status snapshot remains the single source of truth for
//! clients, events exist for logging and loosely-coupled observers inside
//! the daemon.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;
use uuid::Uuid;

/// Player state machine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    /// Nothing selected, engine unloaded
    Idle,
    /// A track is being resolved/handed to the engine
    Loading,
    Playing,
    Paused,
    /// Engine reported end-of-stream; advance is pending
    Ended,
}

impl PlaybackState {
    /// Whether the player is actively driving the engine in this state.
    pub fn is_playing(&self) -> bool {
        matches!(self, PlaybackState::Loading | PlaybackState::Playing)
    }
}

/// Jukebox event types
///
/// Events are broadcast via [`EventBus`] and serialize with a `type` tag
/// for log sinks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PlayerEvent {
    /// Playback state machine transition
    PlaybackStateChanged {
        old_state: PlaybackState,
        new_state: PlaybackState,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A track became the current playing track
    TrackStarted {
        url: String,
        title: String,
        queue_index: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The engine reached end-of-stream for the current track
    TrackCompleted {
        url: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Queue contents changed (enqueue, remove, move, clear)
    QueueChanged {
        queue_length: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Canonical volume changed
    VolumeChanged {
        volume: u8,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Background download/transcode job launched
    DownloadStarted {
        job_id: Uuid,
        url: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Download job produced a local copy
    DownloadCompleted {
        job_id: Uuid,
        url: String,
        local_path: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Download job failed; the track stays playable as a stream
    DownloadFailed {
        job_id: Uuid,
        url: String,
        reason: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The external engine errored or became unresponsive
    EngineFault {
        message: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

/// Broadcast bus for [`PlayerEvent`]
///
/// Thin wrapper over `tokio::sync::broadcast` so emitters never block and
/// slow subscribers lose old events rather than stalling the player.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PlayerEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events. Events emitted before subscription
    /// are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring whether anyone is listening. Having no
    /// subscribers is the normal idle condition for this daemon.
    pub fn emit(&self, event: PlayerEvent) {
        if self.tx.send(event).is_err() {
            trace!("event emitted with no subscribers");
        }
    }

    /// Current number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Configured channel capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
