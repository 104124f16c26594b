//! # Jukebox Common Library
//!
//! Shared code for the jukebox daemon and its clients:
//! - Track catalog entities
//! - Status snapshot wire types
//! - Event types (PlayerEvent enum) and the broadcast EventBus
//! - Error taxonomy

pub mod error;
pub mod events;
pub mod status;
pub mod track;

pub use error::{Error, ErrorKind, Result};
pub use events::{EventBus, PlaybackState, PlayerEvent};
pub use status::{LastError, StatusSnapshot};
pub use track::{Track, TrackProjection};
