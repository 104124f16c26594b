//! # Jukebox Player Daemon (jukebox-player)
//!
//! Player-state orchestration and queue engine.
//!
//! **Purpose:** Own playback state for an ordered track queue, drive the
//! external media engine (mpv over its JSON IPC socket), keep history and
//! favorites durable, and serve the HTTP command/status surface the shell
//! polls once per second.
//!
//! **Architecture:** A single serialized controller around the state
//! machine, with resolution, download/transcode and cover-art work running
//! as background tasks that merge their results back through a channel.

pub mod api;
pub mod config;
pub mod controller;
pub mod covers;
pub mod download;
pub mod engine;
pub mod resolver;
pub mod store;

pub use config::Config;
pub use controller::PlayerController;
