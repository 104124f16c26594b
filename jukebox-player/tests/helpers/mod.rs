//! Test helper modules for jukebox-player integration tests
//!
//! Provides reusable test infrastructure components:
//! - MockEngine: scripted stand-in for the mpv adapter
//! - MockResolver: scripted stand-in for the yt-dlp provider
//! - TestPlayer: a fully wired controller on a temporary data directory

pub mod fixture;
pub mod mock_engine;
pub mod mock_resolver;

pub use fixture::{local_track, remote_track, resolved_remote, TestPlayer};
pub use mock_engine::MockEngine;
pub use mock_resolver::MockResolver;
