//! Fully wired controller on a temporary data directory, with scripted
//! engine and provider.

use jukebox_common::{EventBus, Track};
use jukebox_player::controller::{ControllerSettings, LoadedLists, PlayerController};
use jukebox_player::covers::CoverArtCache;
use jukebox_player::download::{DownloadManager, DownloadOutcome};
use jukebox_player::engine::AudioEngine;
use jukebox_player::resolver::{ImportPipeline, LocalImporter, TrackResolver};
use jukebox_player::store::ListStore;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;

use super::{MockEngine, MockResolver};

/// A local track that plays without resolution.
pub fn local_track(name: &str) -> Track {
    Track::local(format!("/music/{}.mp3", name), name, 150)
}

/// A remote track that still needs a stream reference.
pub fn remote_track(id: &str) -> Track {
    Track {
        url: format!("https://tube.example/watch?v={}", id),
        title: format!("Remote {}", id),
        duration_sec: 120,
        is_local: false,
        thumbnail_url: None,
        webpage_url: Some(format!("https://tube.example/watch?v={}", id)),
        local_copy: None,
        stream_url: None,
    }
}

/// A remote track already carrying a stream reference.
pub fn resolved_remote(id: &str) -> Track {
    Track {
        stream_url: Some(format!("https://cdn.example/{}#stream", id)),
        ..remote_track(id)
    }
}

pub struct TestPlayer {
    pub controller: Arc<PlayerController>,
    pub engine: Arc<MockEngine>,
    pub resolver: Arc<MockResolver>,
    pub events: EventBus,
    pub outcomes: mpsc::UnboundedReceiver<DownloadOutcome>,
    /// Keeps the data directory alive for the fixture's lifetime.
    pub data_dir: TempDir,
}

impl TestPlayer {
    pub async fn new() -> Self {
        Self::with_settings(|_| {}).await
    }

    /// Build with tweaked controller settings. The test default commits
    /// history immediately (dwell 0) so list assertions need no sleeps.
    pub async fn with_settings(tweak: impl FnOnce(&mut ControllerSettings)) -> Self {
        let mut settings = ControllerSettings {
            default_volume: 80,
            loop_at_end: false,
            history_max_entries: 50,
            history_dwell_ms: 0,
        };
        tweak(&mut settings);

        let data_dir = tempfile::tempdir().expect("tempdir");
        let store = ListStore::new(data_dir.path()).await.expect("list store");
        let lists = LoadedLists::load(&store).await;

        let engine = Arc::new(MockEngine::new());
        let resolver = Arc::new(MockResolver::new());
        let events = EventBus::new(64);

        let pipeline = ImportPipeline::new(
            resolver.clone() as Arc<dyn TrackResolver>,
            LocalImporter::new("ffprobe-not-installed".to_string()),
        );

        let (outcome_tx, outcomes) = mpsc::unbounded_channel();
        let downloads = Arc::new(DownloadManager::new(
            "yt-dlp-not-installed".to_string(),
            data_dir.path().join("downloads"),
            events.clone(),
            outcome_tx,
        ));

        let controller = Arc::new(PlayerController::new(
            engine.clone() as Arc<dyn AudioEngine>,
            pipeline,
            store,
            downloads,
            events.clone(),
            settings,
            lists,
        ));

        Self {
            controller,
            engine,
            resolver,
            events,
            outcomes,
            data_dir,
        }
    }

    /// Build with the given tracks already enqueued.
    pub async fn with_queue(tracks: Vec<Track>) -> Self {
        let player = Self::new().await;
        for track in tracks {
            player
                .controller
                .enqueue_track(track)
                .await
                .expect("enqueue");
        }
        player
    }

    /// Router over this player for HTTP-level tests.
    pub fn router(&self) -> axum::Router {
        let covers = Arc::new(
            CoverArtCache::new(
                self.data_dir.path().join("covers"),
                Duration::from_millis(500),
            )
            .expect("cover cache"),
        );
        jukebox_player::api::create_router(jukebox_player::api::AppState {
            controller: self.controller.clone(),
            covers,
            port: 0,
        })
    }
}
