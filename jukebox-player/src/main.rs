//! jukeboxd - Jukebox player daemon entry point
//!
//! Wires the pieces together: configuration, the mpv adapter, the
//! resolution pipeline, persisted lists, the download manager and the
//! HTTP surface, then runs until SIGINT/SIGTERM.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use jukebox_common::EventBus;
use jukebox_player::api::{self, AppState};
use jukebox_player::config::{Config, ConfigOverrides};
use jukebox_player::controller::poll::{spawn_merge_task, spawn_poll_task};
use jukebox_player::controller::{ControllerSettings, LoadedLists, PlayerController};
use jukebox_player::covers::CoverArtCache;
use jukebox_player::download::DownloadManager;
use jukebox_player::engine::{AudioEngine, MpvEngine};
use jukebox_player::resolver::{ImportPipeline, LocalImporter, TrackResolver, YtDlpResolver};
use jukebox_player::store::ListStore;

/// Command-line arguments for jukeboxd
#[derive(Parser, Debug)]
#[command(name = "jukeboxd")]
#[command(about = "Jukebox player daemon")]
#[command(version)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "JUKEBOX_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on (overrides the config file)
    #[arg(short, long, env = "JUKEBOX_PORT")]
    port: Option<u16>,

    /// Data directory for lists, covers and downloads (overrides the
    /// config file)
    #[arg(short, long, env = "JUKEBOX_DATA_DIR")]
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "jukebox_player=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    info!("Starting jukeboxd v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load(
        args.config.as_deref(),
        ConfigOverrides {
            port: args.port,
            data_dir: args.data_dir,
        },
    )
    .await
    .context("Failed to load configuration")?;

    info!("Data directory: {}", config.data_dir.display());

    tokio::fs::create_dir_all(&config.downloads_dir)
        .await
        .context("Failed to create downloads directory")?;

    // Engine adapter. The mpv process itself starts lazily on first load.
    let socket_path = config
        .engine
        .socket_path
        .clone()
        .unwrap_or_else(|| config.data_dir.join("mpv.sock"));
    let engine: Arc<dyn AudioEngine> = Arc::new(MpvEngine::new(
        config.engine.binary.clone(),
        socket_path,
        config.engine.network_caching_ms,
        config.engine_timeout(),
    ));

    // Resolution pipeline: remote via yt-dlp, local via ffprobe.
    let resolver: Arc<dyn TrackResolver> = Arc::new(YtDlpResolver::new(
        config.tools.ytdlp.clone(),
        &config.resolver,
    ));
    let pipeline = ImportPipeline::new(resolver, LocalImporter::new(config.tools.ffprobe.clone()));

    let covers = Arc::new(
        CoverArtCache::new(
            config.covers_dir.clone(),
            Duration::from_millis(config.covers.fetch_timeout_ms),
        )
        .context("Failed to initialize cover art cache")?,
    );

    let events = EventBus::new(64);

    let (outcome_tx, outcome_rx) = tokio::sync::mpsc::unbounded_channel();
    let downloads = Arc::new(DownloadManager::new(
        config.tools.ytdlp.clone(),
        config.downloads_dir.clone(),
        events.clone(),
        outcome_tx,
    ));

    let store = ListStore::new(config.data_dir.clone())
        .await
        .context("Failed to initialize list store")?;
    let lists = LoadedLists::load(&store).await;

    let controller = Arc::new(PlayerController::new(
        engine,
        pipeline,
        store,
        downloads,
        events,
        ControllerSettings::from(&config),
        lists,
    ));

    let poll_handle = spawn_poll_task(controller.clone(), config.poll_interval());
    let merge_handle = spawn_merge_task(controller.clone(), outcome_rx);

    let app = api::create_router(AppState {
        controller: controller.clone(),
        covers,
        port: config.port,
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("jukeboxd listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Stop the background loops before the final state flush so nothing
    // mutates the lists mid-save.
    poll_handle.abort();
    merge_handle.abort();
    controller.shutdown().await;

    info!("Shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
