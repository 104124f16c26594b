//! Configuration management for the jukebox daemon
//!
//! One TOML file covers everything; every field has a built-in default so
//! the daemon starts with no file at all. Command-line arguments override
//! the file.
//!
//! # Settings Sources Priority
//!
//! 1. Command-line arguments (--port, --data-dir)
//! 2. Environment variables (JUKEBOX_PORT, JUKEBOX_DATA_DIR)
//! 3. TOML configuration file
//! 4. Built-in defaults (code constants)

use jukebox_common::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Configuration loaded from the TOML file
///
/// These settings cannot change during runtime. The daemon must restart to
/// pick up changes.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory holding the persisted lists, cover cache and downloads.
    /// Defaults to `<OS data dir>/jukebox`.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    #[serde(default)]
    pub playback: PlaybackConfig,

    #[serde(default)]
    pub history: HistoryConfig,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub resolver: ResolverConfig,

    #[serde(default)]
    pub covers: CoversConfig,
}

/// Playback behavior
#[derive(Debug, Clone, Deserialize)]
pub struct PlaybackConfig {
    /// Initial canonical volume (0–100)
    #[serde(default = "default_volume")]
    pub default_volume: u8,

    /// Wrap to the first track when the queue ends instead of stopping
    #[serde(default)]
    pub loop_at_end: bool,

    /// Engine poll cadence
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

/// History retention
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryConfig {
    /// Entries kept before the oldest is evicted
    #[serde(default = "default_history_max")]
    pub max_entries: usize,

    /// How long a track must stay current before it is recorded, so
    /// skipped tracks are not logged
    #[serde(default = "default_history_dwell_ms")]
    pub dwell_ms: u64,
}

/// External playback engine (mpv)
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_engine_binary")]
    pub binary: String,

    /// IPC socket path; defaults to `<data_dir>/mpv.sock`
    #[serde(default)]
    pub socket_path: Option<PathBuf>,

    /// Upper bound on any single IPC request
    #[serde(default = "default_engine_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Stream read-ahead handed to the engine for remote sources
    #[serde(default = "default_network_caching_ms")]
    pub network_caching_ms: u64,
}

/// External tool binaries
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_ytdlp_binary")]
    pub ytdlp: String,

    #[serde(default = "default_ffprobe_binary")]
    pub ffprobe: String,
}

/// Remote resolution retry policy
#[derive(Debug, Clone, Deserialize)]
pub struct ResolverConfig {
    /// Attempts before surfacing a resolution failure
    #[serde(default = "default_resolver_attempts")]
    pub max_attempts: u32,

    /// First retry delay; doubles on each subsequent attempt
    #[serde(default = "default_resolver_backoff_ms")]
    pub initial_backoff_ms: u64,
}

/// Cover art cache
#[derive(Debug, Clone, Deserialize)]
pub struct CoversConfig {
    #[serde(default = "default_cover_timeout_ms")]
    pub fetch_timeout_ms: u64,
}

fn default_port() -> u16 {
    5710
}

fn default_volume() -> u8 {
    80
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_history_max() -> usize {
    50
}

fn default_history_dwell_ms() -> u64 {
    3000
}

fn default_engine_binary() -> String {
    "mpv".to_string()
}

fn default_engine_timeout_ms() -> u64 {
    2000
}

fn default_network_caching_ms() -> u64 {
    3000
}

fn default_ytdlp_binary() -> String {
    "yt-dlp".to_string()
}

fn default_ffprobe_binary() -> String {
    "ffprobe".to_string()
}

fn default_resolver_attempts() -> u32 {
    3
}

fn default_resolver_backoff_ms() -> u64 {
    500
}

fn default_cover_timeout_ms() -> u64 {
    10_000
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            default_volume: default_volume(),
            loop_at_end: false,
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_entries: default_history_max(),
            dwell_ms: default_history_dwell_ms(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            binary: default_engine_binary(),
            socket_path: None,
            request_timeout_ms: default_engine_timeout_ms(),
            network_caching_ms: default_network_caching_ms(),
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ytdlp: default_ytdlp_binary(),
            ffprobe: default_ffprobe_binary(),
        }
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_resolver_attempts(),
            initial_backoff_ms: default_resolver_backoff_ms(),
        }
    }
}

impl Default for CoversConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_ms: default_cover_timeout_ms(),
        }
    }
}

/// Complete daemon configuration with every path resolved
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub data_dir: PathBuf,
    pub covers_dir: PathBuf,
    pub downloads_dir: PathBuf,
    pub playback: PlaybackConfig,
    pub history: HistoryConfig,
    pub engine: EngineConfig,
    pub tools: ToolsConfig,
    pub resolver: ResolverConfig,
    pub covers: CoversConfig,
}

/// Command-line configuration overrides
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub port: Option<u16>,
    pub data_dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration: explicit file if given, the default location
    /// otherwise, built-in defaults when no file exists.
    pub async fn load(toml_path: Option<&Path>, overrides: ConfigOverrides) -> Result<Self> {
        let toml_config = match toml_path {
            Some(path) => {
                let toml_str = tokio::fs::read_to_string(path).await.map_err(|e| {
                    Error::Config(format!("failed to read config file {:?}: {}", path, e))
                })?;
                let parsed: TomlConfig = toml::from_str(&toml_str)
                    .map_err(|e| Error::Config(format!("failed to parse TOML: {}", e)))?;
                info!("Loaded configuration from {:?}", path);
                parsed
            }
            None => {
                let default_path = Path::new("jukeboxd.toml");
                match tokio::fs::read_to_string(default_path).await {
                    Ok(toml_str) => {
                        let parsed: TomlConfig = toml::from_str(&toml_str)
                            .map_err(|e| Error::Config(format!("failed to parse TOML: {}", e)))?;
                        info!("Loaded configuration from {:?}", default_path);
                        parsed
                    }
                    Err(_) => {
                        info!("No configuration file found, using built-in defaults");
                        TomlConfig::default()
                    }
                }
            }
        };

        Ok(Self::resolve(toml_config, overrides))
    }

    /// Apply overrides and resolve derived paths.
    fn resolve(toml_config: TomlConfig, overrides: ConfigOverrides) -> Self {
        let port = overrides.port.unwrap_or(toml_config.port);
        let data_dir = overrides
            .data_dir
            .or(toml_config.data_dir)
            .unwrap_or_else(default_data_dir);

        let covers_dir = data_dir.join("covers");
        let downloads_dir = data_dir.join("downloads");

        let mut engine = toml_config.engine;
        if engine.socket_path.is_none() {
            engine.socket_path = Some(data_dir.join("mpv.sock"));
        }

        Config {
            port,
            data_dir,
            covers_dir,
            downloads_dir,
            playback: toml_config.playback,
            history: toml_config.history,
            engine,
            tools: toml_config.tools,
            resolver: toml_config.resolver,
            covers: toml_config.covers,
        }
    }

    /// Engine IPC request timeout as a Duration.
    pub fn engine_timeout(&self) -> Duration {
        Duration::from_millis(self.engine.request_timeout_ms)
    }

    /// Engine poll cadence as a Duration.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.playback.poll_interval_ms)
    }
}

/// `<OS data dir>/jukebox`, falling back to `./data` on platforms without
/// a data directory convention.
fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("jukebox"))
        .unwrap_or_else(|| PathBuf::from("data"))
}
