//! Scripted engine stand-in
//!
//! Behaves like an obedient mpv: remembers what was loaded, reports
//! whatever the test scripts into it, and can be told to fail specific
//! calls. `idle` is derived: no loaded media means idle, matching how a
//! respawned engine presents itself.

use async_trait::async_trait;
use jukebox_common::{Error, Result};
use jukebox_player::engine::{AudioEngine, EngineStatus};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
pub struct EngineScript {
    /// Reference most recently handed to `load`.
    pub loaded: Option<String>,
    pub playing: bool,
    pub position_ms: u64,
    pub duration_ms: u64,
    pub reached_end: bool,
    pub volume: Option<u8>,

    /// Duration reported after the next successful load.
    pub next_duration_ms: u64,

    pub load_count: u32,
    pub seek_count: u32,
    pub stop_count: u32,
    pub shutdown_count: u32,

    pub fail_loads: bool,
    pub fail_pauses: bool,
    pub fail_queries: bool,
}

pub struct MockEngine {
    script: Mutex<EngineScript>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(EngineScript {
                next_duration_ms: 200_000,
                ..EngineScript::default()
            }),
        }
    }

    /// Direct access for scripting and assertions.
    pub fn script(&self) -> MutexGuard<'_, EngineScript> {
        self.script.lock().unwrap()
    }
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AudioEngine for MockEngine {
    async fn load(&self, stream_ref: &str) -> Result<()> {
        let mut s = self.script();
        if s.fail_loads {
            return Err(Error::EngineFault("scripted load failure".into()));
        }
        s.loaded = Some(stream_ref.to_string());
        s.playing = true;
        s.position_ms = 0;
        s.duration_ms = s.next_duration_ms;
        s.reached_end = false;
        s.load_count += 1;
        Ok(())
    }

    async fn play(&self) -> Result<()> {
        let mut s = self.script();
        s.playing = s.loaded.is_some();
        Ok(())
    }

    async fn pause(&self) -> Result<()> {
        let mut s = self.script();
        if s.fail_pauses {
            return Err(Error::EngineFault("scripted pause failure".into()));
        }
        s.playing = false;
        Ok(())
    }

    async fn seek(&self, position_ms: u64) -> Result<()> {
        let mut s = self.script();
        s.position_ms = position_ms;
        s.seek_count += 1;
        Ok(())
    }

    async fn set_volume(&self, volume: u8) -> Result<()> {
        self.script().volume = Some(volume);
        Ok(())
    }

    async fn query_position(&self) -> Result<EngineStatus> {
        let s = self.script();
        if s.fail_queries {
            return Err(Error::EngineFault("scripted query failure".into()));
        }
        Ok(EngineStatus {
            position_ms: s.position_ms,
            duration_ms: s.duration_ms,
            playing: s.playing && s.loaded.is_some(),
            reached_end: s.reached_end,
            idle: s.loaded.is_none(),
        })
    }

    async fn stop(&self) -> Result<()> {
        let mut s = self.script();
        s.loaded = None;
        s.playing = false;
        s.position_ms = 0;
        s.duration_ms = 0;
        s.reached_end = false;
        s.stop_count += 1;
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        let mut s = self.script();
        s.loaded = None;
        s.playing = false;
        s.shutdown_count += 1;
        Ok(())
    }
}
