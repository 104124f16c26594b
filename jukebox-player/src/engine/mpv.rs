//! mpv adapter for the [`AudioEngine`] trait
//!
//! Spawns `mpv --idle --input-ipc-server=<socket>` and speaks its JSON IPC
//! protocol over the unix socket: one JSON object per line out, replies
//! correlated by `request_id`, async property-change events interleaved on
//! the same stream (we skip those, position is polled instead).
//!
//! The process is supervised lazily: every request checks the child first
//! and respawns/reconnects when it died, so a crashed engine costs one
//! failed command rather than taking the daemon down.

use super::{AudioEngine, EngineStatus};
use async_trait::async_trait;
use jukebox_common::{Error, Result};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufStream};
use tokio::net::UnixStream;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// How long to wait for the IPC socket to appear after spawning mpv.
const SOCKET_WAIT: Duration = Duration::from_secs(3);
const SOCKET_RETRY_DELAY: Duration = Duration::from_millis(100);

/// mpv process + IPC connection, guarded as one unit so a respawn can
/// never race a request.
struct IpcState {
    child: Option<Child>,
    stream: Option<BufStream<UnixStream>>,
}

pub struct MpvEngine {
    binary: String,
    socket_path: PathBuf,
    network_caching_ms: u64,
    request_timeout: Duration,
    ipc: Mutex<IpcState>,
    request_counter: AtomicU64,
}

impl MpvEngine {
    pub fn new(
        binary: String,
        socket_path: PathBuf,
        network_caching_ms: u64,
        request_timeout: Duration,
    ) -> Self {
        Self {
            binary,
            socket_path,
            network_caching_ms,
            request_timeout,
            ipc: Mutex::new(IpcState {
                child: None,
                stream: None,
            }),
            request_counter: AtomicU64::new(1),
        }
    }

    /// Spawn mpv and connect the IPC socket if either is missing.
    async fn ensure_running(&self, ipc: &mut IpcState) -> Result<()> {
        let child_alive = match ipc.child.as_mut() {
            Some(child) => match child.try_wait() {
                Ok(None) => true,
                Ok(Some(status)) => {
                    warn!(%status, "mpv exited, respawning");
                    false
                }
                Err(e) => {
                    warn!(error = %e, "cannot check mpv status, respawning");
                    false
                }
            },
            None => false,
        };

        if !child_alive {
            ipc.stream = None;
            // A stale socket file makes mpv fail to bind.
            let _ = tokio::fs::remove_file(&self.socket_path).await;

            let cache_secs = (self.network_caching_ms as f64 / 1000.0).max(1.0);
            let child = Command::new(&self.binary)
                .arg("--idle=yes")
                .arg("--no-video")
                .arg("--no-terminal")
                .arg("--keep-open=yes")
                .arg(format!("--cache-secs={}", cache_secs))
                .arg(format!(
                    "--input-ipc-server={}",
                    self.socket_path.display()
                ))
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .spawn()
                .map_err(|e| Error::EngineFault(format!("failed to spawn mpv: {}", e)))?;

            info!(binary = %self.binary, socket = %self.socket_path.display(), "spawned mpv");
            ipc.child = Some(child);
        }

        if ipc.stream.is_none() {
            let mut waited = Duration::ZERO;
            let stream = loop {
                match UnixStream::connect(&self.socket_path).await {
                    Ok(stream) => break stream,
                    Err(e) => {
                        if waited >= SOCKET_WAIT {
                            return Err(Error::EngineFault(format!(
                                "mpv socket {} not answering: {}",
                                self.socket_path.display(),
                                e
                            )));
                        }
                        tokio::time::sleep(SOCKET_RETRY_DELAY).await;
                        waited += SOCKET_RETRY_DELAY;
                    }
                }
            };
            debug!(socket = %self.socket_path.display(), "connected to mpv IPC");
            ipc.stream = Some(BufStream::new(stream));
        }

        Ok(())
    }

    /// Send one command and wait for its correlated reply, skipping any
    /// interleaved events. Bounded by the request timeout; an IPC failure
    /// drops the connection so the next request reconnects.
    async fn request(&self, command: Vec<Value>) -> Result<MpvReply> {
        let mut ipc = self.ipc.lock().await;
        self.ensure_running(&mut ipc).await?;

        let request_id = self.request_counter.fetch_add(1, Ordering::Relaxed);
        let payload = json!({ "command": command, "request_id": request_id });

        let result = tokio::time::timeout(
            self.request_timeout,
            Self::exchange(&mut ipc, &payload, request_id),
        )
        .await;

        match result {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(e)) => {
                ipc.stream = None;
                Err(e)
            }
            Err(_) => {
                ipc.stream = None;
                Err(Error::EngineFault(format!(
                    "mpv request timed out after {:?}",
                    self.request_timeout
                )))
            }
        }
    }

    async fn exchange(ipc: &mut IpcState, payload: &Value, request_id: u64) -> Result<MpvReply> {
        let stream = ipc
            .stream
            .as_mut()
            .ok_or_else(|| Error::EngineFault("mpv IPC not connected".into()))?;

        let mut line = serde_json::to_string(payload)?;
        line.push('\n');
        stream
            .write_all(line.as_bytes())
            .await
            .map_err(|e| Error::EngineFault(format!("mpv IPC write failed: {}", e)))?;
        stream
            .flush()
            .await
            .map_err(|e| Error::EngineFault(format!("mpv IPC flush failed: {}", e)))?;

        let mut buf = String::new();
        loop {
            buf.clear();
            let n = stream
                .read_line(&mut buf)
                .await
                .map_err(|e| Error::EngineFault(format!("mpv IPC read failed: {}", e)))?;
            if n == 0 {
                return Err(Error::EngineFault("mpv closed the IPC socket".into()));
            }

            let value: Value = match serde_json::from_str(buf.trim_end()) {
                Ok(value) => value,
                Err(e) => {
                    warn!(error = %e, line = %buf.trim_end(), "unparsable mpv IPC line");
                    continue;
                }
            };

            // Property-change and playback events share the stream.
            if value.get("event").is_some() {
                continue;
            }
            if value.get("request_id").and_then(Value::as_u64) != Some(request_id) {
                continue;
            }

            let error = value
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("no error field")
                .to_string();
            let data = value.get("data").cloned().unwrap_or(Value::Null);
            return Ok(MpvReply { error, data });
        }
    }

    /// Run a command where only success matters.
    async fn command(&self, args: Vec<Value>) -> Result<()> {
        let reply = self.request(args.clone()).await?;
        if reply.error == "success" {
            Ok(())
        } else {
            Err(Error::EngineFault(format!(
                "mpv rejected {:?}: {}",
                args, reply.error
            )))
        }
    }

    async fn set_property(&self, name: &str, value: Value) -> Result<()> {
        self.command(vec![json!("set_property"), json!(name), value])
            .await
    }

    /// `Ok(None)` when the property is currently unavailable (nothing
    /// loaded yet), which is routine rather than a fault.
    async fn get_property(&self, name: &str) -> Result<Option<Value>> {
        let reply = self
            .request(vec![json!("get_property"), json!(name)])
            .await?;
        match reply.error.as_str() {
            "success" => Ok(Some(reply.data)),
            "property unavailable" => Ok(None),
            other => Err(Error::EngineFault(format!(
                "mpv get_property {} failed: {}",
                name, other
            ))),
        }
    }
}

struct MpvReply {
    error: String,
    data: Value,
}

#[async_trait]
impl AudioEngine for MpvEngine {
    async fn load(&self, stream_ref: &str) -> Result<()> {
        self.command(vec![json!("loadfile"), json!(stream_ref), json!("replace")])
            .await?;
        self.set_property("pause", json!(false)).await
    }

    async fn play(&self) -> Result<()> {
        self.set_property("pause", json!(false)).await
    }

    async fn pause(&self) -> Result<()> {
        self.set_property("pause", json!(true)).await
    }

    async fn seek(&self, position_ms: u64) -> Result<()> {
        let seconds = position_ms as f64 / 1000.0;
        self.command(vec![json!("seek"), json!(seconds), json!("absolute")])
            .await
    }

    async fn set_volume(&self, volume: u8) -> Result<()> {
        // Canonical 0–100 maps directly onto mpv's volume property.
        self.set_property("volume", json!(volume as f64)).await
    }

    async fn query_position(&self) -> Result<EngineStatus> {
        let position = self.get_property("playback-time").await?;
        let duration = self.get_property("duration").await?;
        let paused = self.get_property("pause").await?;
        let idle = self.get_property("idle-active").await?;
        let eof = self.get_property("eof-reached").await?;

        Ok(assemble_status(position, duration, paused, idle, eof))
    }

    async fn stop(&self) -> Result<()> {
        self.command(vec![json!("stop")]).await
    }

    async fn shutdown(&self) -> Result<()> {
        let mut ipc = self.ipc.lock().await;
        if let Some(stream) = ipc.stream.as_mut() {
            // Polite quit first; kill below covers the rest.
            let _ = stream.write_all(b"{\"command\":[\"quit\"]}\n").await;
            let _ = stream.flush().await;
        }
        ipc.stream = None;
        if let Some(mut child) = ipc.child.take() {
            let _ = child.kill().await;
            info!("mpv terminated");
        }
        Ok(())
    }
}

/// Fold the raw property values into an [`EngineStatus`]. Missing
/// properties mean nothing is loaded.
fn assemble_status(
    position: Option<Value>,
    duration: Option<Value>,
    paused: Option<Value>,
    idle: Option<Value>,
    eof: Option<Value>,
) -> EngineStatus {
    let position_ms = secs_value_to_ms(position);
    let duration_ms = secs_value_to_ms(duration);
    let paused = paused.as_ref().and_then(Value::as_bool).unwrap_or(true);
    let idle = idle.as_ref().and_then(Value::as_bool).unwrap_or(true);
    let reached_end = eof.as_ref().and_then(Value::as_bool).unwrap_or(false);

    EngineStatus {
        position_ms,
        duration_ms,
        playing: !paused && !idle,
        reached_end,
        idle,
    }
}

fn secs_value_to_ms(value: Option<Value>) -> u64 {
    value
        .as_ref()
        .and_then(Value::as_f64)
        .filter(|secs| secs.is_finite() && *secs > 0.0)
        .map(|secs| (secs * 1000.0).round() as u64)
        .unwrap_or(0)
}
