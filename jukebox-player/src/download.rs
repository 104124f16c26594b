//! Background download/transcode jobs
//!
//! A job fetches the best audio for a remote track and converts it to mp3
//! (192 kbps) in the downloads directory, mirroring the track's remote
//! identity with a durable local copy. Jobs run detached from the
//! controller's critical section; their outcomes are funneled back through
//! an unbounded channel that the controller drains, so a finished job for
//! a track that already left the queue is simply ignored there.

use jukebox_common::{Error, EventBus, PlayerEvent, Result, Track};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::process::Command;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Result of one finished job, delivered to the controller's merge loop.
#[derive(Debug)]
pub struct DownloadOutcome {
    pub job_id: Uuid,
    pub track_identity: String,
    pub result: Result<PathBuf>,
}

struct DownloadJob {
    track_identity: String,
    handle: JoinHandle<()>,
}

pub struct DownloadManager {
    binary: String,
    downloads_dir: PathBuf,
    events: EventBus,
    outcome_tx: mpsc::UnboundedSender<DownloadOutcome>,
    jobs: Arc<Mutex<HashMap<Uuid, DownloadJob>>>,
}

impl DownloadManager {
    pub fn new(
        binary: String,
        downloads_dir: PathBuf,
        events: EventBus,
        outcome_tx: mpsc::UnboundedSender<DownloadOutcome>,
    ) -> Self {
        Self {
            binary,
            downloads_dir,
            events,
            outcome_tx,
            jobs: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Launch a job for the track's remote identity. A second request for
    /// an identity that is already in flight returns the running job's id.
    pub async fn start(&self, track: &Track) -> Uuid {
        let identity = track.identity().to_string();

        // The lock is held across spawn+insert so the job's self-removal
        // (which takes the same lock) cannot run before the insert.
        let mut jobs = self.jobs.lock().await;
        if let Some((existing, _)) = jobs
            .iter()
            .find(|(_, job)| job.track_identity == identity)
        {
            debug!(url = %identity, job_id = %existing, "download already in flight");
            return *existing;
        }

        let job_id = Uuid::new_v4();
        self.events.emit(PlayerEvent::DownloadStarted {
            job_id,
            url: identity.clone(),
            timestamp: chrono::Utc::now(),
        });
        info!(job_id = %job_id, url = %identity, "download job started");

        let binary = self.binary.clone();
        let downloads_dir = self.downloads_dir.clone();
        let events = self.events.clone();
        let outcome_tx = self.outcome_tx.clone();
        let jobs_map = Arc::clone(&self.jobs);
        let job_identity = identity.clone();

        let handle = tokio::spawn(async move {
            let result = run_download(&binary, &downloads_dir, &job_identity).await;

            match &result {
                Ok(path) => {
                    info!(job_id = %job_id, path = %path.display(), "download job finished");
                    events.emit(PlayerEvent::DownloadCompleted {
                        job_id,
                        url: job_identity.clone(),
                        local_path: path.display().to_string(),
                        timestamp: chrono::Utc::now(),
                    });
                }
                Err(err) => {
                    warn!(job_id = %job_id, url = %job_identity, error = %err, "download job failed");
                    events.emit(PlayerEvent::DownloadFailed {
                        job_id,
                        url: job_identity.clone(),
                        reason: err.to_string(),
                        timestamp: chrono::Utc::now(),
                    });
                }
            }

            // Delivery is unconditional; the drain side drops outcomes
            // whose track no longer exists anywhere.
            let _ = outcome_tx.send(DownloadOutcome {
                job_id,
                track_identity: job_identity,
                result,
            });

            jobs_map.lock().await.remove(&job_id);
        });

        jobs.insert(
            job_id,
            DownloadJob {
                track_identity: identity,
                handle,
            },
        );
        job_id
    }

    /// Best-effort cancellation of every in-flight job for the given track
    /// identity, used when the track leaves the queue. Aborting the task
    /// drops the child handle, which kills the external process
    /// (`kill_on_drop`).
    pub async fn cancel_for(&self, identity: &str) -> usize {
        let mut jobs = self.jobs.lock().await;
        let matching: Vec<Uuid> = jobs
            .iter()
            .filter(|(_, job)| job.track_identity == identity)
            .map(|(id, _)| *id)
            .collect();
        for id in &matching {
            if let Some(job) = jobs.remove(id) {
                job.handle.abort();
                debug!(job_id = %id, url = %identity, "download job cancelled");
            }
        }
        matching.len()
    }

    pub async fn active_count(&self) -> usize {
        self.jobs.lock().await.len()
    }

    /// Abort everything that is still running. Called on shutdown.
    pub async fn abort_all(&self) {
        let mut jobs = self.jobs.lock().await;
        for (id, job) in jobs.drain() {
            job.handle.abort();
            debug!(job_id = %id, "download job aborted at shutdown");
        }
    }
}

/// Run one download+transcode and return the path of the produced file.
///
/// `--print after_move:filepath` (with `--no-simulate`) makes the tool
/// report the final post-conversion path on stdout, so no directory
/// scanning is needed afterwards.
async fn run_download(binary: &str, downloads_dir: &Path, url: &str) -> Result<PathBuf> {
    let template = downloads_dir.join("%(extractor)s_%(id)s.%(ext)s");

    let output = Command::new(binary)
        .args([
            "--no-warnings",
            "--no-playlist",
            "--format",
            "bestaudio/best",
            "-x",
            "--audio-format",
            "mp3",
            "--audio-quality",
            "192K",
            "--embed-thumbnail",
            "--no-simulate",
            "--print",
            "after_move:filepath",
            "-o",
        ])
        .arg(&template)
        .arg(url)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::DownloadFailed(format!("{} not found in PATH", binary))
            } else {
                Error::DownloadFailed(format!("failed to run {}: {}", binary, e))
            }
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::DownloadFailed(format!(
            "download failed for {}: {}",
            url,
            stderr.trim().lines().last().unwrap_or("unknown error")
        )));
    }

    let path = parse_final_path(&output.stdout)?;
    tokio::fs::metadata(&path)
        .await
        .map_err(|e| Error::DownloadFailed(format!("downloaded file missing at {}: {}", path.display(), e)))?;
    Ok(path)
}

fn parse_final_path(stdout: &[u8]) -> Result<PathBuf> {
    let text = String::from_utf8_lossy(stdout);
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .next_back()
        .map(PathBuf::from)
        .ok_or_else(|| Error::DownloadFailed("tool reported no output file".to_string()))
}
