//! Background loops owned by the daemon: the periodic engine poll and
//! the download outcome merge.

use super::PlayerController;
use crate::download::DownloadOutcome;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Periodically reconcile controller state with the engine. This is the
/// only place end-of-stream advances the queue; status reads stay free
/// of side effects because this loop carries them all.
pub fn spawn_poll_task(
    controller: Arc<PlayerController>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(period_ms = period.as_millis() as u64, "engine poll started");
        let mut timer = tokio::time::interval(period);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            timer.tick().await;
            controller.poll_tick().await;
        }
    })
}

/// Drain download outcomes into the controller. Ends when the sender
/// side (the download manager) is dropped.
pub fn spawn_merge_task(
    controller: Arc<PlayerController>,
    mut outcomes: mpsc::UnboundedReceiver<DownloadOutcome>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(outcome) = outcomes.recv().await {
            debug!(job_id = %outcome.job_id, "download outcome received");
            controller.merge_download(outcome).await;
        }
        info!("download merge loop ended");
    })
}
