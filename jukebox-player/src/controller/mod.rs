//! Player controller
//!
//! Single owner of playback state. Every client command, the periodic
//! engine poll and the download merge loop all funnel through one async
//! mutex over [`ControllerInner`], so no two mutations ever interleave.
//! The engine is the source of truth for position/duration/playing; the
//! controller is the source of truth for queue position and volume, and
//! the two never overwrite each other's fields.
//!
//! Error policy: validation failures (`InvalidIndex`, `EmptyQueue`,
//! `UnsupportedFormat`) are returned to the caller with state untouched.
//! Transient failures (engine trouble, resolution, downloads) are absorbed
//! into the `last_error` snapshot field and the state machine moves on.
//!
//! Slow work never runs under the lock: provider resolution happens
//! between two lock acquisitions, and a start epoch detects whether the
//! world moved while the lock was released.

mod queue;
pub mod poll;

pub use queue::Queue;

use crate::download::{DownloadManager, DownloadOutcome};
use crate::engine::AudioEngine;
use crate::resolver::ImportPipeline;
use crate::store::{ListName, ListStore};
use jukebox_common::track::UNKNOWN_TITLE;
use jukebox_common::{
    Error, EventBus, LastError, PlaybackState, PlayerEvent, Result, StatusSnapshot, Track,
    TrackProjection,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// `previous()` restarts the current track instead of stepping back once
/// playback has run at least this long.
const RESTART_THRESHOLD_MS: u64 = 3000;

/// Consecutive failed engine polls before the controller gives the track
/// up for lost.
const ENGINE_FAULT_LIMIT: u32 = 3;

/// Runtime knobs the controller needs, cut down from the full daemon
/// configuration.
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub default_volume: u8,
    pub loop_at_end: bool,
    pub history_max_entries: usize,
    pub history_dwell_ms: u64,
}

impl From<&crate::config::Config> for ControllerSettings {
    fn from(config: &crate::config::Config) -> Self {
        Self {
            default_volume: config.playback.default_volume,
            loop_at_end: config.playback.loop_at_end,
            history_max_entries: config.history.max_entries,
            history_dwell_ms: config.history.dwell_ms,
        }
    }
}

/// The three persisted lists plus whatever went wrong loading them.
pub struct LoadedLists {
    pub queue: Vec<Track>,
    pub history: Vec<Track>,
    pub favorites: Vec<Track>,
    pub load_error: Option<LastError>,
}

impl LoadedLists {
    /// Load all three lists, absorbing corrupt files into empty lists plus
    /// a `last_error` for the first snapshot. The store has already set
    /// the corrupt file aside for inspection.
    pub async fn load(store: &ListStore) -> Self {
        let mut load_error = None;
        let mut load_one = |name: ListName, result: Result<Vec<Track>>| match result {
            Ok(tracks) => tracks,
            Err(err) => {
                warn!(list = %name, error = %err, "list failed to load, starting empty");
                load_error = Some(LastError {
                    kind: err.kind(),
                    message: err.to_string(),
                });
                Vec::new()
            }
        };

        let queue = load_one(ListName::Queue, store.load(ListName::Queue).await);
        let history = load_one(ListName::History, store.load(ListName::History).await);
        let favorites = load_one(ListName::Favorites, store.load(ListName::Favorites).await);

        info!(
            queue = queue.len(),
            history = history.len(),
            favorites = favorites.len(),
            "persisted lists loaded"
        );

        Self {
            queue,
            history,
            favorites,
            load_error,
        }
    }
}

/// A track start waiting out the dwell time before it counts as history.
struct PendingHistory {
    track: Track,
    started: Instant,
}

struct ControllerInner {
    queue: Queue,
    /// Most-recent-first.
    history: Vec<Track>,
    /// Addition order, identity-deduplicated.
    favorites: Vec<Track>,
    state: PlaybackState,
    /// Last playing/paused report from the engine.
    engine_playing: bool,
    current_time_ms: u64,
    duration_ms: u64,
    volume: u8,
    last_error: Option<LastError>,
    pending_history: Option<PendingHistory>,
    fault_streak: u32,
    /// Bumped on every start/stop; detects that the world changed while
    /// the lock was released for resolution.
    start_epoch: u64,
}

pub struct PlayerController {
    inner: Mutex<ControllerInner>,
    engine: Arc<dyn AudioEngine>,
    pipeline: ImportPipeline,
    store: ListStore,
    downloads: Arc<DownloadManager>,
    events: EventBus,
    settings: ControllerSettings,
}

impl PlayerController {
    pub fn new(
        engine: Arc<dyn AudioEngine>,
        pipeline: ImportPipeline,
        store: ListStore,
        downloads: Arc<DownloadManager>,
        events: EventBus,
        settings: ControllerSettings,
        lists: LoadedLists,
    ) -> Self {
        Self {
            inner: Mutex::new(ControllerInner {
                queue: Queue::from_tracks(lists.queue),
                history: lists.history,
                favorites: lists.favorites,
                state: PlaybackState::Idle,
                engine_playing: false,
                current_time_ms: 0,
                duration_ms: 0,
                volume: settings.default_volume.min(100),
                last_error: lists.load_error,
                pending_history: None,
                fault_streak: 0,
                start_epoch: 0,
            }),
            engine,
            pipeline,
            store,
            downloads,
            events,
            settings,
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    /// Start playback. With an index: that slot (rejecting out-of-range).
    /// Without: resume when paused, no-op when already playing, otherwise
    /// start at the front of a non-empty queue.
    pub async fn play(&self, index: Option<usize>) -> Result<StatusSnapshot> {
        let target = {
            let mut inner = self.inner.lock().await;
            match index {
                Some(requested) => {
                    if requested >= inner.queue.len() {
                        return Err(Error::InvalidIndex {
                            index: requested,
                            len: inner.queue.len(),
                        });
                    }
                    // Same slot while paused means resume, not reload.
                    if inner.queue.current_index() == Some(requested)
                        && inner.state == PlaybackState::Paused
                    {
                        self.resume_locked(&mut inner).await;
                        self.refresh_from_engine(&mut inner).await;
                        return Ok(self.snapshot(&inner));
                    }
                    requested
                }
                None => {
                    if inner.queue.current_track().is_some() {
                        if inner.state == PlaybackState::Paused {
                            self.resume_locked(&mut inner).await;
                        }
                        self.refresh_from_engine(&mut inner).await;
                        return Ok(self.snapshot(&inner));
                    }
                    if inner.queue.is_empty() {
                        return Err(Error::EmptyQueue);
                    }
                    0
                }
            }
        };

        Ok(self.start_with_resolution(target).await)
    }

    /// Idempotent pause.
    pub async fn pause(&self) -> Result<StatusSnapshot> {
        let mut inner = self.inner.lock().await;
        if inner.state.is_playing() {
            match self.engine.pause().await {
                Ok(()) => {
                    inner.engine_playing = false;
                    self.set_state(&mut inner, PlaybackState::Paused);
                }
                Err(err) => self.engine_fault(&mut inner, err),
            }
        }
        self.refresh_from_engine(&mut inner).await;
        Ok(self.snapshot(&inner))
    }

    /// Step forward. At the last slot playback stops (or wraps to the
    /// front when the loop flag is set). Silent no-op on an empty queue.
    pub async fn next(&self) -> Result<StatusSnapshot> {
        let target = {
            let mut inner = self.inner.lock().await;
            if inner.queue.is_empty() {
                self.refresh_from_engine(&mut inner).await;
                return Ok(self.snapshot(&inner));
            }
            match inner.queue.next_index(self.settings.loop_at_end) {
                Some(index) => index,
                None => {
                    self.stop_locked(&mut inner).await;
                    return Ok(self.snapshot(&inner));
                }
            }
        };

        Ok(self.start_with_resolution(target).await)
    }

    /// Step backward, with the restart rule: once the current track has
    /// played past the threshold, previous restarts it from zero instead
    /// of moving the cursor. Below the threshold the cursor steps back,
    /// clamped at the front.
    pub async fn previous(&self) -> Result<StatusSnapshot> {
        let target = {
            let mut inner = self.inner.lock().await;
            if inner.queue.is_empty() {
                self.refresh_from_engine(&mut inner).await;
                return Ok(self.snapshot(&inner));
            }
            if inner.queue.current_index().is_some()
                && inner.current_time_ms >= RESTART_THRESHOLD_MS
            {
                match self.engine.seek(0).await {
                    Ok(()) => inner.current_time_ms = 0,
                    Err(err) => self.engine_fault(&mut inner, err),
                }
                self.refresh_from_engine(&mut inner).await;
                return Ok(self.snapshot(&inner));
            }
            match inner.queue.previous_index() {
                Some(index) => index,
                None => {
                    self.refresh_from_engine(&mut inner).await;
                    return Ok(self.snapshot(&inner));
                }
            }
        };

        Ok(self.start_with_resolution(target).await)
    }

    /// Clamp into the canonical 0–100 range and forward to the engine.
    /// Never fails: out-of-range input is clamped, engine trouble is
    /// absorbed.
    pub async fn set_volume(&self, level: i64) -> Result<StatusSnapshot> {
        let clamped = level.clamp(0, 100) as u8;
        let mut inner = self.inner.lock().await;
        inner.volume = clamped;
        if inner.queue.current_track().is_some() {
            if let Err(err) = self.engine.set_volume(clamped).await {
                self.engine_fault(&mut inner, err);
            }
        }
        self.events.emit(PlayerEvent::VolumeChanged {
            volume: clamped,
            timestamp: chrono::Utc::now(),
        });
        self.refresh_from_engine(&mut inner).await;
        Ok(self.snapshot(&inner))
    }

    /// Append an already-materialized track. Playback and cursor stay put.
    pub async fn enqueue_track(&self, track: Track) -> Result<StatusSnapshot> {
        let mut inner = self.inner.lock().await;
        inner.queue.push(track);
        self.persist(&mut inner, ListName::Queue).await;
        self.emit_queue_changed(&inner);
        self.refresh_from_engine(&mut inner).await;
        Ok(self.snapshot(&inner))
    }

    /// Resolve a raw reference (URL or local path) through the pipeline
    /// and append it. With `download` set, a background transcode job
    /// starts for remote tracks. Resolution runs before any state is
    /// touched, so failures leave the queue as it was.
    pub async fn enqueue_reference(&self, reference: &str, download: bool) -> Result<StatusSnapshot> {
        let track = self.pipeline.resolve_reference(reference).await?;
        if download && !track.is_local && track.local_copy.is_none() {
            self.downloads.start(&track).await;
        }
        self.enqueue_track(track).await
    }

    /// Remove a queue slot. Removing the playing slot stops it and starts
    /// whatever now occupies that position (clamped to the last slot).
    pub async fn remove_track(&self, index: usize) -> Result<StatusSnapshot> {
        let successor = {
            let mut inner = self.inner.lock().await;
            let was_current = inner.queue.current_index() == Some(index);
            let removed = inner.queue.remove(index)?;

            // A download for a track no list still references is wasted
            // work; cancellation is best-effort.
            let identity = removed.identity().to_string();
            if inner.queue.find_by_identity(&identity).is_none()
                && !inner.favorites.iter().any(|t| t.identity() == identity)
            {
                self.downloads.cancel_for(&identity).await;
            }

            self.persist(&mut inner, ListName::Queue).await;
            self.emit_queue_changed(&inner);

            if was_current {
                self.stop_locked(&mut inner).await;
                if inner.queue.is_empty() {
                    None
                } else {
                    Some(index.min(inner.queue.len() - 1))
                }
            } else {
                self.refresh_from_engine(&mut inner).await;
                return Ok(self.snapshot(&inner));
            }
        };

        match successor {
            Some(index) => Ok(self.start_with_resolution(index).await),
            None => {
                let inner = self.inner.lock().await;
                Ok(self.snapshot(&inner))
            }
        }
    }

    /// Reorder the queue; the cursor keeps following the same track.
    pub async fn move_track(&self, from: usize, to: usize) -> Result<StatusSnapshot> {
        let mut inner = self.inner.lock().await;
        inner.queue.move_slot(from, to)?;
        self.persist(&mut inner, ListName::Queue).await;
        self.emit_queue_changed(&inner);
        self.refresh_from_engine(&mut inner).await;
        Ok(self.snapshot(&inner))
    }

    /// Drop every queue slot and stop playback.
    pub async fn clear_queue(&self) -> Result<StatusSnapshot> {
        let mut inner = self.inner.lock().await;
        if inner.queue.current_index().is_some() {
            self.stop_locked(&mut inner).await;
        }
        let orphaned: Vec<String> = inner
            .queue
            .tracks()
            .iter()
            .map(|t| t.identity().to_string())
            .filter(|id| !inner.favorites.iter().any(|f| f.identity() == id.as_str()))
            .collect();
        for identity in &orphaned {
            self.downloads.cancel_for(identity).await;
        }
        inner.queue.clear();
        self.persist(&mut inner, ListName::Queue).await;
        self.emit_queue_changed(&inner);
        Ok(self.snapshot(&inner))
    }

    /// Copy a history entry into a fresh queue slot.
    pub async fn enqueue_from_history(&self, index: usize) -> Result<StatusSnapshot> {
        self.promote(index, ListName::History).await
    }

    /// Copy a favorites entry into a fresh queue slot.
    pub async fn enqueue_from_favorites(&self, index: usize) -> Result<StatusSnapshot> {
        self.promote(index, ListName::Favorites).await
    }

    async fn promote(&self, index: usize, source: ListName) -> Result<StatusSnapshot> {
        let mut inner = self.inner.lock().await;
        let list = match source {
            ListName::History => &inner.history,
            ListName::Favorites => &inner.favorites,
            ListName::Queue => inner.queue.tracks(),
        };
        let track = match list.get(index) {
            Some(track) => track.clone(),
            None => {
                return Err(Error::InvalidIndex {
                    index,
                    len: list.len(),
                })
            }
        };
        inner.queue.push(track);
        self.persist(&mut inner, ListName::Queue).await;
        self.emit_queue_changed(&inner);
        self.refresh_from_engine(&mut inner).await;
        Ok(self.snapshot(&inner))
    }

    /// Add a track to favorites: by queue index, or the current track
    /// when no index is given. Adding an existing favorite is a no-op.
    pub async fn add_favorite(&self, queue_index: Option<usize>) -> Result<StatusSnapshot> {
        let mut inner = self.inner.lock().await;
        let track = match queue_index {
            Some(index) => match inner.queue.get(index) {
                Some(track) => track.clone(),
                None => {
                    return Err(Error::InvalidIndex {
                        index,
                        len: inner.queue.len(),
                    })
                }
            },
            None => match inner.queue.current_track() {
                Some(track) => track.clone(),
                None => return Err(Error::EmptyQueue),
            },
        };

        let already = inner
            .favorites
            .iter()
            .any(|t| t.identity() == track.identity());
        if !already {
            inner.favorites.push(track);
            self.persist(&mut inner, ListName::Favorites).await;
        }
        self.refresh_from_engine(&mut inner).await;
        Ok(self.snapshot(&inner))
    }

    /// Remove a favorites entry by its list position.
    pub async fn remove_favorite(&self, index: usize) -> Result<StatusSnapshot> {
        let mut inner = self.inner.lock().await;
        if index >= inner.favorites.len() {
            return Err(Error::InvalidIndex {
                index,
                len: inner.favorites.len(),
            });
        }
        inner.favorites.remove(index);
        self.persist(&mut inner, ListName::Favorites).await;
        self.refresh_from_engine(&mut inner).await;
        Ok(self.snapshot(&inner))
    }

    /// Provider search. Pure lookup, no state involved.
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<TrackProjection>> {
        let tracks = self.pipeline.search(query, limit).await?;
        Ok(tracks.iter().map(Track::projection).collect())
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// The snapshot every command also returns. Refreshes cached engine
    /// values but never transitions state: polling has no side effects.
    pub async fn status(&self) -> StatusSnapshot {
        let mut inner = self.inner.lock().await;
        self.refresh_from_engine(&mut inner).await;
        self.snapshot(&inner)
    }

    pub async fn queue_list(&self) -> Vec<TrackProjection> {
        let inner = self.inner.lock().await;
        inner.queue.tracks().iter().map(Track::projection).collect()
    }

    pub async fn history_list(&self) -> Vec<TrackProjection> {
        let inner = self.inner.lock().await;
        inner.history.iter().map(Track::projection).collect()
    }

    pub async fn favorites_list(&self) -> Vec<TrackProjection> {
        let inner = self.inner.lock().await;
        inner.favorites.iter().map(Track::projection).collect()
    }

    // ------------------------------------------------------------------
    // Background entry points
    // ------------------------------------------------------------------

    /// One tick of the engine poll: refresh engine truth, advance on
    /// end-of-stream, commit dwelled history, notice a lost engine.
    pub async fn poll_tick(&self) {
        let advance = {
            let mut inner = self.inner.lock().await;

            if self.commit_history_if_due(&mut inner) {
                self.persist(&mut inner, ListName::History).await;
            }

            if inner.queue.current_track().is_none() {
                return;
            }

            match self.engine.query_position().await {
                Ok(status) if status.idle => {
                    // Respawned engines come back empty; the track we
                    // believed was loaded is gone.
                    self.engine_fault(
                        &mut inner,
                        Error::EngineFault("engine lost the loaded track".to_string()),
                    );
                    false
                }
                Ok(status) => {
                    inner.fault_streak = 0;
                    inner.current_time_ms = status.position_ms;
                    if status.duration_ms > 0 {
                        inner.duration_ms = status.duration_ms;
                    }
                    inner.engine_playing = status.playing;

                    if inner.state == PlaybackState::Loading && status.playing {
                        self.set_state(&mut inner, PlaybackState::Playing);
                    }

                    if status.reached_end && inner.state == PlaybackState::Playing {
                        self.set_state(&mut inner, PlaybackState::Ended);
                        if let Some(track) = inner.queue.current_track() {
                            let url = track.identity().to_string();
                            self.events.emit(PlayerEvent::TrackCompleted {
                                url,
                                timestamp: chrono::Utc::now(),
                            });
                        }
                        true
                    } else {
                        false
                    }
                }
                Err(err) => {
                    inner.fault_streak += 1;
                    if inner.fault_streak >= ENGINE_FAULT_LIMIT {
                        self.engine_fault(&mut inner, err);
                    } else {
                        debug!(
                            streak = inner.fault_streak,
                            error = %err,
                            "engine poll failed, keeping last-known values"
                        );
                        self.record_error(&mut inner, &err);
                    }
                    false
                }
            }
        };

        if advance {
            self.advance_after_end().await;
        }
    }

    /// Fold a finished download back into every list that still holds the
    /// track. Outcomes for tracks nothing references any more are dropped.
    pub async fn merge_download(&self, outcome: DownloadOutcome) {
        let mut inner = self.inner.lock().await;
        match outcome.result {
            Ok(path) => {
                let local_path = path.display().to_string();
                let identity = outcome.track_identity.as_str();

                let mut touched_queue = false;
                for track in inner.queue.tracks_mut() {
                    if track.identity() == identity {
                        track.local_copy = Some(local_path.clone());
                        touched_queue = true;
                    }
                }
                let mut touched_favorites = false;
                for track in inner.favorites.iter_mut() {
                    if track.identity() == identity {
                        track.local_copy = Some(local_path.clone());
                        touched_favorites = true;
                    }
                }
                let mut touched_history = false;
                for track in inner.history.iter_mut() {
                    if track.identity() == identity {
                        track.local_copy = Some(local_path.clone());
                        touched_history = true;
                    }
                }

                if touched_queue {
                    self.persist(&mut inner, ListName::Queue).await;
                }
                if touched_favorites {
                    self.persist(&mut inner, ListName::Favorites).await;
                }
                if touched_history {
                    self.persist(&mut inner, ListName::History).await;
                }
                info!(
                    url = identity,
                    path = %local_path,
                    applied = touched_queue || touched_favorites || touched_history,
                    "download merged"
                );
            }
            Err(err) => self.record_error(&mut inner, &err),
        }
    }

    /// Flush state and take the engine down. Called once at shutdown.
    pub async fn shutdown(&self) {
        let mut inner = self.inner.lock().await;
        if self.commit_history_if_due(&mut inner) {
            debug!("pending history committed at shutdown");
        }
        self.persist(&mut inner, ListName::Queue).await;
        self.persist(&mut inner, ListName::History).await;
        self.persist(&mut inner, ListName::Favorites).await;
        self.downloads.abort_all().await;
        if let Err(err) = self.engine.shutdown().await {
            warn!(error = %err, "engine shutdown failed");
        }
        info!("controller state saved");
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Start the given slot, resolving its stream reference first when
    /// needed. Resolution runs with the lock released; afterwards the
    /// start epoch and the track identity decide whether the start is
    /// still wanted.
    async fn start_with_resolution(&self, index: usize) -> StatusSnapshot {
        let mut inner = self.inner.lock().await;

        let pending = match inner.queue.get(index) {
            Some(track) if track.needs_resolution() => {
                Some((track.identity().to_string(), inner.start_epoch))
            }
            Some(_) => None,
            None => {
                // The queue shrank since this slot was chosen.
                self.refresh_from_engine(&mut inner).await;
                return self.snapshot(&inner);
            }
        };

        match pending {
            Some((reference, epoch)) => {
                drop(inner);
                let resolved = self.pipeline.resolver().resolve(&reference).await;
                inner = self.inner.lock().await;

                if inner.start_epoch != epoch {
                    // Someone started or stopped playback while we were
                    // resolving; their intent is newer than ours.
                    debug!(url = %reference, "discarding stale start after resolution");
                    self.refresh_from_engine(&mut inner).await;
                    return self.snapshot(&inner);
                }

                match resolved {
                    Ok(fresh) => {
                        let slot = if inner
                            .queue
                            .get(index)
                            .is_some_and(|t| t.identity() == reference)
                        {
                            Some(index)
                        } else {
                            inner.queue.find_by_identity(&reference)
                        };
                        match slot {
                            Some(slot) => {
                                if let Some(track) = inner.queue.tracks_mut().get_mut(slot) {
                                    apply_resolution(track, fresh);
                                }
                                self.play_slot(&mut inner, slot).await;
                            }
                            None => {
                                debug!(url = %reference, "track left the queue during resolution");
                            }
                        }
                    }
                    Err(err) => self.record_error(&mut inner, &err),
                }
            }
            None => self.play_slot(&mut inner, index).await,
        }

        self.refresh_from_engine(&mut inner).await;
        self.snapshot(&inner)
    }

    /// Load-and-play a validated slot, absorbing failures into state.
    async fn play_slot(&self, inner: &mut ControllerInner, index: usize) {
        inner.start_epoch += 1;
        if let Err(err) = self.start_track(inner, index).await {
            match &err {
                Error::ResolutionFailed(_) | Error::UnsupportedFormat(_) => {
                    self.record_error(inner, &err);
                    inner.queue.deselect();
                    inner.engine_playing = false;
                    inner.current_time_ms = 0;
                    inner.duration_ms = 0;
                    self.set_state(inner, PlaybackState::Idle);
                }
                _ => self.engine_fault(inner, err),
            }
        }
    }

    async fn start_track(&self, inner: &mut ControllerInner, index: usize) -> Result<()> {
        inner.queue.select(index)?;
        let track = match inner.queue.current_track() {
            Some(track) => track.clone(),
            None => return Err(Error::EmptyQueue),
        };
        let playable = match track.playable_ref() {
            Some(reference) => reference.to_string(),
            None => {
                return Err(Error::ResolutionFailed(format!(
                    "no playable reference for {}",
                    track.identity()
                )))
            }
        };

        self.set_state(inner, PlaybackState::Loading);
        self.engine.load(&playable).await?;
        // Engine-side volume resets on respawn, so re-assert it per load.
        if let Err(err) = self.engine.set_volume(inner.volume).await {
            warn!(error = %err, "could not re-assert volume after load");
        }

        inner.engine_playing = true;
        inner.current_time_ms = 0;
        // Unknown until the engine reports the real value.
        inner.duration_ms = 0;
        inner.fault_streak = 0;
        // A successful start supersedes whatever went wrong before it.
        inner.last_error = None;
        self.set_state(inner, PlaybackState::Playing);

        self.events.emit(PlayerEvent::TrackStarted {
            url: track.identity().to_string(),
            title: track.title.clone(),
            queue_index: index,
            timestamp: chrono::Utc::now(),
        });
        info!(index, title = %track.title, "track started");

        // A restart of the same track keeps its original dwell clock.
        let same_track = inner
            .pending_history
            .as_ref()
            .is_some_and(|p| p.track.identity() == track.identity());
        if !same_track {
            if self.commit_history_if_due(inner) {
                self.persist(inner, ListName::History).await;
            }
            inner.pending_history = Some(PendingHistory {
                track,
                started: Instant::now(),
            });
        }

        Ok(())
    }

    /// End-of-stream advance: the implicit `next()` the state machine
    /// performs after the Ended transition.
    async fn advance_after_end(&self) {
        let target = {
            let mut inner = self.inner.lock().await;
            // A command that slipped in between the Ended transition and
            // this lock owns the player now; only poll sets Ended.
            if inner.state != PlaybackState::Ended {
                return;
            }
            match inner.queue.next_index(self.settings.loop_at_end) {
                Some(index) => Some(index),
                None => {
                    self.stop_locked(&mut inner).await;
                    None
                }
            }
        };
        if let Some(index) = target {
            self.start_with_resolution(index).await;
        }
    }

    async fn resume_locked(&self, inner: &mut ControllerInner) {
        match self.engine.play().await {
            Ok(()) => {
                inner.engine_playing = true;
                self.set_state(inner, PlaybackState::Playing);
            }
            Err(err) => self.engine_fault(inner, err),
        }
    }

    /// Unload the engine and return to Idle with a cleared cursor.
    async fn stop_locked(&self, inner: &mut ControllerInner) {
        inner.start_epoch += 1;
        if self.commit_history_if_due(inner) {
            self.persist(inner, ListName::History).await;
        }
        inner.pending_history = None;
        if let Err(err) = self.engine.stop().await {
            self.engine_fault(inner, err);
            return;
        }
        inner.queue.deselect();
        inner.engine_playing = false;
        inner.current_time_ms = 0;
        inner.duration_ms = 0;
        self.set_state(inner, PlaybackState::Idle);
    }

    /// Best-effort refresh of engine-owned snapshot fields. Never
    /// transitions state; a failed or empty query keeps last-known
    /// values, which is exactly what the polling contract wants.
    async fn refresh_from_engine(&self, inner: &mut ControllerInner) {
        if inner.queue.current_track().is_none() {
            return;
        }
        if let Ok(status) = self.engine.query_position().await {
            if !status.idle {
                inner.current_time_ms = status.position_ms;
                if status.duration_ms > 0 {
                    inner.duration_ms = status.duration_ms;
                }
                inner.engine_playing = status.playing;
            }
        }
    }

    fn snapshot(&self, inner: &ControllerInner) -> StatusSnapshot {
        let current_track = inner.queue.current_track().map(Track::projection);
        StatusSnapshot {
            // A playing flag without a track is unrepresentable here.
            is_playing: current_track.is_some() && inner.engine_playing,
            current_track,
            current_track_index: inner
                .queue
                .current_index()
                .map(|index| index as i64)
                .unwrap_or(-1),
            current_time_ms: inner.current_time_ms,
            duration_ms: inner.duration_ms,
            volume: inner.volume,
            last_error: inner.last_error.clone(),
        }
    }

    fn set_state(&self, inner: &mut ControllerInner, new_state: PlaybackState) {
        if inner.state != new_state {
            let old_state = inner.state;
            inner.state = new_state;
            debug!(?old_state, ?new_state, "playback state changed");
            self.events.emit(PlayerEvent::PlaybackStateChanged {
                old_state,
                new_state,
                timestamp: chrono::Utc::now(),
            });
        }
    }

    fn record_error(&self, inner: &mut ControllerInner, err: &Error) {
        warn!(error = %err, "absorbed into status");
        inner.last_error = Some(LastError {
            kind: err.kind(),
            message: err.to_string(),
        });
    }

    /// Unrecoverable engine trouble: log it, surface it, drop to Idle
    /// with no current track. The process keeps running.
    fn engine_fault(&self, inner: &mut ControllerInner, err: Error) {
        self.record_error(inner, &err);
        self.events.emit(PlayerEvent::EngineFault {
            message: err.to_string(),
            timestamp: chrono::Utc::now(),
        });
        inner.start_epoch += 1;
        inner.queue.deselect();
        inner.engine_playing = false;
        inner.current_time_ms = 0;
        inner.duration_ms = 0;
        inner.pending_history = None;
        inner.fault_streak = 0;
        self.set_state(inner, PlaybackState::Idle);
    }

    /// Move the pending history entry into the list once it has dwelled
    /// long enough. Returns whether the list changed.
    fn commit_history_if_due(&self, inner: &mut ControllerInner) -> bool {
        let dwell = Duration::from_millis(self.settings.history_dwell_ms);
        let due = match &inner.pending_history {
            Some(pending) => pending.started.elapsed() >= dwell,
            None => false,
        };
        if !due {
            return false;
        }
        if let Some(pending) = inner.pending_history.take() {
            push_history_front(
                &mut inner.history,
                pending.track,
                self.settings.history_max_entries,
            );
            return true;
        }
        false
    }

    async fn persist(&self, inner: &mut ControllerInner, name: ListName) {
        let result = match name {
            ListName::Queue => self.store.save(name, inner.queue.tracks()).await,
            ListName::History => self.store.save(name, &inner.history).await,
            ListName::Favorites => self.store.save(name, &inner.favorites).await,
        };
        if let Err(err) = result {
            self.record_error(inner, &err);
        }
    }

    fn emit_queue_changed(&self, inner: &ControllerInner) {
        self.events.emit(PlayerEvent::QueueChanged {
            queue_length: inner.queue.len(),
            timestamp: chrono::Utc::now(),
        });
    }
}

/// Insert at the front with identity dedupe, bounded by the retention
/// cap.
fn push_history_front(history: &mut Vec<Track>, track: Track, cap: usize) {
    if let Some(existing) = history
        .iter()
        .position(|t| t.identity() == track.identity())
    {
        history.remove(existing);
    }
    history.insert(0, track);
    history.truncate(cap.max(1));
}

/// Fold freshly resolved metadata into a queued track. Identity and
/// `is_local` never change; existing metadata wins over placeholders.
fn apply_resolution(track: &mut Track, fresh: Track) {
    track.stream_url = fresh.stream_url;
    if track.duration_sec == 0 {
        track.duration_sec = fresh.duration_sec;
    }
    if track.thumbnail_url.is_none() {
        track.thumbnail_url = fresh.thumbnail_url;
    }
    if track.title == UNKNOWN_TITLE && fresh.title != UNKNOWN_TITLE {
        track.title = fresh.title;
    }
}
