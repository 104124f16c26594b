//! Controller behavior tests
//!
//! Exercises the player state machine end to end against a scripted
//! engine and provider: start/pause/step semantics, queue edits under
//! playback, end-of-stream advance via the poll loop, absorbed errors,
//! history/favorites bookkeeping and persistence across restarts.

mod helpers;

use helpers::{local_track, remote_track, resolved_remote, TestPlayer};
use jukebox_common::{Error, ErrorKind, PlayerEvent, StatusSnapshot};
use jukebox_player::controller::LoadedLists;
use jukebox_player::download::DownloadOutcome;
use jukebox_player::store::{ListName, ListStore};
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

/// The one invariant every snapshot must hold: a playing flag needs a
/// track behind it.
fn assert_sane(snapshot: &StatusSnapshot) {
    if snapshot.is_playing {
        assert!(
            snapshot.current_track.is_some(),
            "is_playing without a current track: {:?}",
            snapshot
        );
    }
    assert!(snapshot.volume <= 100);
}

// =============================================================================
// Start / Resume / Pause
// =============================================================================

#[tokio::test]
async fn test_play_starts_requested_slot() {
    let player = TestPlayer::with_queue(vec![
        local_track("alpha"),
        local_track("beta"),
        local_track("gamma"),
    ])
    .await;

    let snapshot = player.controller.play(Some(1)).await.unwrap();

    assert_sane(&snapshot);
    assert!(snapshot.is_playing);
    assert_eq!(snapshot.current_track_index, 1);
    assert_eq!(snapshot.current_track.unwrap().title, "beta");
    assert_eq!(
        player.engine.script().loaded.as_deref(),
        Some("/music/beta.mp3")
    );
}

#[tokio::test]
async fn test_play_on_empty_queue_rejected_and_state_unchanged() {
    let player = TestPlayer::new().await;

    let err = player.controller.play(None).await.unwrap_err();
    assert!(matches!(err, Error::EmptyQueue));

    let snapshot = player.controller.status().await;
    assert_sane(&snapshot);
    assert!(!snapshot.is_playing);
    assert_eq!(snapshot.current_track_index, -1);
    assert!(snapshot.current_track.is_none());
    // The rejection is synchronous, not an absorbed failure.
    assert!(snapshot.last_error.is_none());
}

#[tokio::test]
async fn test_play_out_of_range_rejected() {
    let player = TestPlayer::with_queue(vec![local_track("only")]).await;

    let err = player.controller.play(Some(5)).await.unwrap_err();
    assert!(matches!(err, Error::InvalidIndex { index: 5, len: 1 }));

    let snapshot = player.controller.status().await;
    assert!(!snapshot.is_playing);
    assert_eq!(player.engine.script().load_count, 0);
}

#[tokio::test]
async fn test_play_without_index_starts_front_of_queue() {
    let player = TestPlayer::with_queue(vec![local_track("first"), local_track("second")]).await;

    let snapshot = player.controller.play(None).await.unwrap();

    assert_eq!(snapshot.current_track_index, 0);
    assert!(snapshot.is_playing);
}

#[tokio::test]
async fn test_pause_is_idempotent() {
    let player = TestPlayer::with_queue(vec![local_track("song")]).await;
    player.controller.play(None).await.unwrap();

    let paused = player.controller.pause().await.unwrap();
    assert!(!paused.is_playing);
    assert_eq!(paused.current_track_index, 0);

    // Pausing again changes nothing and does not error.
    let again = player.controller.pause().await.unwrap();
    assert!(!again.is_playing);
    assert_eq!(again.current_track_index, 0);

    // Pausing with nothing selected is also a no-op.
    let idle = TestPlayer::new().await;
    let snapshot = idle.controller.pause().await.unwrap();
    assert!(!snapshot.is_playing);
    assert_eq!(snapshot.current_track_index, -1);
}

#[tokio::test]
async fn test_play_resumes_pause_without_reload() {
    let player = TestPlayer::with_queue(vec![local_track("song")]).await;
    player.controller.play(None).await.unwrap();
    player.controller.pause().await.unwrap();

    let snapshot = player.controller.play(None).await.unwrap();

    assert!(snapshot.is_playing);
    assert_eq!(snapshot.current_track_index, 0);
    // Resume must not reload the media from scratch.
    assert_eq!(player.engine.script().load_count, 1);
}

#[tokio::test]
async fn test_play_same_slot_while_paused_resumes() {
    let player = TestPlayer::with_queue(vec![local_track("a"), local_track("b")]).await;
    player.controller.play(Some(1)).await.unwrap();
    player.controller.pause().await.unwrap();

    let snapshot = player.controller.play(Some(1)).await.unwrap();

    assert!(snapshot.is_playing);
    assert_eq!(snapshot.current_track_index, 1);
    assert_eq!(player.engine.script().load_count, 1);
}

#[tokio::test]
async fn test_play_while_already_playing_is_noop() {
    let player = TestPlayer::with_queue(vec![local_track("song")]).await;
    player.controller.play(None).await.unwrap();

    let snapshot = player.controller.play(None).await.unwrap();

    assert!(snapshot.is_playing);
    assert_eq!(player.engine.script().load_count, 1);
}

// =============================================================================
// Stepping: next / previous
// =============================================================================

#[tokio::test]
async fn test_next_twice_reaches_third_track() {
    let player = TestPlayer::with_queue(vec![
        local_track("a"),
        local_track("b"),
        local_track("c"),
    ])
    .await;
    player.controller.play(Some(0)).await.unwrap();

    player.controller.next().await.unwrap();
    let snapshot = player.controller.next().await.unwrap();

    assert_sane(&snapshot);
    assert!(snapshot.is_playing);
    assert_eq!(snapshot.current_track_index, 2);
    assert_eq!(snapshot.current_track.unwrap().title, "c");
}

#[tokio::test]
async fn test_next_at_last_slot_stops() {
    let player = TestPlayer::with_queue(vec![local_track("a"), local_track("b")]).await;
    player.controller.play(Some(1)).await.unwrap();

    let snapshot = player.controller.next().await.unwrap();

    assert_sane(&snapshot);
    assert!(!snapshot.is_playing);
    assert_eq!(snapshot.current_track_index, -1);
    assert!(snapshot.current_track.is_none());
    // Stopping is not forgetting: the queue itself is intact.
    assert_eq!(player.controller.queue_list().await.len(), 2);
    assert!(player.engine.script().loaded.is_none());
}

#[tokio::test]
async fn test_next_wraps_when_loop_enabled() {
    let player = TestPlayer::with_settings(|s| s.loop_at_end = true).await;
    player.controller.enqueue_track(local_track("a")).await.unwrap();
    player.controller.enqueue_track(local_track("b")).await.unwrap();
    player.controller.play(Some(1)).await.unwrap();

    let snapshot = player.controller.next().await.unwrap();

    assert!(snapshot.is_playing);
    assert_eq!(snapshot.current_track_index, 0);
}

#[tokio::test]
async fn test_next_on_empty_queue_is_silent_noop() {
    let player = TestPlayer::new().await;

    let snapshot = player.controller.next().await.unwrap();

    assert!(!snapshot.is_playing);
    assert_eq!(snapshot.current_track_index, -1);
}

#[tokio::test]
async fn test_next_from_idle_starts_front() {
    let player = TestPlayer::with_queue(vec![local_track("a"), local_track("b")]).await;

    let snapshot = player.controller.next().await.unwrap();

    assert!(snapshot.is_playing);
    assert_eq!(snapshot.current_track_index, 0);
}

#[tokio::test]
async fn test_previous_early_in_track_steps_back() {
    let player = TestPlayer::with_queue(vec![local_track("a"), local_track("b")]).await;
    player.controller.play(Some(1)).await.unwrap();

    // Position is still at 0 ms, well under the restart threshold.
    let snapshot = player.controller.previous().await.unwrap();

    assert_eq!(snapshot.current_track_index, 0);
    assert!(snapshot.is_playing);
}

#[tokio::test]
async fn test_previous_at_front_restarts_first_track() {
    let player = TestPlayer::with_queue(vec![local_track("a"), local_track("b")]).await;
    player.controller.play(Some(0)).await.unwrap();

    let snapshot = player.controller.previous().await.unwrap();

    // Clamped at the front: the first track starts over.
    assert_eq!(snapshot.current_track_index, 0);
    assert!(snapshot.is_playing);
    assert_eq!(player.engine.script().load_count, 2);
}

#[tokio::test]
async fn test_previous_late_in_track_restarts_it() {
    let player = TestPlayer::with_queue(vec![local_track("a"), local_track("b")]).await;
    player.controller.play(Some(1)).await.unwrap();

    // Simulate 5 seconds of playback and let a status poll pick it up.
    player.engine.script().position_ms = 5000;
    player.controller.status().await;

    let snapshot = player.controller.previous().await.unwrap();

    assert_eq!(snapshot.current_track_index, 1, "cursor must not move");
    assert_eq!(snapshot.current_time_ms, 0);
    assert!(snapshot.is_playing);
    let script = player.engine.script();
    assert_eq!(script.seek_count, 1);
    assert_eq!(script.load_count, 1, "restart must seek, not reload");
}

#[tokio::test]
async fn test_previous_restart_preserves_pause() {
    let player = TestPlayer::with_queue(vec![local_track("a")]).await;
    player.controller.play(Some(0)).await.unwrap();
    player.engine.script().position_ms = 4000;
    player.controller.status().await;
    player.controller.pause().await.unwrap();

    let snapshot = player.controller.previous().await.unwrap();

    // Rewound to the start but still paused.
    assert_eq!(snapshot.current_time_ms, 0);
    assert!(!snapshot.is_playing);
    assert_eq!(snapshot.current_track_index, 0);
}

// =============================================================================
// Volume
// =============================================================================

#[tokio::test]
async fn test_volume_clamped_at_boundaries() {
    let player = TestPlayer::new().await;

    let low = player.controller.set_volume(-5).await.unwrap();
    assert_eq!(low.volume, 0);

    let high = player.controller.set_volume(250).await.unwrap();
    assert_eq!(high.volume, 100);

    let mid = player.controller.set_volume(64).await.unwrap();
    assert_eq!(mid.volume, 64);
}

#[tokio::test]
async fn test_volume_reaches_engine_only_with_a_track() {
    let player = TestPlayer::with_queue(vec![local_track("song")]).await;

    player.controller.set_volume(55).await.unwrap();
    // No track loaded yet, so nothing was pushed to the engine.
    assert_eq!(player.engine.script().volume, None);

    player.controller.play(None).await.unwrap();
    // The load re-asserts the canonical volume.
    assert_eq!(player.engine.script().volume, Some(55));

    player.controller.set_volume(30).await.unwrap();
    assert_eq!(player.engine.script().volume, Some(30));
}

// =============================================================================
// Queue editing
// =============================================================================

#[tokio::test]
async fn test_enqueue_does_not_disturb_playback() {
    let player = TestPlayer::with_queue(vec![local_track("a")]).await;
    player.controller.play(Some(0)).await.unwrap();

    let snapshot = player
        .controller
        .enqueue_track(local_track("b"))
        .await
        .unwrap();

    assert_eq!(snapshot.current_track_index, 0);
    assert!(snapshot.is_playing);
    assert_eq!(player.controller.queue_list().await.len(), 2);
    assert_eq!(player.engine.script().load_count, 1);
}

#[tokio::test]
async fn test_remove_below_current_shifts_index_without_reload() {
    let player = TestPlayer::with_queue(vec![
        local_track("a"),
        local_track("b"),
        local_track("c"),
    ])
    .await;
    player.controller.play(Some(1)).await.unwrap();

    let snapshot = player.controller.remove_track(0).await.unwrap();

    assert_eq!(snapshot.current_track_index, 0);
    assert_eq!(snapshot.current_track.unwrap().title, "b");
    assert_eq!(player.engine.script().load_count, 1);
}

#[tokio::test]
async fn test_remove_current_starts_successor_at_same_position() {
    let player = TestPlayer::with_queue(vec![
        local_track("a"),
        local_track("b"),
        local_track("c"),
    ])
    .await;
    player.controller.play(Some(1)).await.unwrap();

    let snapshot = player.controller.remove_track(1).await.unwrap();

    assert_eq!(snapshot.current_track_index, 1);
    assert_eq!(snapshot.current_track.unwrap().title, "c");
    assert!(snapshot.is_playing);
    assert_eq!(player.engine.script().load_count, 2);
}

#[tokio::test]
async fn test_remove_current_last_slot_clamps_to_new_last() {
    let player = TestPlayer::with_queue(vec![local_track("a"), local_track("b")]).await;
    player.controller.play(Some(1)).await.unwrap();

    let snapshot = player.controller.remove_track(1).await.unwrap();

    assert_eq!(snapshot.current_track_index, 0);
    assert_eq!(snapshot.current_track.unwrap().title, "a");
    assert!(snapshot.is_playing);
}

#[tokio::test]
async fn test_remove_only_track_goes_idle() {
    let player = TestPlayer::with_queue(vec![local_track("a")]).await;
    player.controller.play(Some(0)).await.unwrap();

    let snapshot = player.controller.remove_track(0).await.unwrap();

    assert_sane(&snapshot);
    assert!(!snapshot.is_playing);
    assert_eq!(snapshot.current_track_index, -1);
    assert!(player.controller.queue_list().await.is_empty());
    assert!(player.engine.script().loaded.is_none());
}

#[tokio::test]
async fn test_remove_invalid_index_rejected() {
    let player = TestPlayer::with_queue(vec![local_track("a")]).await;

    let err = player.controller.remove_track(3).await.unwrap_err();
    assert!(matches!(err, Error::InvalidIndex { index: 3, len: 1 }));
    assert_eq!(player.controller.queue_list().await.len(), 1);
}

#[tokio::test]
async fn test_move_keeps_cursor_on_same_track() {
    let player = TestPlayer::with_queue(vec![
        local_track("a"),
        local_track("b"),
        local_track("c"),
    ])
    .await;
    player.controller.play(Some(0)).await.unwrap();

    let snapshot = player.controller.move_track(0, 2).await.unwrap();

    assert_eq!(snapshot.current_track_index, 2);
    assert_eq!(snapshot.current_track.unwrap().title, "a");
    assert_eq!(player.engine.script().load_count, 1);

    let titles: Vec<String> = player
        .controller
        .queue_list()
        .await
        .into_iter()
        .map(|t| t.title)
        .collect();
    assert_eq!(titles, ["b", "c", "a"]);
}

#[tokio::test]
async fn test_clear_queue_stops_and_empties() {
    let player = TestPlayer::with_queue(vec![local_track("a"), local_track("b")]).await;
    player.controller.play(Some(0)).await.unwrap();

    let snapshot = player.controller.clear_queue().await.unwrap();

    assert!(!snapshot.is_playing);
    assert_eq!(snapshot.current_track_index, -1);
    assert!(player.controller.queue_list().await.is_empty());
    assert!(player.engine.script().loaded.is_none());
}

// =============================================================================
// End-of-stream via the poll loop
// =============================================================================

#[tokio::test]
async fn test_poll_advances_to_next_track_on_eof() {
    let player = TestPlayer::with_queue(vec![local_track("a"), local_track("b")]).await;
    player.controller.play(Some(0)).await.unwrap();

    let mut events = player.events.subscribe();
    {
        let mut script = player.engine.script();
        script.reached_end = true;
        script.playing = false;
    }

    player.controller.poll_tick().await;

    let snapshot = player.controller.status().await;
    assert!(snapshot.is_playing);
    assert_eq!(snapshot.current_track_index, 1);
    assert_eq!(player.engine.script().load_count, 2);

    let mut saw_completed = false;
    while let Ok(event) = events.try_recv() {
        if matches!(event, PlayerEvent::TrackCompleted { .. }) {
            saw_completed = true;
        }
    }
    assert!(saw_completed, "end of stream must emit TrackCompleted");
}

#[tokio::test]
async fn test_poll_eof_at_last_track_goes_idle() {
    let player = TestPlayer::with_queue(vec![local_track("a")]).await;
    player.controller.play(Some(0)).await.unwrap();

    {
        let mut script = player.engine.script();
        script.reached_end = true;
        script.playing = false;
    }
    player.controller.poll_tick().await;

    let snapshot = player.controller.status().await;
    assert_sane(&snapshot);
    assert!(!snapshot.is_playing);
    assert_eq!(snapshot.current_track_index, -1);
    assert_eq!(player.controller.queue_list().await.len(), 1);
}

#[tokio::test]
async fn test_poll_eof_wraps_when_loop_enabled() {
    let player = TestPlayer::with_settings(|s| s.loop_at_end = true).await;
    player.controller.enqueue_track(local_track("a")).await.unwrap();
    player.controller.enqueue_track(local_track("b")).await.unwrap();
    player.controller.play(Some(1)).await.unwrap();

    {
        let mut script = player.engine.script();
        script.reached_end = true;
        script.playing = false;
    }
    player.controller.poll_tick().await;

    let snapshot = player.controller.status().await;
    assert!(snapshot.is_playing);
    assert_eq!(snapshot.current_track_index, 0);
}

#[tokio::test]
async fn test_status_never_advances_on_eof() {
    let player = TestPlayer::with_queue(vec![local_track("a"), local_track("b")]).await;
    player.controller.play(Some(0)).await.unwrap();

    {
        let mut script = player.engine.script();
        script.reached_end = true;
        script.playing = false;
    }

    // Any number of status reads must not advance the queue; the poll
    // loop owns that transition.
    for _ in 0..3 {
        let snapshot = player.controller.status().await;
        assert_eq!(snapshot.current_track_index, 0);
    }
    assert_eq!(player.engine.script().load_count, 1);
}

// =============================================================================
// Engine trouble is absorbed, never thrown
// =============================================================================

#[tokio::test]
async fn test_engine_query_failure_keeps_last_known_values() {
    let player = TestPlayer::with_queue(vec![local_track("a")]).await;
    player.controller.play(Some(0)).await.unwrap();

    player.engine.script().position_ms = 42_000;
    player.controller.status().await;

    player.engine.script().fail_queries = true;
    let snapshot = player.controller.status().await;

    assert_eq!(snapshot.current_time_ms, 42_000);
    assert_eq!(snapshot.current_track_index, 0);
    assert!(snapshot.is_playing);
}

#[tokio::test]
async fn test_poll_fault_streak_eventually_drops_track() {
    let player = TestPlayer::with_queue(vec![local_track("a")]).await;
    player.controller.play(Some(0)).await.unwrap();
    player.engine.script().fail_queries = true;

    // Two failed polls: still holding on to last-known state.
    player.controller.poll_tick().await;
    player.controller.poll_tick().await;
    {
        // Keep the engine failing but check state through the snapshot.
        let snapshot = player.controller.status().await;
        assert_eq!(snapshot.current_track_index, 0);
    }

    // Third consecutive failure gives the track up.
    player.controller.poll_tick().await;
    let snapshot = player.controller.status().await;

    assert_sane(&snapshot);
    assert!(!snapshot.is_playing);
    assert_eq!(snapshot.current_track_index, -1);
    assert_eq!(
        snapshot.last_error.unwrap().kind,
        ErrorKind::EngineFault
    );
}

#[tokio::test]
async fn test_poll_detects_engine_that_lost_its_track() {
    let player = TestPlayer::with_queue(vec![local_track("a")]).await;
    player.controller.play(Some(0)).await.unwrap();

    // Crashed-and-respawned engine: answers queries but has nothing
    // loaded.
    player.engine.script().loaded = None;
    player.controller.poll_tick().await;

    let snapshot = player.controller.status().await;
    assert!(!snapshot.is_playing);
    assert_eq!(snapshot.current_track_index, -1);
    assert_eq!(snapshot.last_error.unwrap().kind, ErrorKind::EngineFault);
}

#[tokio::test]
async fn test_engine_load_failure_is_absorbed() {
    let player = TestPlayer::with_queue(vec![local_track("a")]).await;
    player.engine.script().fail_loads = true;

    let snapshot = player.controller.play(Some(0)).await.unwrap();

    assert_sane(&snapshot);
    assert!(!snapshot.is_playing);
    assert_eq!(snapshot.current_track_index, -1);
    assert_eq!(snapshot.last_error.unwrap().kind, ErrorKind::EngineFault);
    // The queue keeps the track for a later retry.
    assert_eq!(player.controller.queue_list().await.len(), 1);
}

#[tokio::test]
async fn test_successful_start_clears_last_error() {
    let player = TestPlayer::with_queue(vec![local_track("a")]).await;
    player.engine.script().fail_loads = true;
    player.controller.play(Some(0)).await.unwrap();
    assert!(player.controller.status().await.last_error.is_some());

    player.engine.script().fail_loads = false;
    let snapshot = player.controller.play(Some(0)).await.unwrap();

    assert!(snapshot.is_playing);
    assert!(snapshot.last_error.is_none());
}

// =============================================================================
// Resolution
// =============================================================================

#[tokio::test]
async fn test_remote_track_resolves_before_load() {
    let player = TestPlayer::with_queue(vec![remote_track("r1")]).await;

    let snapshot = player.controller.play(Some(0)).await.unwrap();

    assert!(snapshot.is_playing);
    assert_eq!(player.resolver.resolve_calls().len(), 1);
    let loaded = player.engine.script().loaded.clone().unwrap();
    assert!(
        loaded.ends_with("#stream"),
        "engine must receive the stream reference, got {}",
        loaded
    );
}

#[tokio::test]
async fn test_track_with_stream_ref_skips_resolution() {
    let player = TestPlayer::with_queue(vec![resolved_remote("r1")]).await;

    player.controller.play(Some(0)).await.unwrap();

    assert!(player.resolver.resolve_calls().is_empty());
}

#[tokio::test]
async fn test_resolution_failure_absorbed_queue_unaffected() {
    let player = TestPlayer::with_queue(vec![remote_track("r1")]).await;
    player
        .resolver
        .push_resolve(Err(Error::ResolutionFailed("provider down".into())));

    let snapshot = player.controller.play(Some(0)).await.unwrap();

    assert_sane(&snapshot);
    assert!(!snapshot.is_playing);
    assert_eq!(snapshot.current_track_index, -1);
    assert_eq!(
        snapshot.last_error.unwrap().kind,
        ErrorKind::ResolutionFailed
    );
    assert_eq!(player.controller.queue_list().await.len(), 1);
    assert_eq!(player.engine.script().load_count, 0);
}

#[tokio::test]
async fn test_command_during_resolution_wins() {
    let player =
        TestPlayer::with_queue(vec![local_track("fast"), remote_track("slow")]).await;
    player.resolver.set_resolve_delay(Duration::from_millis(80));

    // Ask for the remote track, then start the local one while the
    // provider is still thinking.
    let controller = player.controller.clone();
    let slow_start = tokio::spawn(async move { controller.play(Some(1)).await });
    tokio::time::sleep(Duration::from_millis(20)).await;
    player.controller.play(Some(0)).await.unwrap();

    slow_start.await.unwrap().unwrap();

    // The later command owns the player; the stale start was discarded.
    let snapshot = player.controller.status().await;
    assert_eq!(snapshot.current_track_index, 0);
    assert_eq!(snapshot.current_track.unwrap().title, "fast");
    assert_eq!(player.engine.script().load_count, 1);
}

// =============================================================================
// History
// =============================================================================

#[tokio::test]
async fn test_history_records_most_recent_first_with_dedupe() {
    let player = TestPlayer::with_queue(vec![
        local_track("a"),
        local_track("b"),
    ])
    .await;

    player.controller.play(Some(0)).await.unwrap();
    player.controller.play(Some(1)).await.unwrap();
    player.controller.play(Some(0)).await.unwrap();
    // One more start so the pending entry for "a" gets committed.
    player.controller.next().await.unwrap();

    let history = player.controller.history_list().await;
    let titles: Vec<String> = history.into_iter().map(|t| t.title).collect();
    assert_eq!(titles, ["a", "b"], "replay moves to front, no duplicate");
}

#[tokio::test]
async fn test_skipped_track_stays_out_of_history() {
    let player = TestPlayer::with_settings(|s| s.history_dwell_ms = 60_000).await;
    player.controller.enqueue_track(local_track("a")).await.unwrap();
    player.controller.enqueue_track(local_track("b")).await.unwrap();

    // Skip through immediately; nothing dwells long enough to count.
    player.controller.play(Some(0)).await.unwrap();
    player.controller.next().await.unwrap();
    player.controller.next().await.unwrap();

    assert!(player.controller.history_list().await.is_empty());
}

#[tokio::test]
async fn test_restart_does_not_duplicate_pending_history() {
    let player = TestPlayer::with_queue(vec![local_track("a")]).await;
    player.controller.play(Some(0)).await.unwrap();

    player.engine.script().position_ms = 5000;
    player.controller.status().await;
    // Restart the same track, then flush.
    player.controller.previous().await.unwrap();
    player.controller.next().await.unwrap();

    assert_eq!(player.controller.history_list().await.len(), 1);
}

// =============================================================================
// Favorites and promotion
// =============================================================================

#[tokio::test]
async fn test_favorites_dedupe_by_identity() {
    let player = TestPlayer::with_queue(vec![local_track("a")]).await;

    player.controller.add_favorite(Some(0)).await.unwrap();
    player.controller.add_favorite(Some(0)).await.unwrap();

    assert_eq!(player.controller.favorites_list().await.len(), 1);
}

#[tokio::test]
async fn test_add_favorite_defaults_to_current_track() {
    let player = TestPlayer::with_queue(vec![local_track("a"), local_track("b")]).await;
    player.controller.play(Some(1)).await.unwrap();

    player.controller.add_favorite(None).await.unwrap();

    let favorites = player.controller.favorites_list().await;
    assert_eq!(favorites.len(), 1);
    assert_eq!(favorites[0].title, "b");
}

#[tokio::test]
async fn test_add_favorite_without_current_rejected() {
    let player = TestPlayer::with_queue(vec![local_track("a")]).await;

    let err = player.controller.add_favorite(None).await.unwrap_err();
    assert!(matches!(err, Error::EmptyQueue));
}

#[tokio::test]
async fn test_remove_favorite_by_position() {
    let player = TestPlayer::with_queue(vec![local_track("a"), local_track("b")]).await;
    player.controller.add_favorite(Some(0)).await.unwrap();
    player.controller.add_favorite(Some(1)).await.unwrap();

    player.controller.remove_favorite(0).await.unwrap();

    let favorites = player.controller.favorites_list().await;
    assert_eq!(favorites.len(), 1);
    assert_eq!(favorites[0].title, "b");

    let err = player.controller.remove_favorite(7).await.unwrap_err();
    assert!(matches!(err, Error::InvalidIndex { .. }));
}

#[tokio::test]
async fn test_promotion_copies_into_fresh_queue_slot() {
    let player = TestPlayer::with_queue(vec![local_track("a"), local_track("b")]).await;
    player.controller.add_favorite(Some(0)).await.unwrap();
    player.controller.play(Some(1)).await.unwrap();

    let snapshot = player
        .controller
        .enqueue_from_favorites(0)
        .await
        .unwrap();

    // Playback untouched, copy appended at the tail.
    assert_eq!(snapshot.current_track_index, 1);
    let titles: Vec<String> = player
        .controller
        .queue_list()
        .await
        .into_iter()
        .map(|t| t.title)
        .collect();
    assert_eq!(titles, ["a", "b", "a"]);

    let err = player.controller.enqueue_from_history(0).await.unwrap_err();
    assert!(matches!(err, Error::InvalidIndex { .. }));
}

// =============================================================================
// Downloads merging back
// =============================================================================

#[tokio::test]
async fn test_merged_download_wins_over_resolution() {
    let player = TestPlayer::with_queue(vec![remote_track("r1")]).await;
    let identity = remote_track("r1").identity().to_string();

    player
        .controller
        .merge_download(DownloadOutcome {
            job_id: Uuid::new_v4(),
            track_identity: identity,
            result: Ok(PathBuf::from("/downloads/r1.mp3")),
        })
        .await;

    let snapshot = player.controller.play(Some(0)).await.unwrap();

    assert!(snapshot.is_playing);
    // The local copy plays directly; no provider round-trip.
    assert!(player.resolver.resolve_calls().is_empty());
    assert_eq!(
        player.engine.script().loaded.as_deref(),
        Some("/downloads/r1.mp3")
    );
}

#[tokio::test]
async fn test_download_outcome_for_departed_track_is_dropped() {
    let player = TestPlayer::with_queue(vec![local_track("a")]).await;

    player
        .controller
        .merge_download(DownloadOutcome {
            job_id: Uuid::new_v4(),
            track_identity: "https://tube.example/watch?v=gone".to_string(),
            result: Ok(PathBuf::from("/downloads/gone.mp3")),
        })
        .await;

    let tracks = player.controller.queue_list().await;
    assert_eq!(tracks.len(), 1);
    assert_eq!(tracks[0].title, "a");
}

#[tokio::test]
async fn test_failed_download_surfaces_in_last_error() {
    let player = TestPlayer::with_queue(vec![remote_track("r1")]).await;

    player
        .controller
        .merge_download(DownloadOutcome {
            job_id: Uuid::new_v4(),
            track_identity: remote_track("r1").identity().to_string(),
            result: Err(Error::DownloadFailed("disk full".into())),
        })
        .await;

    let snapshot = player.controller.status().await;
    assert_eq!(snapshot.last_error.unwrap().kind, ErrorKind::DownloadFailed);
    assert!(!snapshot.is_playing);
}

// =============================================================================
// Persistence
// =============================================================================

#[tokio::test]
async fn test_lists_survive_restart() {
    let player = TestPlayer::with_queue(vec![local_track("a"), local_track("b")]).await;
    player.controller.add_favorite(Some(0)).await.unwrap();
    player.controller.play(Some(0)).await.unwrap();
    player.controller.next().await.unwrap();
    player.controller.shutdown().await;

    // A second store over the same directory sees everything, including
    // the entry that was still pending when shutdown flushed it.
    let store = ListStore::new(player.data_dir.path()).await.unwrap();
    let lists = LoadedLists::load(&store).await;

    assert_eq!(lists.queue.len(), 2);
    assert_eq!(lists.favorites.len(), 1);
    assert_eq!(lists.history.len(), 2);
    assert_eq!(lists.history[0].title, "b");
    assert_eq!(lists.history[1].title, "a");
    assert!(lists.load_error.is_none());
    assert_eq!(player.engine.script().shutdown_count, 1);
}

#[tokio::test]
async fn test_corrupt_list_file_loads_empty_and_is_set_aside() {
    let dir = tempfile::tempdir().unwrap();
    tokio::fs::write(dir.path().join("queue.json"), b"{definitely not json")
        .await
        .unwrap();

    let store = ListStore::new(dir.path()).await.unwrap();
    let lists = LoadedLists::load(&store).await;

    assert!(lists.queue.is_empty());
    let load_error = lists.load_error.expect("corruption must be reported");
    assert_eq!(load_error.kind, ErrorKind::PersistenceCorrupt);
    assert!(dir.path().join("queue.json.corrupt").exists());

    // Clean loads after the bad file was set aside.
    assert!(store.load(ListName::Queue).await.unwrap().is_empty());
}
