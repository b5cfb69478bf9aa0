//! Integration tests for the sync cycle
//!
//! Each test drives one or two devices against a shared in-memory backend.


use cadence_core::{
    time, AppEvent, FavoriteSong, Playlist, PlaylistSong, SessionContext, SyncState, SyncTable,
};
use cadence_storage::sync_state;
use cadence_storage::{favorites, playlist_songs, playlists};
use cadence_sync::{CycleOutcome, CycleReport, SyncTrigger};
use chrono::Duration;
use std::sync::Arc;
use test_helpers::*;
use tokio::sync::broadcast::error::TryRecvError;

async fn sync(device: &Device) -> CycleReport {
    match device.engine.run_cycle(SyncTrigger::Manual).await.unwrap() {
        CycleOutcome::Completed(report) => report,
        other => panic!("Expected a completed cycle, got {other:?}"),
    }
}

// =============================================================================
// Pull
// =============================================================================

#[tokio::test]
async fn test_pull_inserts_remote_rows_clean() {
    let remote = FakeRemote::new();
    let playlist = Playlist::new(USER, "From another device");
    remote.seed(&playlist);

    let device = Device::signed_in(&remote).await;
    let report = sync(&device).await;

    let stats = report.table(SyncTable::Playlists).unwrap();
    assert_eq!(stats.pulled, 1);
    assert_eq!(stats.applied, 1);
    assert!(stats.cursor_advanced);

    let stored = device
        .store()
        .find::<Playlist>(&playlist.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.row, playlist);
    assert_eq!(stored.dirty, 0);
    assert_eq!(remote.upsert_calls(), 0);
}

#[tokio::test]
async fn test_repeated_pull_makes_no_local_changes() {
    let remote = FakeRemote::new();
    remote.seed(&Playlist::new(USER, "A"));
    remote.seed(&FavoriteSong::new(USER, song("s-1")));

    let device = Device::signed_in(&remote).await;
    sync(&device).await;

    let mut changes = device.store().subscribe_changes();
    let report = sync(&device).await;

    assert_eq!(report.applied(), 0);
    assert_eq!(report.pushed(), 0);
    assert!(matches!(changes.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn test_cursor_is_backend_stamp_of_last_pulled_row() {
    let remote = FakeRemote::new();
    let mut edited_long_ago = Playlist::new(USER, "Edited offline");
    edited_long_ago.updated_at = edited_long_ago.updated_at - Duration::hours(3);
    remote.seed(&Playlist::new(USER, "Recent"));
    remote.seed(&edited_long_ago);

    let device = Device::signed_in(&remote).await;
    sync(&device).await;

    let cursor = sync_state::get_cursor(device.store(), USER, SyncTable::Playlists)
        .await
        .unwrap();
    let stamp = remote.synced_at(SyncTable::Playlists, &edited_long_ago.id);
    assert_eq!(cursor, stamp);
    assert_ne!(cursor, Some(edited_long_ago.updated_at));
}

#[tokio::test]
async fn test_pushed_rows_do_not_move_cursor() {
    let remote = FakeRemote::new();
    let device = Device::signed_in(&remote).await;
    playlists::create(device.store(), USER, "Local only", None)
        .await
        .unwrap();

    let report = sync(&device).await;

    assert_eq!(report.table(SyncTable::Playlists).unwrap().pushed, 1);
    assert_eq!(
        sync_state::get_cursor(device.store(), USER, SyncTable::Playlists)
            .await
            .unwrap(),
        None
    );

    // The next pull sees the pushed row again and leaves it alone
    let report = sync(&device).await;
    let stats = report.table(SyncTable::Playlists).unwrap();
    assert_eq!(stats.pulled, 1);
    assert_eq!(stats.applied, 0);
    assert!(stats.cursor_advanced);
}

#[tokio::test]
async fn test_remote_soft_delete_propagates() {
    let remote = FakeRemote::new();
    let favorite = FavoriteSong::new(USER, song("s-1"));
    remote.seed(&favorite);

    let device = Device::signed_in(&remote).await;
    sync(&device).await;
    assert_eq!(favorites::list(device.store(), USER).await.unwrap().len(), 1);

    let mut deleted = favorite.clone();
    deleted.is_deleted = true;
    deleted.deleted_at = Some(time::now());
    deleted.updated_at = favorite.updated_at + Duration::seconds(1);
    remote.seed(&deleted);

    sync(&device).await;
    assert!(favorites::list(device.store(), USER).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_remote_playlist_song_removal_deletes_entry_and_fixes_count() {
    let remote = FakeRemote::new();
    let mut playlist = Playlist::new(USER, "Mix");
    playlist.song_count = 1;
    let entry = PlaylistSong::new(USER, &playlist.id, song("s-1"), 0);
    remote.seed(&playlist);
    remote.seed(&entry);

    let device = Device::signed_in(&remote).await;
    sync(&device).await;
    assert_eq!(
        playlist_songs::list(device.store(), &playlist.id).await.unwrap().len(),
        1
    );

    let mut removed = entry.clone();
    removed.is_deleted = true;
    removed.updated_at = entry.updated_at + Duration::seconds(1);
    remote.seed(&removed);

    sync(&device).await;

    assert!(device
        .store()
        .find::<PlaylistSong>(&entry.id)
        .await
        .unwrap()
        .is_none());
    let local = playlists::get(device.store(), &playlist.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(local.song_count, 0);
}

// =============================================================================
// Conflict resolution
// =============================================================================

#[tokio::test]
async fn test_tie_resolves_to_remote() {
    let remote = FakeRemote::new();
    let device = Device::signed_in(&remote).await;

    let local = playlists::create(device.store(), USER, "Local", None)
        .await
        .unwrap();
    let mut theirs = local.clone();
    theirs.name = "Remote".to_string();
    remote.seed(&theirs);

    let report = sync(&device).await;

    let stored = device
        .store()
        .find::<Playlist>(&local.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.row.name, "Remote");
    assert_eq!(stored.dirty, 0);
    assert_eq!(report.table(SyncTable::Playlists).unwrap().pushed, 0);
}

#[tokio::test]
async fn test_older_remote_row_is_overwritten_by_local() {
    let remote = FakeRemote::new();
    let device = Device::signed_in(&remote).await;

    let local = playlists::create(device.store(), USER, "Fresh", None)
        .await
        .unwrap();
    let mut stale = local.clone();
    stale.name = "Stale".to_string();
    stale.updated_at = local.updated_at - Duration::seconds(30);
    remote.seed(&stale);

    let report = sync(&device).await;

    let stats = report.table(SyncTable::Playlists).unwrap();
    assert_eq!(stats.kept_local, 1);
    assert_eq!(stats.pushed, 1);
    assert_eq!(remote.row::<Playlist>(&local.id).unwrap().name, "Fresh");
}

#[tokio::test]
async fn test_newer_local_clean_row_is_queued_again() {
    let remote = FakeRemote::new();
    let device = Device::signed_in(&remote).await;

    // Clean local row that the backend somehow lost
    let local = Playlist::new(USER, "Kept");
    let mut txn = device.store().write().await.unwrap();
    txn.apply_remote(&local).await.unwrap();
    txn.commit().await.unwrap();

    let mut stale = local.clone();
    stale.name = "Older".to_string();
    stale.updated_at = local.updated_at - Duration::seconds(1);
    remote.seed(&stale);

    sync(&device).await;

    assert_eq!(remote.row::<Playlist>(&local.id).unwrap().name, "Kept");
    let stored = device
        .store()
        .find::<Playlist>(&local.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.dirty, 0);
}

#[tokio::test]
async fn test_two_devices_converge_on_latest_edit() {
    let remote = FakeRemote::new();
    let phone = Device::signed_in(&remote).await;
    let laptop = Device::signed_in(&remote).await;

    let playlist = playlists::create(phone.store(), USER, "Shared", None)
        .await
        .unwrap();
    sync(&phone).await;
    sync(&laptop).await;

    playlists::rename(phone.store(), &playlist.id, "Phone edit")
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    playlists::rename(laptop.store(), &playlist.id, "Laptop edit")
        .await
        .unwrap();

    sync(&phone).await;
    sync(&laptop).await;
    sync(&phone).await;

    let on_phone = playlists::get(phone.store(), &playlist.id)
        .await
        .unwrap()
        .unwrap();
    let on_laptop = playlists::get(laptop.store(), &playlist.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(on_phone.name, "Laptop edit");
    assert_eq!(on_laptop.name, "Laptop edit");
    assert_eq!(remote.row::<Playlist>(&playlist.id).unwrap().name, "Laptop edit");
}

#[tokio::test]
async fn test_edit_pushed_late_reaches_device_that_synced_meanwhile() {
    let remote = FakeRemote::new();
    let phone = Device::signed_in(&remote).await;
    let laptop = Device::signed_in(&remote).await;

    let playlist = playlists::create(phone.store(), USER, "Original", None)
        .await
        .unwrap();
    sync(&phone).await;
    sync(&laptop).await;

    // Laptop edits while offline
    playlists::rename(laptop.store(), &playlist.id, "Renamed on laptop")
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;

    // Phone keeps working and syncing with newer, unrelated edits
    playlists::create(phone.store(), USER, "Later", None)
        .await
        .unwrap();
    sync(&phone).await;
    sync(&phone).await;

    // Laptop reconnects
    sync(&laptop).await;
    assert_eq!(
        remote.row::<Playlist>(&playlist.id).unwrap().name,
        "Renamed on laptop"
    );

    sync(&phone).await;
    let on_phone = playlists::get(phone.store(), &playlist.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(on_phone.name, "Renamed on laptop");
}

#[tokio::test]
async fn test_device_clock_ahead_does_not_hide_later_edits() {
    let remote = FakeRemote::new();
    let phone = Device::signed_in(&remote).await;
    let laptop = Device::signed_in(&remote).await;

    let playlist = playlists::create(laptop.store(), USER, "Original", None)
        .await
        .unwrap();
    sync(&laptop).await;
    sync(&phone).await;

    // Written by a device whose clock runs a day ahead
    let mut from_the_future = Playlist::new(USER, "Skewed clock");
    from_the_future.created_at = from_the_future.created_at + Duration::days(1);
    from_the_future.updated_at = from_the_future.updated_at + Duration::days(1);
    remote.seed(&from_the_future);
    sync(&phone).await;

    playlists::rename(laptop.store(), &playlist.id, "Renamed")
        .await
        .unwrap();
    sync(&laptop).await;
    sync(&phone).await;

    let on_phone = playlists::get(phone.store(), &playlist.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(on_phone.name, "Renamed");
    assert!(playlists::get(phone.store(), &from_the_future.id)
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_undecodable_row_is_skipped_and_logged() {
    let remote = FakeRemote::new();
    let good = Playlist::new(USER, "Fine");
    remote.seed(&good);
    let mut broken = serde_json::to_value(Playlist::new(USER, "Broken")).unwrap();
    broken["name"] = serde_json::Value::Null;
    let broken_id = broken["id"].as_str().unwrap().to_string();
    remote.seed_value(SyncTable::Playlists, broken);

    let device = Device::signed_in(&remote).await;
    let local = playlists::create(device.store(), USER, "Made here", None)
        .await
        .unwrap();

    let report = sync(&device).await;

    let stats = report.table(SyncTable::Playlists).unwrap();
    assert!(!stats.is_failed());
    assert_eq!(stats.pulled, 2);
    assert_eq!(stats.applied, 1);
    assert_eq!(stats.skipped, 1);
    assert_eq!(stats.pushed, 1);
    assert!(stats.cursor_advanced);
    assert!(playlists::get(device.store(), &good.id).await.unwrap().is_some());
    assert!(playlists::get(device.store(), &broken_id).await.unwrap().is_none());
    assert!(remote.row::<Playlist>(&local.id).is_some());

    let logged = device.engine.recent_errors(10).await.unwrap();
    assert_eq!(logged.len(), 1);
    assert_eq!(logged[0].kind, "decode");
    assert_eq!(logged[0].table, Some(SyncTable::Playlists));
    assert!(logged[0].message.contains(&broken_id));

    // Once the backend holds a valid copy it comes through
    let mut repaired = Playlist::new(USER, "Repaired");
    repaired.id = broken_id.clone();
    remote.seed(&repaired);
    let report = sync(&device).await;

    assert_eq!(report.table(SyncTable::Playlists).unwrap().skipped, 0);
    assert_eq!(
        playlists::get(device.store(), &broken_id)
            .await
            .unwrap()
            .unwrap()
            .name,
        "Repaired"
    );
}

// =============================================================================
// Push
// =============================================================================

#[tokio::test]
async fn test_local_edits_are_pushed_and_cleared() {
    let remote = FakeRemote::new();
    let device = Device::signed_in(&remote).await;

    let playlist = playlists::create(device.store(), USER, "Mine", None)
        .await
        .unwrap();
    favorites::add(device.store(), USER, song("s-1")).await.unwrap();

    let report = sync(&device).await;

    assert_eq!(report.table(SyncTable::Playlists).unwrap().pushed, 1);
    assert_eq!(report.table(SyncTable::FavoriteSongs).unwrap().pushed, 1);
    assert_eq!(remote.row::<Playlist>(&playlist.id).unwrap(), playlist);
    assert_eq!(device.store().pending_count(USER).await.unwrap(), 0);
    assert_eq!(device.engine.status().pending_uploads, 0);
}

#[tokio::test]
async fn test_rejected_row_stays_dirty_without_blocking_others() {
    let remote = FakeRemote::new();
    let device = Device::signed_in(&remote).await;

    let good = favorites::add(device.store(), USER, song("s-1")).await.unwrap();
    let bad = favorites::add(device.store(), USER, song("s-2")).await.unwrap();
    remote.reject(&bad.id);

    let report = sync(&device).await;

    let stats = report.table(SyncTable::FavoriteSongs).unwrap();
    assert_eq!(stats.pushed, 1);
    assert_eq!(stats.rejected, 1);
    assert!(stats.error.is_none());

    let good_row = device.store().find::<FavoriteSong>(&good.id).await.unwrap().unwrap();
    let bad_row = device.store().find::<FavoriteSong>(&bad.id).await.unwrap().unwrap();
    assert!(!good_row.is_dirty());
    assert!(bad_row.is_dirty());
    assert_eq!(device.engine.status().pending_uploads, 1);

    let errors = device.engine.recent_errors(10).await.unwrap();
    assert!(errors
        .iter()
        .any(|e| e.kind == "rejected" && e.table == Some(SyncTable::FavoriteSongs)));

    // Retried on the next cycle
    sync(&device).await;
    let retried = remote
        .upserted(SyncTable::FavoriteSongs)
        .iter()
        .filter(|row| row["id"] == bad.id.as_str())
        .count();
    assert_eq!(retried, 2);
}

#[tokio::test]
async fn test_write_during_push_is_sent_next_cycle() {
    let remote = FakeRemote::new();
    let device = Device::signed_in(&remote).await;

    let playlist = playlists::create(device.store(), USER, "Before", None)
        .await
        .unwrap();
    let pause = remote.pause_at(PausePoint::Upsert);

    let engine = Arc::clone(&device.engine);
    let cycle = tokio::spawn(async move { engine.run_cycle(SyncTrigger::Manual).await });

    pause.entered.notified().await;
    tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    playlists::rename(device.store(), &playlist.id, "During")
        .await
        .unwrap();
    pause.release.notify_one();
    cycle.await.unwrap().unwrap();

    let stored = device
        .store()
        .find::<Playlist>(&playlist.id)
        .await
        .unwrap()
        .unwrap();
    assert!(stored.is_dirty());
    assert_eq!(remote.row::<Playlist>(&playlist.id).unwrap().name, "Before");

    sync(&device).await;
    assert_eq!(remote.row::<Playlist>(&playlist.id).unwrap().name, "During");
    let stored = device
        .store()
        .find::<Playlist>(&playlist.id)
        .await
        .unwrap()
        .unwrap();
    assert!(!stored.is_dirty());
}

#[tokio::test]
async fn test_removed_playlist_song_is_soft_deleted_remotely() {
    let remote = FakeRemote::new();
    let device = Device::signed_in(&remote).await;

    let playlist = playlists::create(device.store(), USER, "Mix", None)
        .await
        .unwrap();
    let entry = playlist_songs::add(device.store(), USER, &playlist.id, song("s-1"))
        .await
        .unwrap();
    sync(&device).await;

    assert!(playlist_songs::remove(device.store(), &entry.id).await.unwrap());
    let report = sync(&device).await;

    assert_eq!(report.table(SyncTable::PlaylistSongs).unwrap().removed, 1);
    assert_eq!(remote.soft_deleted(SyncTable::PlaylistSongs), vec![entry.id.clone()]);
    assert!(remote.row::<PlaylistSong>(&entry.id).unwrap().is_deleted);
    assert!(sync_state::tombstones(device.store(), USER, SyncTable::PlaylistSongs)
        .await
        .unwrap()
        .is_empty());
    assert_eq!(remote.row::<Playlist>(&playlist.id).unwrap().song_count, 0);
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test]
async fn test_total_failure_leaves_cursors_untouched() {
    let remote = FakeRemote::new();
    remote.seed(&Playlist::new(USER, "A"));
    let device = Device::signed_in(&remote).await;
    sync(&device).await;
    let before = sync_state::cursors(device.store(), USER).await.unwrap();

    let mut newer = Playlist::new(USER, "B");
    newer.updated_at = newer.updated_at + Duration::seconds(10);
    remote.seed(&newer);
    remote.set_all_offline();

    let report = sync(&device).await;

    assert_eq!(report.failed_tables().len(), SyncTable::ALL.len());
    assert!(report.tables.iter().all(|t| !t.cursor_advanced));
    assert_eq!(sync_state::cursors(device.store(), USER).await.unwrap(), before);

    let status = device.engine.status();
    assert_eq!(status.state, SyncState::Idle);
    assert_eq!(status.errors.len(), SyncTable::ALL.len());
    let logged = device.engine.recent_errors(20).await.unwrap();
    assert!(logged.iter().all(|e| e.kind == "network"));
    assert!(logged.iter().all(|e| e.cycle_id == report.cycle_id));
}

#[tokio::test]
async fn test_failed_table_does_not_block_others() {
    let remote = FakeRemote::new();
    let device = Device::signed_in(&remote).await;

    favorites::add(device.store(), USER, song("s-1")).await.unwrap();
    let playlist = playlists::create(device.store(), USER, "Mix", None)
        .await
        .unwrap();
    remote.set_offline(SyncTable::FavoriteSongs, true);

    let report = sync(&device).await;

    assert_eq!(report.failed_tables(), vec![SyncTable::FavoriteSongs]);
    assert_eq!(report.table(SyncTable::FavoriteSongs).unwrap().pushed, 0);
    assert!(remote.row::<Playlist>(&playlist.id).is_some());
    assert_eq!(remote.row_count(SyncTable::FavoriteSongs), 0);
    assert_eq!(
        sync_state::get_cursor(device.store(), USER, SyncTable::FavoriteSongs)
            .await
            .unwrap(),
        None
    );
}

#[tokio::test]
async fn test_no_session_suspends_without_remote_calls() {
    let remote = FakeRemote::new();
    let device = Device::with_session(&remote, SessionContext::new()).await;
    let events = device.record_events();

    let outcome = device.engine.run_cycle(SyncTrigger::Manual).await.unwrap();

    assert_eq!(outcome, CycleOutcome::Suspended);
    assert_eq!(remote.calls(), 0);
    assert_eq!(device.engine.status().state, SyncState::Suspended);
    assert!(events.lock().unwrap().contains(&AppEvent::SyncStateChanged {
        state: SyncState::Suspended
    }));
}

#[tokio::test]
async fn test_rejected_session_suspends_cycle() {
    let remote = FakeRemote::new();
    let device = Device::signed_in(&remote).await;
    let playlist = playlists::create(device.store(), USER, "Mine", None)
        .await
        .unwrap();
    remote.set_unauthenticated(true);

    let outcome = device.engine.run_cycle(SyncTrigger::Manual).await.unwrap();

    assert_eq!(outcome, CycleOutcome::Suspended);
    assert_eq!(remote.calls(), 1);
    assert!(device
        .store()
        .find::<Playlist>(&playlist.id)
        .await
        .unwrap()
        .unwrap()
        .is_dirty());

    // Resumes once the backend accepts the session again
    remote.set_unauthenticated(false);
    let report = sync(&device).await;
    assert!(report.is_success());
    assert_eq!(device.engine.status().state, SyncState::Idle);
}

// =============================================================================
// Gating and status
// =============================================================================

#[tokio::test]
async fn test_trigger_during_cycle_is_coalesced() {
    let remote = FakeRemote::new();
    let device = Device::signed_in(&remote).await;
    let pause = remote.pause_at(PausePoint::Fetch);

    let engine = Arc::clone(&device.engine);
    let first = tokio::spawn(async move { engine.run_cycle(SyncTrigger::Interval).await });
    pause.entered.notified().await;

    assert!(device.engine.status().is_running);
    let second = device.engine.run_cycle(SyncTrigger::Manual).await.unwrap();
    assert_eq!(second, CycleOutcome::Coalesced);

    pause.release.notify_one();
    let first = first.await.unwrap().unwrap();
    assert!(matches!(first, CycleOutcome::Completed(_)));
    assert!(!device.engine.status().is_running);
}

#[tokio::test]
async fn test_completed_cycle_updates_status_and_emits_events() {
    let remote = FakeRemote::new();
    remote.seed(&Playlist::new(USER, "Remote"));
    let device = Device::signed_in(&remote).await;
    favorites::add(device.store(), USER, song("s-1")).await.unwrap();
    let events = device.record_events();

    let report = sync(&device).await;

    let status = device.engine.status();
    assert_eq!(status.state, SyncState::Idle);
    assert!(!status.is_running);
    assert_eq!(status.last_sync_at, Some(report.finished_at));
    assert_eq!(status.last_report.as_ref(), Some(&report));
    assert!(status.errors.is_empty());

    let events = events.lock().unwrap();
    let phases: Vec<SyncState> = events
        .iter()
        .filter_map(|e| match e {
            AppEvent::SyncStateChanged { state } => Some(*state),
            _ => None,
        })
        .collect();
    assert_eq!(
        phases,
        vec![
            SyncState::Pulling,
            SyncState::Reconciling,
            SyncState::Pushing,
            SyncState::Idle
        ]
    );
    assert!(events.contains(&AppEvent::SyncCompleted {
        failed_tables: Vec::new(),
        applied: 1,
        pushed: 1,
    }));
}
