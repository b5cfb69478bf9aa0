//! Integration tests for the background scheduler


use cadence_core::{AppEvent, Playlist, Session, SessionContext, SyncTable};
use cadence_remote::{ChangeKind, RealtimeEvent};
use cadence_storage::playlists;
use cadence_sync::{SyncConfig, SyncTrigger};
use std::time::Duration;
use test_helpers::*;

fn quiet_config() -> SyncConfig {
    SyncConfig {
        interval: Duration::from_secs(3600),
        realtime: false,
        realtime_retry: Duration::from_millis(50),
    }
}

#[tokio::test]
async fn test_start_runs_startup_cycle() {
    let remote = FakeRemote::new();
    let playlist = Playlist::new(USER, "Remote");
    remote.seed(&playlist);
    let device = Device::signed_in(&remote).await;

    let handle = device.engine.start(quiet_config());
    wait_until(|| device.engine.status().last_sync_at.is_some()).await;

    let report = device.engine.status().last_report.unwrap();
    assert_eq!(report.trigger, SyncTrigger::Startup);
    assert!(playlists::get(device.store(), &playlist.id)
        .await
        .unwrap()
        .is_some());

    handle.shutdown().await;
}

#[tokio::test]
async fn test_manual_trigger_runs_a_cycle() {
    let remote = FakeRemote::new();
    let device = Device::signed_in(&remote).await;

    let handle = device.engine.start(quiet_config());
    wait_until(|| device.engine.status().last_sync_at.is_some()).await;

    let playlist = playlists::create(device.store(), USER, "Local", None)
        .await
        .unwrap();
    assert!(handle.trigger(SyncTrigger::Manual));
    wait_until(|| remote.row::<Playlist>(&playlist.id).is_some()).await;

    handle.shutdown().await;
}

#[tokio::test]
async fn test_interval_triggers_cycles() {
    let remote = FakeRemote::new();
    let device = Device::signed_in(&remote).await;

    let config = SyncConfig {
        interval: Duration::from_millis(50),
        ..quiet_config()
    };
    let handle = device.engine.start(config);

    wait_until(|| {
        device
            .engine
            .status()
            .last_report
            .is_some_and(|r| r.trigger == SyncTrigger::Interval)
    })
    .await;

    handle.shutdown().await;
}

#[tokio::test]
async fn test_sign_in_resumes_suspended_engine() {
    let remote = FakeRemote::new();
    let session = SessionContext::new();
    let device = Device::with_session(&remote, session.clone()).await;
    let events = device.record_events();

    let handle = device.engine.start(quiet_config());
    wait_until(|| device.engine.status().state == cadence_core::SyncState::Suspended).await;
    assert_eq!(remote.calls(), 0);

    session.sign_in(Session::new(USER, "jwt"));
    wait_until(|| {
        device
            .engine
            .status()
            .last_report
            .is_some_and(|r| r.trigger == SyncTrigger::Reconnect)
    })
    .await;

    assert!(events.lock().unwrap().contains(&AppEvent::SessionChanged {
        user_id: Some(USER.to_string())
    }));

    handle.shutdown().await;
}

#[tokio::test]
async fn test_realtime_change_triggers_cycle() {
    let remote = FakeRemote::new();
    let device = Device::signed_in(&remote).await;

    let config = SyncConfig {
        realtime: true,
        ..quiet_config()
    };
    let handle = device.engine.start(config);
    wait_until(|| {
        remote.subscriber_count() == SyncTable::ALL.len()
            && device.engine.status().last_sync_at.is_some()
    })
    .await;

    let playlist = Playlist::new(USER, "Pushed by server");
    remote.seed(&playlist);
    remote
        .emit_change(RealtimeEvent {
            table: SyncTable::Playlists,
            kind: ChangeKind::Insert,
            row: serde_json::to_value(&playlist).unwrap(),
        })
        .await;

    wait_until(|| {
        device
            .engine
            .status()
            .last_report
            .is_some_and(|r| r.trigger == SyncTrigger::Realtime)
    })
    .await;
    assert!(playlists::get(device.store(), &playlist.id)
        .await
        .unwrap()
        .is_some());

    handle.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_waits_for_running_cycle() {
    let remote = FakeRemote::new();
    let device = Device::signed_in(&remote).await;
    let pause = remote.pause_at(PausePoint::Fetch);

    let handle = device.engine.start(quiet_config());
    pause.entered.notified().await;

    let stopping = tokio::spawn(handle.shutdown());
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!stopping.is_finished());

    pause.release.notify_one();
    stopping.await.unwrap();
    assert!(device.engine.status().last_sync_at.is_some());
    assert!(!device.engine.status().is_running);
}
