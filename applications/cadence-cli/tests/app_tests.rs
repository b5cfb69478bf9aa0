//! Integration tests for the command wiring
//!
//! Every test runs as a guest against an unreachable backend, so nothing
//! here may touch the network.

use cadence_cli::{App, AppConfig};
use cadence_core::{AppEvent, SyncState};
use cadence_sync::CycleOutcome;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

fn guest_config(dir: &TempDir) -> AppConfig {
    let mut config = AppConfig::default();
    config.storage.database_url =
        format!("sqlite://{}", dir.path().join("nested/data/cadence.db").display());
    config.remote.url = "http://127.0.0.1:9".to_string();
    config.remote.anon_key = "anon".to_string();
    config.migration.legacy_dir = dir.path().join("legacy");
    config.sync.realtime = false;
    config
}

#[tokio::test]
async fn test_init_creates_database_directory() {
    let dir = tempfile::tempdir().unwrap();
    let _app = App::init(guest_config(&dir)).await.unwrap();

    assert!(dir.path().join("nested/data/cadence.db").exists());
}

#[tokio::test]
async fn test_guest_sync_is_suspended() {
    let dir = tempfile::tempdir().unwrap();
    let app = App::init(guest_config(&dir)).await.unwrap();

    let outcome = app.sync_once().await.unwrap();

    assert_eq!(outcome, CycleOutcome::Suspended);
    assert_eq!(app.engine.status().state, SyncState::Suspended);
}

#[tokio::test]
async fn test_guest_status_has_no_user() {
    let dir = tempfile::tempdir().unwrap();
    let app = App::init(guest_config(&dir)).await.unwrap();

    let status = app.status(5).await.unwrap();

    assert!(status.user_id.is_none());
    assert!(status.cursors.is_empty());
    assert_eq!(status.pending_uploads, 0);
    assert!(status.recent_errors.is_empty());
}

#[tokio::test]
async fn test_migrate_without_legacy_data_does_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let app = App::init(guest_config(&dir)).await.unwrap();

    assert!(app.migrate(true).await.unwrap().is_none());
}

#[tokio::test]
async fn test_migrate_requires_session() {
    let dir = tempfile::tempdir().unwrap();
    let config = guest_config(&dir);
    std::fs::create_dir_all(&config.migration.legacy_dir).unwrap();
    let favorites = config.migration.legacy_dir.join("favorites.json");
    std::fs::write(&favorites, r#"[{ "id": "s-1", "name": "Song" }]"#).unwrap();
    let app = App::init(config).await.unwrap();

    assert!(app.migrate(true).await.is_err());
    assert!(favorites.exists());
}

#[tokio::test]
async fn test_watch_runs_projections_until_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let app = App::init(guest_config(&dir)).await.unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    app.events
        .register(move |event: &AppEvent| sink.lock().unwrap().push(event.clone()));

    app.watch(tokio::time::sleep(std::time::Duration::from_millis(200)))
        .await
        .unwrap();

    let seen = seen.lock().unwrap();
    assert!(seen.contains(&AppEvent::PlaylistsUpdated { count: 0 }));
    assert!(seen.contains(&AppEvent::FavoritesUpdated { count: 0 }));
    assert!(seen.contains(&AppEvent::PlayHistoryUpdated { count: 0 }));
    assert!(seen.contains(&AppEvent::SyncStateChanged {
        state: SyncState::Suspended
    }));
}
