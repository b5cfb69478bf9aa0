//! Integration tests for the sync-facing store operations
//!
//! - Last-write-wins guarded overwrite
//! - Compare-and-clear of the dirty counter
//! - Cursors, tombstones and the error log


use cadence_core::{time, Playlist, SyncTable};
use cadence_storage::sync_state::{self, SyncErrorEntry};
use cadence_storage::{playlists, LocalTable};
use chrono::Duration;
use test_helpers::*;

#[tokio::test]
async fn test_apply_remote_inserts_clean() {
    let db = TestDb::new().await;
    let store = db.store();

    let remote = Playlist::new(USER, "From server");
    let mut txn = store.write().await.unwrap();
    assert!(txn.apply_remote(&remote).await.unwrap());
    txn.commit().await.unwrap();

    let found = store.find::<Playlist>(&remote.id).await.unwrap().unwrap();
    assert_eq!(found.row, remote);
    assert_eq!(found.dirty, 0);
}

#[tokio::test]
async fn test_apply_remote_keeps_newer_local_row() {
    let db = TestDb::new().await;
    let store = db.store();

    let local = playlists::create(store, USER, "Local", None).await.unwrap();

    let mut stale = local.clone();
    stale.name = "Stale".to_string();
    stale.updated_at = local.updated_at - Duration::seconds(10);

    let mut txn = store.write().await.unwrap();
    assert!(!txn.apply_remote(&stale).await.unwrap());
    txn.commit().await.unwrap();

    let found = store.find::<Playlist>(&local.id).await.unwrap().unwrap();
    assert_eq!(found.row.name, "Local");
    assert_eq!(found.dirty, 1);
}

#[tokio::test]
async fn test_apply_remote_wins_ties() {
    let db = TestDb::new().await;
    let store = db.store();

    let local = playlists::create(store, USER, "Local", None).await.unwrap();
    let mut remote = local.clone();
    remote.name = "Remote".to_string();

    let mut txn = store.write().await.unwrap();
    assert!(txn.apply_remote(&remote).await.unwrap());
    txn.commit().await.unwrap();

    let found = store.find::<Playlist>(&local.id).await.unwrap().unwrap();
    assert_eq!(found.row.name, "Remote");
    assert_eq!(found.dirty, 0);
}

#[tokio::test]
async fn test_mark_clean_is_compare_and_clear() {
    let db = TestDb::new().await;
    let store = db.store();

    let playlist = playlists::create(store, USER, "A", None).await.unwrap();
    let collected = store.dirty_rows::<Playlist>(USER).await.unwrap();
    assert_eq!(collected.len(), 1);
    let captured = collected[0].dirty;

    // Written again while the push was in flight
    playlists::rename(store, &playlist.id, "B").await.unwrap();

    assert!(!store.mark_clean::<Playlist>(&playlist.id, captured).await.unwrap());
    let still = store.dirty_rows::<Playlist>(USER).await.unwrap();
    assert_eq!(still.len(), 1);
    assert_eq!(still[0].row.name, "B");

    assert!(store
        .mark_clean::<Playlist>(&playlist.id, still[0].dirty)
        .await
        .unwrap());
    assert!(store.dirty_rows::<Playlist>(USER).await.unwrap().is_empty());
    assert_eq!(store.pending_count(USER).await.unwrap(), 0);
}

#[tokio::test]
async fn test_failed_transaction_leaves_no_trace() {
    let db = TestDb::new().await;
    let store = db.store();

    let playlist = Playlist::new(USER, "Never");
    {
        let mut txn = store.write().await.unwrap();
        txn.save(&playlist).await.unwrap();
        let result = sqlx::query("INSERT INTO no_such_table VALUES (1)")
            .execute(txn.conn())
            .await;
        assert!(result.is_err());
        // dropped without commit
    }

    assert!(store.find::<Playlist>(&playlist.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_cursor_only_moves_forward() {
    let db = TestDb::new().await;
    let store = db.store();

    assert!(sync_state::get_cursor(store, USER, SyncTable::Playlists)
        .await
        .unwrap()
        .is_none());

    let t1 = time::now();
    let t0 = t1 - Duration::minutes(5);
    sync_state::set_cursor(store, USER, SyncTable::Playlists, t1).await.unwrap();
    sync_state::set_cursor(store, USER, SyncTable::Playlists, t0).await.unwrap();

    assert_eq!(
        sync_state::get_cursor(store, USER, SyncTable::Playlists).await.unwrap(),
        Some(t1)
    );
    assert_eq!(
        sync_state::cursors(store, USER).await.unwrap(),
        vec![(SyncTable::Playlists, t1)]
    );
}

#[tokio::test]
async fn test_tombstones_clear() {
    let db = TestDb::new().await;
    let store = db.store();

    let playlist = playlists::create(store, USER, "Mix", None).await.unwrap();
    let entry = cadence_storage::playlist_songs::add(store, USER, &playlist.id, song("a"))
        .await
        .unwrap();
    cadence_storage::playlist_songs::remove(store, &entry.id).await.unwrap();

    let cleared = sync_state::clear_tombstones(store, SyncTable::PlaylistSongs, &[entry.id.clone()])
        .await
        .unwrap();
    assert_eq!(cleared, 1);
    assert!(sync_state::tombstones(store, USER, SyncTable::PlaylistSongs)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_error_log_newest_first() {
    let db = TestDb::new().await;
    let store = db.store();

    let now = time::now();
    for (i, kind) in ["network", "rejected"].iter().enumerate() {
        sync_state::log_error(
            store,
            &SyncErrorEntry {
                cycle_id: "cycle-1".to_string(),
                table: Some(SyncTable::FavoriteSongs),
                kind: (*kind).to_string(),
                message: format!("failure {i}"),
                occurred_at: now + Duration::seconds(i as i64),
            },
        )
        .await
        .unwrap();
    }

    let errors = sync_state::recent_errors(store, 10).await.unwrap();
    assert_eq!(errors.len(), 2);
    assert_eq!(errors[0].kind, "rejected");
    assert_eq!(errors[0].table, Some(SyncTable::FavoriteSongs));

    let pruned = sync_state::prune_errors(store, now + Duration::seconds(1))
        .await
        .unwrap();
    assert_eq!(pruned, 1);
}

#[test]
fn test_columns_start_with_id() {
    assert_eq!(<Playlist as LocalTable>::COLUMNS[0], "id");
}
