//! Integration tests for favorites, dislikes and play history


use cadence_core::{FavoriteSong, PlaySession};
use cadence_storage::{disliked_songs, favorites, play_history, StorageError};
use chrono::Duration;
use test_helpers::*;

#[tokio::test]
async fn test_favorite_is_deduplicated() {
    let db = TestDb::new().await;
    let store = db.store();

    let first = favorites::add(store, USER, song("a")).await.unwrap();
    let second = favorites::add(store, USER, song("a")).await.unwrap();
    assert_eq!(first.id, second.id);

    assert_eq!(favorites::list(store, USER).await.unwrap().len(), 1);
    assert!(favorites::is_favorited(store, USER, "a", "kw").await.unwrap());
    assert!(!favorites::is_favorited(store, USER, "a", "tx").await.unwrap());
}

#[tokio::test]
async fn test_unfavorite_soft_deletes_and_refavorite_revives() {
    let db = TestDb::new().await;
    let store = db.store();

    let original = favorites::add(store, USER, song("a")).await.unwrap();
    assert!(favorites::remove(store, USER, "a", "kw").await.unwrap());
    assert!(!favorites::remove(store, USER, "a", "kw").await.unwrap());

    let removed = store
        .find::<FavoriteSong>(&original.id)
        .await
        .unwrap()
        .unwrap();
    assert!(removed.row.is_deleted);
    assert!(favorites::list(store, USER).await.unwrap().is_empty());

    let revived = favorites::add(store, USER, song("a")).await.unwrap();
    assert_eq!(revived.id, original.id);
    assert!(!revived.is_deleted);
    assert!(revived.deleted_at.is_none());
}

#[tokio::test]
async fn test_dislikes() {
    let db = TestDb::new().await;
    let store = db.store();

    let dislike = disliked_songs::add(store, USER, song("x"), Some("too loud"))
        .await
        .unwrap();
    let again = disliked_songs::add(store, USER, song("x"), None).await.unwrap();
    assert_eq!(dislike.id, again.id);
    assert!(disliked_songs::is_disliked(store, USER, "x", "kw").await.unwrap());

    assert!(disliked_songs::remove(store, USER, "x", "kw").await.unwrap());
    assert!(!disliked_songs::is_disliked(store, USER, "x", "kw").await.unwrap());
    assert!(disliked_songs::list(store, USER).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_play_history_is_append_only() {
    let db = TestDb::new().await;
    let store = db.store();

    let session = PlaySession::start(song("a"));
    let record = session
        .finish_at(USER, session.started_at + Duration::seconds(170))
        .unwrap();
    assert!(record.completed);

    play_history::append(store, &record).await.unwrap();
    let err = play_history::append(store, &record).await.unwrap_err();
    assert!(matches!(err, StorageError::AlreadyExists { .. }));

    let recent = play_history::list_recent(store, USER, 10).await.unwrap();
    assert_eq!(recent, vec![record]);
    assert_eq!(play_history::count(store, USER).await.unwrap(), 1);
}

#[tokio::test]
async fn test_play_history_newest_first() {
    let db = TestDb::new().await;
    let store = db.store();

    let start = cadence_core::time::now();
    for (i, id) in ["a", "b", "c"].iter().enumerate() {
        let session = PlaySession::start_at(song(id), start + Duration::minutes(i as i64));
        let record = session.finish_with_duration(USER, 30).unwrap();
        play_history::append(store, &record).await.unwrap();
    }

    let recent = play_history::list_recent(store, USER, 2).await.unwrap();
    let ids: Vec<_> = recent.iter().map(|r| r.song_id.as_str()).collect();
    assert_eq!(ids, vec!["c", "b"]);
}
