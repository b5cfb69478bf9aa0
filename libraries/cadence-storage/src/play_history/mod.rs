use crate::error::{Result, StorageError};
use crate::query::{Order, Value};
use crate::store::LocalStore;
use crate::table::{flag, optional_timestamp, timestamp, LocalTable};
use cadence_core::PlayRecord;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

impl LocalTable for PlayRecord {
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "user_id",
        "song_id",
        "song_name",
        "artist",
        "album",
        "source",
        "play_duration",
        "total_duration",
        "completed",
        "played_at",
        "created_at",
        "updated_at",
        "is_deleted",
        "deleted_at",
    ];

    fn from_row(row: &SqliteRow) -> std::result::Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            song_id: row.try_get("song_id")?,
            song_name: row.try_get("song_name")?,
            artist: row.try_get("artist")?,
            album: row.try_get("album")?,
            source: row.try_get("source")?,
            play_duration: row.try_get("play_duration")?,
            total_duration: row.try_get("total_duration")?,
            completed: flag(row, "completed")?,
            played_at: timestamp(row, "played_at")?,
            created_at: timestamp(row, "created_at")?,
            updated_at: timestamp(row, "updated_at")?,
            is_deleted: flag(row, "is_deleted")?,
            deleted_at: optional_timestamp(row, "deleted_at")?,
        })
    }

    fn values(&self) -> Vec<Value> {
        vec![
            Value::from(&self.id),
            Value::from(&self.user_id),
            Value::from(&self.song_id),
            Value::from(&self.song_name),
            Value::from(self.artist.as_deref()),
            Value::from(self.album.as_deref()),
            Value::from(&self.source),
            Value::from(self.play_duration),
            Value::from(self.total_duration),
            Value::from(self.completed),
            Value::from(self.played_at),
            Value::from(self.created_at),
            Value::from(self.updated_at),
            Value::from(self.is_deleted),
            Value::from(self.deleted_at),
        ]
    }
}

/// Append a finished listening session
///
/// History is append-only: a record whose id is already stored is rejected.
pub async fn append(store: &LocalStore, record: &PlayRecord) -> Result<()> {
    let mut txn = store.write().await?;
    if txn.find::<PlayRecord>(&record.id).await?.is_some() {
        return Err(StorageError::AlreadyExists {
            entity: "PlayRecord".to_string(),
            id: record.id.clone(),
        });
    }
    txn.save(record).await?;
    txn.commit().await?;

    tracing::debug!(song_id = %record.song_id, completed = record.completed, "Play recorded");
    Ok(())
}

/// Most recent plays of a user, newest first
pub async fn list_recent(store: &LocalStore, user_id: &str, limit: i64) -> Result<Vec<PlayRecord>> {
    store
        .query::<PlayRecord>()
        .eq("user_id", user_id)
        .eq("is_deleted", false)
        .order_by("played_at", Order::Desc)
        .limit(limit)
        .fetch(store)
        .await
}

pub async fn count(store: &LocalStore, user_id: &str) -> Result<i64> {
    store
        .query::<PlayRecord>()
        .eq("user_id", user_id)
        .eq("is_deleted", false)
        .count(store)
        .await
}
