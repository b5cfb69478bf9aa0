use crate::error::Result;
use crate::query::{Order, Value};
use crate::store::LocalStore;
use crate::table::{flag, optional_timestamp, timestamp, LocalTable};
use cadence_core::{time, DislikedSong, SongInfo};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

impl LocalTable for DislikedSong {
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "user_id",
        "song_id",
        "song_name",
        "artist",
        "source",
        "reason",
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
            source: row.try_get("source")?,
            reason: row.try_get("reason")?,
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
            Value::from(&self.source),
            Value::from(self.reason.as_deref()),
            Value::from(self.created_at),
            Value::from(self.updated_at),
            Value::from(self.is_deleted),
            Value::from(self.deleted_at),
        ]
    }
}

/// Dislike a song; an existing dislike is returned, a removed one revived
pub async fn add(
    store: &LocalStore,
    user_id: &str,
    song: SongInfo,
    reason: Option<&str>,
) -> Result<DislikedSong> {
    let existing = store
        .query::<DislikedSong>()
        .eq("user_id", user_id)
        .eq("song_id", song.song_id.as_str())
        .eq("source", song.source.as_str())
        .order_by("is_deleted", Order::Asc)
        .order_by("updated_at", Order::Desc)
        .fetch_one(store)
        .await?;

    let dislike = match existing {
        Some(live) if !live.is_deleted => return Ok(live),
        Some(mut removed) => {
            removed.is_deleted = false;
            removed.deleted_at = None;
            removed.reason = reason.map(str::to_string);
            removed.updated_at = time::now();
            removed
        }
        None => DislikedSong::new(user_id, song, reason.map(str::to_string)),
    };

    let mut txn = store.write().await?;
    txn.save(&dislike).await?;
    txn.commit().await?;
    Ok(dislike)
}

/// Remove a dislike (soft delete); `false` if the song was not disliked
pub async fn remove(store: &LocalStore, user_id: &str, song_id: &str, source: &str) -> Result<bool> {
    let live = store
        .query::<DislikedSong>()
        .eq("user_id", user_id)
        .eq("song_id", song_id)
        .eq("source", source)
        .eq("is_deleted", false)
        .fetch(store)
        .await?;

    if live.is_empty() {
        return Ok(false);
    }

    let now = time::now();
    let mut txn = store.write().await?;
    for mut dislike in live {
        dislike.is_deleted = true;
        dislike.deleted_at = Some(now);
        dislike.updated_at = now;
        txn.save(&dislike).await?;
    }
    txn.commit().await?;
    Ok(true)
}

pub async fn is_disliked(store: &LocalStore, user_id: &str, song_id: &str, source: &str) -> Result<bool> {
    let count = store
        .query::<DislikedSong>()
        .eq("user_id", user_id)
        .eq("song_id", song_id)
        .eq("source", source)
        .eq("is_deleted", false)
        .count(store)
        .await?;
    Ok(count > 0)
}

pub async fn list(store: &LocalStore, user_id: &str) -> Result<Vec<DislikedSong>> {
    store
        .query::<DislikedSong>()
        .eq("user_id", user_id)
        .eq("is_deleted", false)
        .order_by("created_at", Order::Desc)
        .fetch(store)
        .await
}
