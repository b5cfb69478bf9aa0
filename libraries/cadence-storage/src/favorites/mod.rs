use crate::error::{Result, StorageError};
use crate::query::{Order, Value};
use crate::store::{LocalStore, WriteTxn};
use crate::table::{flag, optional_timestamp, timestamp, LocalTable};
use cadence_core::{time, FavoriteSong, SongInfo};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

impl LocalTable for FavoriteSong {
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "user_id",
        "song_id",
        "song_name",
        "artist",
        "album",
        "duration",
        "source",
        "cover_url",
        "quality",
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
            duration: row.try_get("duration")?,
            source: row.try_get("source")?,
            cover_url: row.try_get("cover_url")?,
            quality: row.try_get("quality")?,
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
            Value::from(self.duration),
            Value::from(&self.source),
            Value::from(self.cover_url.as_deref()),
            Value::from(self.quality.as_deref()),
            Value::from(self.created_at),
            Value::from(self.updated_at),
            Value::from(self.is_deleted),
            Value::from(self.deleted_at),
        ]
    }
}

/// All rows for a song, live ones first, then most recently updated
async fn rows_for_song(
    txn: &mut WriteTxn,
    user_id: &str,
    song_id: &str,
    source: &str,
) -> Result<Vec<FavoriteSong>> {
    let sql = format!(
        "SELECT {} FROM favorite_songs WHERE user_id = ? AND song_id = ? AND source = ? \
         ORDER BY is_deleted ASC, updated_at DESC",
        FavoriteSong::COLUMNS.join(", ")
    );
    let rows = sqlx::query(&sql)
        .bind(user_id)
        .bind(song_id)
        .bind(source)
        .fetch_all(txn.conn())
        .await?;
    rows.iter()
        .map(|row| FavoriteSong::from_row(row).map_err(StorageError::from))
        .collect()
}

/// Favorite a song
///
/// Returns the existing row if the song is already a favorite; a previously
/// removed favorite is revived instead of duplicated.
pub async fn add(store: &LocalStore, user_id: &str, song: SongInfo) -> Result<FavoriteSong> {
    let mut txn = store.write().await?;
    let existing = rows_for_song(&mut txn, user_id, &song.song_id, &song.source).await?;

    let favorite = match existing.into_iter().next() {
        Some(live) if !live.is_deleted => return Ok(live),
        Some(mut removed) => {
            removed.is_deleted = false;
            removed.deleted_at = None;
            removed.updated_at = time::now();
            removed
        }
        None => FavoriteSong::new(user_id, song),
    };

    txn.save(&favorite).await?;
    txn.commit().await?;
    tracing::debug!(song_id = %favorite.song_id, "Favorite added");
    Ok(favorite)
}

/// Unfavorite a song (soft delete)
///
/// Returns `false` when the song was not a favorite.
pub async fn remove(store: &LocalStore, user_id: &str, song_id: &str, source: &str) -> Result<bool> {
    let mut txn = store.write().await?;
    let live: Vec<_> = rows_for_song(&mut txn, user_id, song_id, source)
        .await?
        .into_iter()
        .filter(|f| !f.is_deleted)
        .collect();

    if live.is_empty() {
        return Ok(false);
    }

    let now = time::now();
    for mut favorite in live {
        favorite.is_deleted = true;
        favorite.deleted_at = Some(now);
        favorite.updated_at = now;
        txn.save(&favorite).await?;
    }

    txn.commit().await?;
    tracing::debug!(song_id = %song_id, "Favorite removed");
    Ok(true)
}

pub async fn is_favorited(store: &LocalStore, user_id: &str, song_id: &str, source: &str) -> Result<bool> {
    let count = store
        .query::<FavoriteSong>()
        .eq("user_id", user_id)
        .eq("song_id", song_id)
        .eq("source", source)
        .eq("is_deleted", false)
        .count(store)
        .await?;
    Ok(count > 0)
}

/// Live favorites, most recently added first
pub async fn list(store: &LocalStore, user_id: &str) -> Result<Vec<FavoriteSong>> {
    store
        .query::<FavoriteSong>()
        .eq("user_id", user_id)
        .eq("is_deleted", false)
        .order_by("created_at", Order::Desc)
        .fetch(store)
        .await
}
