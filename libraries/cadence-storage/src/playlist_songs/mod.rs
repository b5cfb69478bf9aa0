use crate::error::{Result, StorageError};
use crate::query::{Order, Value};
use crate::store::{LocalStore, WriteTxn};
use crate::sync_state;
use crate::table::{flag, optional_timestamp, timestamp, LocalTable};
use cadence_core::{time, Playlist, PlaylistSong, SongInfo, SyncRecord};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

impl LocalTable for PlaylistSong {
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "user_id",
        "playlist_id",
        "song_id",
        "song_name",
        "artist",
        "album",
        "duration",
        "source",
        "cover_url",
        "sort_order",
        "created_at",
        "updated_at",
        "is_deleted",
        "deleted_at",
    ];

    fn from_row(row: &SqliteRow) -> std::result::Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            playlist_id: row.try_get("playlist_id")?,
            song_id: row.try_get("song_id")?,
            song_name: row.try_get("song_name")?,
            artist: row.try_get("artist")?,
            album: row.try_get("album")?,
            duration: row.try_get("duration")?,
            source: row.try_get("source")?,
            cover_url: row.try_get("cover_url")?,
            sort_order: row.try_get("sort_order")?,
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
            Value::from(&self.playlist_id),
            Value::from(&self.song_id),
            Value::from(&self.song_name),
            Value::from(self.artist.as_deref()),
            Value::from(self.album.as_deref()),
            Value::from(self.duration),
            Value::from(&self.source),
            Value::from(self.cover_url.as_deref()),
            Value::from(self.sort_order),
            Value::from(self.created_at),
            Value::from(self.updated_at),
            Value::from(self.is_deleted),
            Value::from(self.deleted_at),
        ]
    }
}

/// Entries of a playlist in play order
pub async fn list(store: &LocalStore, playlist_id: &str) -> Result<Vec<PlaylistSong>> {
    store
        .query::<PlaylistSong>()
        .eq("playlist_id", playlist_id)
        .eq("is_deleted", false)
        .order_by("sort_order", Order::Asc)
        .order_by("created_at", Order::Asc)
        .fetch(store)
        .await
}

async fn entries(txn: &mut WriteTxn, playlist_id: &str) -> Result<Vec<PlaylistSong>> {
    let sql = format!(
        "SELECT {} FROM playlist_songs WHERE playlist_id = ? AND is_deleted = 0 \
         ORDER BY sort_order ASC, created_at ASC",
        PlaylistSong::COLUMNS.join(", ")
    );
    let rows = sqlx::query(&sql)
        .bind(playlist_id)
        .fetch_all(txn.conn())
        .await?;
    rows.iter()
        .map(|row| PlaylistSong::from_row(row).map_err(StorageError::from))
        .collect()
}

async fn live_playlist(txn: &mut WriteTxn, playlist_id: &str) -> Result<Playlist> {
    txn.find::<Playlist>(playlist_id)
        .await?
        .map(|found| found.row)
        .filter(|p| !p.is_deleted())
        .ok_or_else(|| StorageError::not_found("Playlist", playlist_id))
}

/// Rewrite positions as 0..n in the given order, saving only moved entries
async fn densify(txn: &mut WriteTxn, entries: Vec<PlaylistSong>) -> Result<()> {
    let now = time::now();
    for (position, mut entry) in (0_i64..).zip(entries) {
        if entry.sort_order != position {
            entry.sort_order = position;
            entry.updated_at = now;
            txn.save(&entry).await?;
        }
    }
    Ok(())
}

/// Append a song to the end of a playlist
///
/// Adding a song that is already in the playlist (same `song_id` and
/// `source`) returns the existing entry.
pub async fn add(
    store: &LocalStore,
    user_id: &str,
    playlist_id: &str,
    song: SongInfo,
) -> Result<PlaylistSong> {
    let mut txn = store.write().await?;
    let mut playlist = live_playlist(&mut txn, playlist_id).await?;
    let current = entries(&mut txn, playlist_id).await?;

    if let Some(existing) = current
        .iter()
        .find(|e| e.song_id == song.song_id && e.source == song.source)
    {
        return Ok(existing.clone());
    }

    let next = current.iter().map(|e| e.sort_order).max().map_or(0, |max| max + 1);
    let entry = PlaylistSong::new(user_id, playlist_id, song, next);
    txn.save(&entry).await?;

    playlist.song_count += 1;
    playlist.updated_at = time::now();
    txn.save(&playlist).await?;

    txn.commit().await?;
    tracing::debug!(playlist_id = %playlist_id, entry_id = %entry.id, "Song added to playlist");
    Ok(entry)
}

/// Remove an entry from its playlist
///
/// The row is deleted locally and a tombstone queues the removal for the
/// backend. Remaining entries are renumbered. Returns `false` if the entry
/// does not exist.
pub async fn remove(store: &LocalStore, entry_id: &str) -> Result<bool> {
    let mut txn = store.write().await?;
    let Some(found) = txn.find::<PlaylistSong>(entry_id).await? else {
        return Ok(false);
    };
    let entry = found.row;

    sqlx::query("DELETE FROM playlist_songs WHERE id = ?")
        .bind(&entry.id)
        .execute(txn.conn())
        .await?;
    txn.touch(PlaylistSong::TABLE);
    sync_state::record_tombstone(txn.conn(), PlaylistSong::TABLE, &entry.id, &entry.user_id)
        .await?;

    let remaining = entries(&mut txn, &entry.playlist_id).await?;
    densify(&mut txn, remaining).await?;

    if let Some(found) = txn.find::<Playlist>(&entry.playlist_id).await? {
        let mut playlist = found.row;
        playlist.song_count = (playlist.song_count - 1).max(0);
        playlist.updated_at = time::now();
        txn.save(&playlist).await?;
    }

    txn.commit().await?;
    tracing::debug!(playlist_id = %entry.playlist_id, entry_id = %entry_id, "Song removed from playlist");
    Ok(true)
}

/// Move an entry to `new_index` (clamped to the playlist length)
pub async fn move_song(store: &LocalStore, entry_id: &str, new_index: usize) -> Result<Vec<PlaylistSong>> {
    let mut txn = store.write().await?;
    let entry = txn
        .find::<PlaylistSong>(entry_id)
        .await?
        .map(|found| found.row)
        .filter(|e| !e.is_deleted())
        .ok_or_else(|| StorageError::not_found("PlaylistSong", entry_id))?;

    let mut ordered = entries(&mut txn, &entry.playlist_id).await?;
    let Some(from) = ordered.iter().position(|e| e.id == entry.id) else {
        return Err(StorageError::not_found("PlaylistSong", entry_id));
    };
    let moved = ordered.remove(from);
    let to = new_index.min(ordered.len());
    ordered.insert(to, moved);

    densify(&mut txn, ordered).await?;
    let result = entries(&mut txn, &entry.playlist_id).await?;
    txn.commit().await?;
    Ok(result)
}
