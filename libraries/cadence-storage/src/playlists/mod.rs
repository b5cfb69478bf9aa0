use crate::error::{Result, StorageError};
use crate::query::{Order, Value};
use crate::store::LocalStore;
use crate::table::{flag, optional_timestamp, timestamp, LocalTable};
use cadence_core::{time, Playlist, SyncRecord};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

impl LocalTable for Playlist {
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "user_id",
        "name",
        "description",
        "cover_url",
        "is_public",
        "song_count",
        "play_count",
        "like_count",
        "comment_count",
        "created_at",
        "updated_at",
        "is_deleted",
        "deleted_at",
    ];

    fn from_row(row: &SqliteRow) -> std::result::Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            cover_url: row.try_get("cover_url")?,
            is_public: flag(row, "is_public")?,
            song_count: row.try_get("song_count")?,
            play_count: row.try_get("play_count")?,
            like_count: row.try_get("like_count")?,
            comment_count: row.try_get("comment_count")?,
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
            Value::from(&self.name),
            Value::from(self.description.as_deref()),
            Value::from(self.cover_url.as_deref()),
            Value::from(self.is_public),
            Value::from(self.song_count),
            Value::from(self.play_count),
            Value::from(self.like_count),
            Value::from(self.comment_count),
            Value::from(self.created_at),
            Value::from(self.updated_at),
            Value::from(self.is_deleted),
            Value::from(self.deleted_at),
        ]
    }
}

/// Create a playlist owned by `user_id`
pub async fn create(
    store: &LocalStore,
    user_id: &str,
    name: &str,
    description: Option<&str>,
) -> Result<Playlist> {
    let mut playlist = Playlist::new(user_id, name);
    playlist.description = description.map(str::to_string);

    let mut txn = store.write().await?;
    txn.save(&playlist).await?;
    txn.commit().await?;

    tracing::debug!(playlist_id = %playlist.id, "Playlist created");
    Ok(playlist)
}

/// Get a playlist by id, including soft-deleted ones
pub async fn get(store: &LocalStore, id: &str) -> Result<Option<Playlist>> {
    store.query::<Playlist>().eq("id", id).fetch_one(store).await
}

/// Visible playlists of a user, oldest first
pub async fn list_for_user(store: &LocalStore, user_id: &str) -> Result<Vec<Playlist>> {
    store
        .query::<Playlist>()
        .eq("user_id", user_id)
        .eq("is_deleted", false)
        .order_by("created_at", Order::Asc)
        .fetch(store)
        .await
}

/// Load a live playlist, apply `change`, stamp and save it
async fn update<F>(store: &LocalStore, id: &str, change: F) -> Result<Playlist>
where
    F: FnOnce(&mut Playlist),
{
    let mut txn = store.write().await?;
    let mut playlist = txn
        .find::<Playlist>(id)
        .await?
        .map(|found| found.row)
        .filter(|p| !p.is_deleted())
        .ok_or_else(|| StorageError::not_found("Playlist", id))?;

    change(&mut playlist);
    playlist.updated_at = time::now();

    txn.save(&playlist).await?;
    txn.commit().await?;
    Ok(playlist)
}

pub async fn rename(store: &LocalStore, id: &str, name: &str) -> Result<Playlist> {
    update(store, id, |p| p.name = name.to_string()).await
}

pub async fn update_description(
    store: &LocalStore,
    id: &str,
    description: Option<&str>,
) -> Result<Playlist> {
    update(store, id, |p| p.description = description.map(str::to_string)).await
}

/// Change visibility to other users
pub async fn set_public(store: &LocalStore, id: &str, is_public: bool) -> Result<Playlist> {
    update(store, id, |p| p.is_public = is_public).await
}

/// Soft delete a playlist
///
/// The row is kept with `is_deleted` set so the deletion syncs like any
/// other edit. Its songs are left in place; they are hidden with it.
pub async fn soft_delete(store: &LocalStore, id: &str) -> Result<Playlist> {
    let deleted = update(store, id, |p| {
        p.is_deleted = true;
        p.deleted_at = Some(time::now());
    })
    .await?;

    tracing::debug!(playlist_id = %id, "Playlist deleted");
    Ok(deleted)
}

/// Bring every playlist's `song_count` in line with its songs
///
/// Corrected playlists are queued for push with their `updated_at` left
/// alone. Returns the number of playlists corrected.
pub async fn reconcile_song_counts(store: &LocalStore, user_id: &str) -> Result<u64> {
    let mut txn = store.write().await?;
    let result = sqlx::query(
        r#"
        UPDATE playlists
        SET song_count = (
                SELECT COUNT(*) FROM playlist_songs ps
                WHERE ps.playlist_id = playlists.id AND ps.is_deleted = 0
            ),
            dirty = dirty + 1
        WHERE user_id = ?
          AND song_count <> (
                SELECT COUNT(*) FROM playlist_songs ps
                WHERE ps.playlist_id = playlists.id AND ps.is_deleted = 0
            )
        "#,
    )
    .bind(user_id)
    .execute(txn.conn())
    .await?;

    let corrected = result.rows_affected();
    if corrected > 0 {
        txn.touch(Playlist::TABLE);
        tracing::info!(user_id = %user_id, corrected, "Reconciled playlist song counts");
    }
    txn.commit().await?;
    Ok(corrected)
}
