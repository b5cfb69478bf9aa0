/// Playlist domain types
use super::table::impl_sync_record;
use super::{new_id, SongInfo, SyncTable};
use crate::time;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user's playlist
///
/// Playlists are soft-deleted so the deletion reaches other devices through
/// the normal last-write-wins comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Playlist {
    pub id: String,

    /// Owner user ID
    pub user_id: String,

    pub name: String,

    pub description: Option<String>,

    pub cover_url: Option<String>,

    /// Visible to other users
    #[serde(default)]
    pub is_public: bool,

    /// Number of non-removed songs, reconciled after sync
    #[serde(default)]
    pub song_count: i64,

    #[serde(default)]
    pub play_count: i64,

    #[serde(default)]
    pub like_count: i64,

    #[serde(default)]
    pub comment_count: i64,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    #[serde(default)]
    pub is_deleted: bool,

    pub deleted_at: Option<DateTime<Utc>>,
}

impl Playlist {
    /// Create a new, empty playlist
    pub fn new(user_id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = time::now();
        Self {
            id: new_id(),
            user_id: user_id.into(),
            name: name.into(),
            description: None,
            cover_url: None,
            is_public: false,
            song_count: 0,
            play_count: 0,
            like_count: 0,
            comment_count: 0,
            created_at: now,
            updated_at: now,
            is_deleted: false,
            deleted_at: None,
        }
    }
}

impl_sync_record!(Playlist, SyncTable::Playlists);

/// A song inside a playlist
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistSong {
    pub id: String,

    pub user_id: String,

    pub playlist_id: String,

    pub song_id: String,

    pub song_name: String,

    pub artist: Option<String>,

    pub album: Option<String>,

    /// Track length in seconds
    pub duration: Option<i64>,

    pub source: String,

    pub cover_url: Option<String>,

    /// Dense position within the playlist; ties broken by `created_at`
    #[serde(default, alias = "position")]
    pub sort_order: i64,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    #[serde(default)]
    pub is_deleted: bool,

    pub deleted_at: Option<DateTime<Utc>>,
}

impl PlaylistSong {
    /// Create a playlist entry for a song at the given position
    pub fn new(
        user_id: impl Into<String>,
        playlist_id: impl Into<String>,
        song: SongInfo,
        sort_order: i64,
    ) -> Self {
        let now = time::now();
        Self {
            id: new_id(),
            user_id: user_id.into(),
            playlist_id: playlist_id.into(),
            song_id: song.song_id,
            song_name: song.song_name,
            artist: song.artist,
            album: song.album,
            duration: song.duration,
            source: song.source,
            cover_url: song.cover_url,
            sort_order,
            created_at: now,
            updated_at: now,
            is_deleted: false,
            deleted_at: None,
        }
    }

    /// Song metadata of this entry
    pub fn song(&self) -> SongInfo {
        SongInfo {
            song_id: self.song_id.clone(),
            song_name: self.song_name.clone(),
            artist: self.artist.clone(),
            album: self.album.clone(),
            duration: self.duration,
            source: self.source.clone(),
            cover_url: self.cover_url.clone(),
        }
    }
}

impl_sync_record!(PlaylistSong, SyncTable::PlaylistSongs);
