/// Favorite song domain type
use super::table::impl_sync_record;
use super::{new_id, SongInfo, SyncTable};
use crate::time;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A song the user marked as favorite
///
/// At most one live row per (user, song, source). The schema does not
/// enforce it; the store checks before inserting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FavoriteSong {
    pub id: String,

    pub user_id: String,

    pub song_id: String,

    pub song_name: String,

    pub artist: Option<String>,

    pub album: Option<String>,

    pub duration: Option<i64>,

    pub source: String,

    pub cover_url: Option<String>,

    /// Comma separated list of available qualities
    pub quality: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    #[serde(default)]
    pub is_deleted: bool,

    pub deleted_at: Option<DateTime<Utc>>,
}

impl FavoriteSong {
    pub fn new(user_id: impl Into<String>, song: SongInfo) -> Self {
        let now = time::now();
        Self {
            id: new_id(),
            user_id: user_id.into(),
            song_id: song.song_id,
            song_name: song.song_name,
            artist: song.artist,
            album: song.album,
            duration: song.duration,
            source: song.source,
            cover_url: song.cover_url,
            quality: None,
            created_at: now,
            updated_at: now,
            is_deleted: false,
            deleted_at: None,
        }
    }

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

impl_sync_record!(FavoriteSong, SyncTable::FavoriteSongs);
