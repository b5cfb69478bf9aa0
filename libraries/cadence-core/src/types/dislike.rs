/// Disliked song domain type
use super::table::impl_sync_record;
use super::{new_id, SongInfo, SyncTable};
use crate::time;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A song excluded from recommendations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DislikedSong {
    pub id: String,

    pub user_id: String,

    pub song_id: String,

    pub song_name: String,

    pub artist: Option<String>,

    pub source: String,

    /// Free-form reason given by the user
    pub reason: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    #[serde(default)]
    pub is_deleted: bool,

    pub deleted_at: Option<DateTime<Utc>>,
}

impl DislikedSong {
    pub fn new(user_id: impl Into<String>, song: SongInfo, reason: Option<String>) -> Self {
        let now = time::now();
        Self {
            id: new_id(),
            user_id: user_id.into(),
            song_id: song.song_id,
            song_name: song.song_name,
            artist: song.artist,
            source: song.source,
            reason,
            created_at: now,
            updated_at: now,
            is_deleted: false,
            deleted_at: None,
        }
    }
}

impl_sync_record!(DislikedSong, SyncTable::DislikedSongs);
