/// Play history domain type
use super::table::impl_sync_record;
use super::{new_id, SongInfo, SyncTable};
use crate::time;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One listening session
///
/// Append-only: rows are never edited after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayRecord {
    pub id: String,

    pub user_id: String,

    pub song_id: String,

    pub song_name: String,

    pub artist: Option<String>,

    pub album: Option<String>,

    pub source: String,

    /// Seconds actually listened
    #[serde(default)]
    pub play_duration: i64,

    /// Track length in seconds, 0 when unknown
    #[serde(default)]
    pub total_duration: i64,

    /// Listened to at least 80% of the track
    #[serde(default)]
    pub completed: bool,

    pub played_at: DateTime<Utc>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    #[serde(default)]
    pub is_deleted: bool,

    pub deleted_at: Option<DateTime<Utc>>,
}

impl PlayRecord {
    /// Build a record for a finished listening session
    ///
    /// The caller is responsible for the minimum-length filter, see
    /// [`crate::PlaySession`].
    pub fn new(
        user_id: impl Into<String>,
        song: SongInfo,
        play_duration: i64,
        completed: bool,
        played_at: DateTime<Utc>,
    ) -> Self {
        let now = time::now();
        Self {
            id: new_id(),
            user_id: user_id.into(),
            song_id: song.song_id,
            song_name: song.song_name,
            artist: song.artist,
            album: song.album,
            source: song.source,
            play_duration,
            total_duration: song.duration.unwrap_or(0),
            completed,
            played_at,
            created_at: now,
            updated_at: now,
            is_deleted: false,
            deleted_at: None,
        }
    }
}

impl_sync_record!(PlayRecord, SyncTable::PlayHistory);
