/// Sync contract shared by the local store, remote client and engine
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Tables kept in sync between the device and the backend
///
/// The same name is used for the local `SQLite` table and the remote table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncTable {
    Playlists,
    PlaylistSongs,
    FavoriteSongs,
    PlayHistory,
    DislikedSongs,
}

impl SyncTable {
    /// Every synced table, parents before children
    pub const ALL: [SyncTable; 5] = [
        Self::Playlists,
        Self::PlaylistSongs,
        Self::FavoriteSongs,
        Self::PlayHistory,
        Self::DislikedSongs,
    ];

    /// Convert to string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Playlists => "playlists",
            Self::PlaylistSongs => "playlist_songs",
            Self::FavoriteSongs => "favorite_songs",
            Self::PlayHistory => "play_history",
            Self::DislikedSongs => "disliked_songs",
        }
    }

    /// Parse from string
    ///
    /// Accepts `favorites` as an alias of `favorite_songs`.
    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "playlists" => Some(Self::Playlists),
            "playlist_songs" => Some(Self::PlaylistSongs),
            "favorite_songs" | "favorites" => Some(Self::FavoriteSongs),
            "play_history" => Some(Self::PlayHistory),
            "disliked_songs" => Some(Self::DislikedSongs),
            _ => None,
        }
    }
}

impl std::fmt::Display for SyncTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// State of the sync engine
///
/// A cycle walks `Idle -> Pulling -> Reconciling -> Pushing -> Idle`.
/// `Suspended` is entered from any state when the session is missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    #[default]
    Idle,
    Pulling,
    Reconciling,
    Pushing,
    Suspended,
}

impl SyncState {
    /// Convert to string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Pulling => "pulling",
            Self::Reconciling => "reconciling",
            Self::Pushing => "pushing",
            Self::Suspended => "suspended",
        }
    }

    /// Whether a new cycle may start from this state
    #[must_use]
    pub fn accepts_trigger(&self) -> bool {
        matches!(self, Self::Idle | Self::Suspended)
    }
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A row that participates in last-write-wins sync
pub trait SyncRecord:
    Serialize + DeserializeOwned + Clone + PartialEq + std::fmt::Debug + Send + Sync + 'static
{
    /// Table the row lives in
    const TABLE: SyncTable;

    fn id(&self) -> &str;

    fn user_id(&self) -> &str;

    /// Last modification time, the conflict resolution key
    fn updated_at(&self) -> DateTime<Utc>;

    fn is_deleted(&self) -> bool;
}

macro_rules! impl_sync_record {
    ($ty:ty, $table:expr) => {
        impl $crate::types::SyncRecord for $ty {
            const TABLE: $crate::types::SyncTable = $table;

            fn id(&self) -> &str {
                &self.id
            }

            fn user_id(&self) -> &str {
                &self.user_id
            }

            fn updated_at(&self) -> chrono::DateTime<chrono::Utc> {
                self.updated_at
            }

            fn is_deleted(&self) -> bool {
                self.is_deleted
            }
        }
    };
}

pub(crate) use impl_sync_record;
