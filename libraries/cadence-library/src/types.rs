//! Player-facing shapes of the synced rows

use cadence_core::{
    parse_interval, DislikedSong, FavoriteSong, PlayRecord, Playlist, PlaylistSong, SongInfo,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Prefix marking a list as backed by the local store
pub const LIST_ID_PREFIX: &str = "db_";

/// Shown when a song has no artist
pub const UNKNOWN_ARTIST: &str = "Unknown artist";

/// Player list id for a stored playlist
pub fn list_id(playlist_id: &str) -> String {
    format!("{LIST_ID_PREFIX}{playlist_id}")
}

/// Stored playlist id behind a player list id
pub fn playlist_id(list_id: &str) -> Option<&str> {
    list_id.strip_prefix(LIST_ID_PREFIX)
}

/// Format seconds as `mm:ss`
///
/// Unknown or non-positive lengths are `None`.
pub fn format_interval(seconds: Option<i64>) -> Option<String> {
    match seconds {
        Some(s) if s > 0 => Some(format!("{:02}:{:02}", s / 60, s % 60)),
        _ => None,
    }
}

/// A user playlist as the list screen shows it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserList {
    /// `db_<playlist id>`
    pub id: String,

    pub name: String,

    /// The stored playlist id
    pub source_list_id: String,

    pub updated_at: DateTime<Utc>,
}

impl From<&Playlist> for UserList {
    fn from(playlist: &Playlist) -> Self {
        Self {
            id: list_id(&playlist.id),
            name: playlist.name.clone(),
            source_list_id: playlist.id.clone(),
            updated_at: playlist.updated_at,
        }
    }
}

/// A playable song as the player consumes it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MusicInfo {
    /// Song ID within its source catalogue
    pub id: String,

    pub name: String,

    pub singer: String,

    pub album: Option<String>,

    /// Track length as `mm:ss`
    pub interval: Option<String>,

    pub source: String,

    /// Cover image URL
    pub img: Option<String>,
}

impl MusicInfo {
    fn from_parts(
        song_id: &str,
        song_name: &str,
        artist: Option<&str>,
        album: Option<&str>,
        duration: Option<i64>,
        source: &str,
        cover_url: Option<&str>,
    ) -> Self {
        Self {
            id: song_id.to_string(),
            name: song_name.to_string(),
            singer: artist
                .filter(|a| !a.is_empty())
                .unwrap_or(UNKNOWN_ARTIST)
                .to_string(),
            album: album.map(str::to_string),
            interval: format_interval(duration),
            source: source.to_string(),
            img: cover_url.map(str::to_string),
        }
    }

    /// Song metadata for storing this song
    pub fn to_song_info(&self) -> SongInfo {
        let duration = self
            .interval
            .as_deref()
            .map(parse_interval)
            .filter(|&seconds| seconds > 0);

        SongInfo {
            song_id: self.id.clone(),
            song_name: self.name.clone(),
            artist: Some(self.singer.clone()).filter(|s| s != UNKNOWN_ARTIST),
            album: self.album.clone(),
            duration,
            source: self.source.clone(),
            cover_url: self.img.clone(),
        }
    }
}

impl From<&SongInfo> for MusicInfo {
    fn from(song: &SongInfo) -> Self {
        Self::from_parts(
            &song.song_id,
            &song.song_name,
            song.artist.as_deref(),
            song.album.as_deref(),
            song.duration,
            &song.source,
            song.cover_url.as_deref(),
        )
    }
}

impl From<&PlaylistSong> for MusicInfo {
    fn from(entry: &PlaylistSong) -> Self {
        Self::from_parts(
            &entry.song_id,
            &entry.song_name,
            entry.artist.as_deref(),
            entry.album.as_deref(),
            entry.duration,
            &entry.source,
            entry.cover_url.as_deref(),
        )
    }
}

impl From<&FavoriteSong> for MusicInfo {
    fn from(favorite: &FavoriteSong) -> Self {
        Self::from(&favorite.song())
    }
}

impl From<&DislikedSong> for MusicInfo {
    fn from(dislike: &DislikedSong) -> Self {
        Self::from_parts(
            &dislike.song_id,
            &dislike.song_name,
            dislike.artist.as_deref(),
            None,
            None,
            &dislike.source,
            None,
        )
    }
}

/// One row of the history screen
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub music: MusicInfo,
    pub played_at: DateTime<Utc>,
    /// Seconds actually listened
    pub play_duration: i64,
    pub completed: bool,
}

impl From<&PlayRecord> for HistoryEntry {
    fn from(record: &PlayRecord) -> Self {
        let total = Some(record.total_duration);
        Self {
            music: MusicInfo::from_parts(
                &record.song_id,
                &record.song_name,
                record.artist.as_deref(),
                record.album.as_deref(),
                total,
                &record.source,
                None,
            ),
            played_at: record.played_at,
            play_duration: record.play_duration,
            completed: record.completed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_ids_round_trip_through_prefix() {
        assert_eq!(list_id("abc"), "db_abc");
        assert_eq!(playlist_id("db_abc"), Some("abc"));
        assert_eq!(playlist_id("default"), None);
    }

    #[test]
    fn interval_formatting() {
        assert_eq!(format_interval(Some(230)).as_deref(), Some("03:50"));
        assert_eq!(format_interval(Some(3600)).as_deref(), Some("60:00"));
        assert_eq!(format_interval(Some(0)), None);
        assert_eq!(format_interval(None), None);
    }

    #[test]
    fn missing_artist_shows_placeholder() {
        let music = MusicInfo::from(&SongInfo::new("s-1", "Untitled", "kw"));
        assert_eq!(music.singer, UNKNOWN_ARTIST);
        assert_eq!(music.interval, None);

        let song = music.to_song_info();
        assert_eq!(song.artist, None);
        assert_eq!(song.duration, None);
    }

    #[test]
    fn music_info_keeps_song_metadata() {
        let song = SongInfo::new("s-1", "Song", "tx")
            .with_artist("Artist")
            .with_album("Album")
            .with_duration(245);

        let music = MusicInfo::from(&song);
        assert_eq!(music.interval.as_deref(), Some("04:05"));
        assert_eq!(music.to_song_info(), song);
    }
}
