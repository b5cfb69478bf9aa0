/// Denormalized song metadata carried by every song-bearing row
use serde::{Deserialize, Serialize};

/// Song metadata as the player knows it
///
/// Songs live in external catalogues (`source` names the catalogue), so rows
/// copy the fields they need instead of referencing a songs table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SongInfo {
    /// Song ID within its source catalogue
    pub song_id: String,

    pub song_name: String,

    pub artist: Option<String>,

    pub album: Option<String>,

    /// Track length in seconds
    pub duration: Option<i64>,

    /// Catalogue the song comes from (`kw`, `tx`, `local`, ...)
    pub source: String,

    pub cover_url: Option<String>,
}

impl SongInfo {
    /// Create song metadata with only the required fields
    pub fn new(
        song_id: impl Into<String>,
        song_name: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            song_id: song_id.into(),
            song_name: song_name.into(),
            artist: None,
            album: None,
            duration: None,
            source: source.into(),
            cover_url: None,
        }
    }

    #[must_use]
    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.artist = Some(artist.into());
        self
    }

    #[must_use]
    pub fn with_album(mut self, album: impl Into<String>) -> Self {
        self.album = Some(album.into());
        self
    }

    #[must_use]
    pub fn with_duration(mut self, seconds: i64) -> Self {
        self.duration = Some(seconds);
        self
    }
}
