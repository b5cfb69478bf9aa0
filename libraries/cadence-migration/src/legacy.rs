//! Legacy on-device collections and where they are read from

use crate::error::{MigrationError, Result};
use async_trait::async_trait;
use cadence_core::{parse_interval, time, SongInfo};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Key of the favorites collection
pub const FAVORITES_KEY: &str = "favorites";
/// Key of the play history collection
pub const HISTORY_KEY: &str = "playHistory";
/// Key of the playlists collection
pub const PLAYLISTS_KEY: &str = "playlists";

/// Every legacy key, in migration order
pub const ALL_KEYS: [&str; 3] = [FAVORITES_KEY, HISTORY_KEY, PLAYLISTS_KEY];

/// Source used when a legacy song does not name one
pub const DEFAULT_SOURCE: &str = "local";

/// Key-value store holding the legacy JSON collections
#[async_trait]
pub trait LegacyStore: Send + Sync {
    /// Raw JSON stored under `key`, `None` if there is none
    async fn read(&self, key: &str) -> Result<Option<String>>;

    /// Delete `key`; deleting a missing key succeeds
    async fn remove(&self, key: &str) -> Result<()>;
}

/// Directory with one `<key>.json` file per collection
#[derive(Debug, Clone)]
pub struct FileLegacyStore {
    dir: PathBuf,
}

impl FileLegacyStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

#[async_trait]
impl LegacyStore for FileLegacyStore {
    async fn read(&self, key: &str) -> Result<Option<String>> {
        match tokio::fs::read_to_string(self.path(key)).await {
            Ok(json) => Ok(Some(json)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(key, "No legacy collection");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn remove(&self, key: &str) -> Result<()> {
        match tokio::fs::remove_file(self.path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// A song as the old app stored it
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LegacySong {
    pub id: String,
    pub name: String,
    #[serde(default, alias = "singer")]
    pub artist: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub album: Option<String>,
    /// Track length, `"mm:ss"`
    #[serde(default)]
    pub interval: Option<String>,
    #[serde(default)]
    pub img: Option<String>,
}

impl LegacySong {
    pub fn to_song_info(&self) -> SongInfo {
        let mut song = SongInfo::new(
            &self.id,
            &self.name,
            self.source.as_deref().unwrap_or(DEFAULT_SOURCE),
        );
        song.artist = non_empty(self.artist.as_deref());
        song.album = non_empty(self.album.as_deref());
        song.duration = self
            .interval
            .as_deref()
            .map(parse_interval)
            .filter(|seconds| *seconds > 0);
        song.cover_url = non_empty(self.img.as_deref());
        song
    }
}

/// A play history entry as the old app stored it
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyPlayRecord {
    pub song_id: String,
    pub song_name: String,
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(deserialize_with = "flexible_timestamp")]
    pub played_at: DateTime<Utc>,
    /// Seconds listened
    #[serde(default)]
    pub duration: Option<f64>,
}

impl LegacyPlayRecord {
    pub fn to_song_info(&self) -> SongInfo {
        let mut song = SongInfo::new(
            &self.song_id,
            &self.song_name,
            self.source.as_deref().unwrap_or(DEFAULT_SOURCE),
        );
        song.artist = non_empty(self.artist.as_deref());
        song
    }

    /// Whole seconds listened; missing or negative values count as 0
    pub fn play_seconds(&self) -> i64 {
        self.duration.map_or(0, |d| d.max(0.0).round() as i64)
    }
}

/// A playlist with its songs embedded
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LegacyPlaylist {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub songs: Vec<LegacySong>,
}

/// Parse a whole collection
///
/// Records that do not match the expected shape fail individually; only a
/// document that is not a JSON array fails as a whole.
pub fn parse_collection<T: for<'de> Deserialize<'de>>(
    json: &str,
) -> Result<Vec<std::result::Result<T, MigrationError>>> {
    let items: Vec<serde_json::Value> = serde_json::from_str(json)?;
    Ok(items
        .into_iter()
        .map(|item| {
            serde_json::from_value(item).map_err(|e| MigrationError::InvalidRecord(e.to_string()))
        })
        .collect())
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// RFC 3339 strings or epoch milliseconds
fn flexible_timestamp<'de, D>(deserializer: D) -> std::result::Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Millis(i64),
        Text(String),
    }

    let parsed = match Raw::deserialize(deserializer)? {
        Raw::Millis(ms) => DateTime::from_timestamp_millis(ms),
        Raw::Text(text) => DateTime::parse_from_rfc3339(&text)
            .ok()
            .map(|ts| ts.with_timezone(&Utc)),
    };
    parsed
        .map(|ts| time::from_micros(time::to_micros(ts)))
        .ok_or_else(|| serde::de::Error::custom("unrecognised timestamp"))
}
