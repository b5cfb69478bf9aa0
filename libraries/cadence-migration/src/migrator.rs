//! Upload of the legacy collections

use crate::error::{MigrationError, Result};
use crate::legacy::{
    parse_collection, LegacyPlayRecord, LegacyPlaylist, LegacySong, LegacyStore, ALL_KEYS,
    FAVORITES_KEY, HISTORY_KEY, PLAYLISTS_KEY,
};
use crate::report::{CategoryReport, MigrationReport};
use cadence_core::{FavoriteSong, PlayRecord, Playlist, PlaylistSong, SessionContext, SyncRecord};
use cadence_remote::{RemoteApi, RemoteApiExt, RemoteError};
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Namespace of the ids given to migrated records
const LEGACY_NAMESPACE: Uuid = Uuid::from_u128(0x6c1f_3b2e_9a4d_4f7e_8c05_d2b1_7e93_a4c6);

/// Id of a migrated record, the same on every run for the same user
fn legacy_id(user_id: &str, key: &str, identity: &str) -> String {
    Uuid::new_v5(&LEGACY_NAMESPACE, format!("{user_id}/{key}/{identity}").as_bytes()).to_string()
}

/// Result of one collection
#[derive(Debug, Default)]
struct Category {
    report: CategoryReport,
    errors: Vec<String>,
}

impl Category {
    fn fail(&mut self, message: String) {
        warn!(%message, "Legacy record not migrated");
        self.report.record(false);
        self.errors.push(message);
    }
}

/// Moves legacy on-device data to the backend
///
/// Each record is created remotely on its own; a failing record is counted
/// and reported without stopping the others. The legacy data is never
/// modified except by an explicit [`Migrator::clear_local_data`].
///
/// Record ids derive from the user and the legacy record, so running again
/// after a partial failure only fills the gaps: rows that already exist
/// answer with a conflict and count as migrated.
pub struct Migrator {
    remote: Arc<dyn RemoteApi>,
    session: SessionContext,
    legacy: Arc<dyn LegacyStore>,
}

impl Migrator {
    pub fn new(
        remote: Arc<dyn RemoteApi>,
        session: SessionContext,
        legacy: Arc<dyn LegacyStore>,
    ) -> Self {
        Self {
            remote,
            session,
            legacy,
        }
    }

    /// Whether any legacy collection is still present
    pub async fn has_legacy_data(&self) -> Result<bool> {
        for key in ALL_KEYS {
            if self.legacy.read(key).await?.is_some() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Migrate favorites, play history and playlists concurrently
    #[instrument(skip(self))]
    pub async fn migrate_all(&self) -> Result<MigrationReport> {
        let user_id = self
            .session
            .user_id()
            .ok_or(MigrationError::Unauthenticated)?;

        info!("Legacy data migration started");
        let (favorites, history, playlists) = tokio::join!(
            self.migrate_favorites(&user_id),
            self.migrate_history(&user_id),
            self.migrate_playlists(&user_id),
        );

        let mut errors = favorites.errors;
        errors.extend(history.errors);
        errors.extend(playlists.errors);

        let report = MigrationReport {
            success: favorites.report.failed == 0
                && history.report.failed == 0
                && playlists.report.failed == 0,
            favorites: favorites.report,
            play_history: history.report,
            playlists: playlists.report,
            errors,
        };

        info!(
            success = report.success,
            migrated = report.migrated(),
            failed = report.failed(),
            "Legacy data migration finished"
        );
        Ok(report)
    }

    /// Delete every legacy collection
    ///
    /// Irreversible; call only after a fully successful migration.
    pub async fn clear_local_data(&self) -> Result<()> {
        for key in ALL_KEYS {
            self.legacy.remove(key).await?;
        }
        info!("Legacy data cleared");
        Ok(())
    }

    /// Read and parse one collection
    ///
    /// A missing collection is empty; an unreadable one is reported and
    /// treated as empty.
    async fn load<T: DeserializeOwned>(
        &self,
        key: &str,
        category: &mut Category,
    ) -> Vec<Result<T>> {
        let json = match self.legacy.read(key).await {
            Ok(Some(json)) => json,
            Ok(None) => return Vec::new(),
            Err(e) => {
                category.errors.push(format!("Failed to read {key}: {e}"));
                return Vec::new();
            }
        };

        match parse_collection(&json) {
            Ok(records) => {
                category.report.total = records.len();
                records
            }
            Err(e) => {
                category.errors.push(format!("Failed to read {key}: {e}"));
                Vec::new()
            }
        }
    }

    async fn migrate_favorites(&self, user_id: &str) -> Category {
        let mut category = Category::default();
        let records = self.load::<LegacySong>(FAVORITES_KEY, &mut category).await;

        for (index, record) in records.into_iter().enumerate() {
            let song = match record {
                Ok(song) => song,
                Err(e) => {
                    category.fail(format!("Favorite #{}: {e}", index + 1));
                    continue;
                }
            };

            let mut favorite = FavoriteSong::new(user_id, song.to_song_info());
            favorite.id = legacy_id(
                user_id,
                FAVORITES_KEY,
                &format!("{}/{}", favorite.source, favorite.song_id),
            );
            match self.create_once(&favorite).await {
                Ok(_) => category.report.record(true),
                Err(e) => category.fail(format!("Favorite '{}': {e}", song.name)),
            }
        }
        category
    }

    async fn migrate_history(&self, user_id: &str) -> Category {
        let mut category = Category::default();
        let records = self.load::<LegacyPlayRecord>(HISTORY_KEY, &mut category).await;

        for (index, record) in records.into_iter().enumerate() {
            let entry = match record {
                Ok(entry) => entry,
                Err(e) => {
                    category.fail(format!("Play record #{}: {e}", index + 1));
                    continue;
                }
            };

            // The old app never stored track length, so nothing counts as completed
            let mut record = PlayRecord::new(
                user_id,
                entry.to_song_info(),
                entry.play_seconds(),
                false,
                entry.played_at,
            );
            record.id = legacy_id(
                user_id,
                HISTORY_KEY,
                &format!(
                    "{}/{}/{}",
                    record.source,
                    record.song_id,
                    entry.played_at.timestamp_millis()
                ),
            );
            match self.create_once(&record).await {
                Ok(_) => category.report.record(true),
                Err(e) => category.fail(format!("Play record '{}': {e}", entry.song_name)),
            }
        }
        category
    }

    async fn migrate_playlists(&self, user_id: &str) -> Category {
        let mut category = Category::default();
        let records = self.load::<LegacyPlaylist>(PLAYLISTS_KEY, &mut category).await;

        for (index, record) in records.into_iter().enumerate() {
            let legacy = match record {
                Ok(legacy) => legacy,
                Err(e) => {
                    category.fail(format!("Playlist #{}: {e}", index + 1));
                    continue;
                }
            };

            match self.migrate_playlist(user_id, &legacy).await {
                Ok(()) => category.report.record(true),
                Err(e) => category.fail(format!("Playlist '{}': {e}", legacy.name)),
            }
        }
        category
    }

    /// Create the playlist, then its songs in one batch
    async fn migrate_playlist(&self, user_id: &str, legacy: &LegacyPlaylist) -> Result<()> {
        let mut seen = HashSet::new();
        let songs: Vec<_> = legacy
            .songs
            .iter()
            .map(LegacySong::to_song_info)
            .filter(|song| seen.insert((song.song_id.clone(), song.source.clone())))
            .collect();

        let mut playlist = Playlist::new(user_id, &legacy.name);
        playlist.id = legacy_id(user_id, PLAYLISTS_KEY, &legacy.id);
        playlist.description = legacy.description.clone().filter(|d| !d.is_empty());
        playlist.song_count = songs.len() as i64;
        self.create_once(&playlist).await?;

        if songs.is_empty() {
            return Ok(());
        }

        // Upserts by id, so songs sent by an earlier run are overwritten
        let entries: Vec<PlaylistSong> = (0_i64..)
            .zip(songs)
            .map(|(position, song)| {
                let identity = format!("{}/{}/{}", legacy.id, song.source, song.song_id);
                let mut entry = PlaylistSong::new(user_id, &playlist.id, song, position);
                entry.id = legacy_id(user_id, PLAYLISTS_KEY, &identity);
                entry
            })
            .collect();
        let outcome = self.remote.upsert_rows(&entries).await?;

        match outcome.rejected.first() {
            None => Ok(()),
            Some(first) => Err(MigrationError::InvalidRecord(format!(
                "{} of {} songs rejected ({})",
                outcome.rejected.len(),
                entries.len(),
                first.message
            ))),
        }
    }

    /// Create `row` unless an earlier run already did
    async fn create_once<R: SyncRecord>(&self, row: &R) -> Result<()> {
        match self.remote.create_row(row).await {
            Ok(_) => Ok(()),
            Err(RemoteError::RemoteRejected { status: 409, .. }) => {
                debug!(table = %R::TABLE, id = row.id(), "Already migrated");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
