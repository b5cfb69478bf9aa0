//! Cadence Migration
//!
//! One-time upload of the collections the pre-sync app kept on the device
//! (favorites, play history, playlists with embedded songs) to the backend.
//!
//! Migration is best effort per record: every record is attempted, failures
//! are counted and described in the [`MigrationReport`], and the legacy data
//! is left untouched until [`Migrator::clear_local_data`] is called.
//!
//! # Example
//!
//! ```ignore
//! use cadence_migration::{FileLegacyStore, Migrator};
//! use std::sync::Arc;
//!
//! let migrator = Migrator::new(remote, session, Arc::new(FileLegacyStore::new("legacy")));
//! let report = migrator.migrate_all().await?;
//! println!("{}", report.summary(5));
//! if report.success {
//!     migrator.clear_local_data().await?;
//! }
//! ```

mod error;
mod legacy;
mod migrator;
mod report;

pub use error::{MigrationError, Result};
pub use legacy::{
    FileLegacyStore, LegacyPlayRecord, LegacyPlaylist, LegacySong, LegacyStore, ALL_KEYS,
    DEFAULT_SOURCE, FAVORITES_KEY, HISTORY_KEY, PLAYLISTS_KEY,
};
pub use migrator::Migrator;
pub use report::{CategoryReport, MigrationReport};
