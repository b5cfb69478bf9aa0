//! Cadence Storage
//!
//! On-device `SQLite` store for the synced tables of the music player.
//!
//! # Architecture
//!
//! - **Typed tables**: playlists, playlist songs, favorites, play history and
//!   dislikes, each with `updated_at`, soft-delete columns and a local `dirty`
//!   counter
//! - **Query builder**: equality/range predicates and sorting over
//!   whitelisted columns ([`Query`])
//! - **Atomic writes**: [`WriteTxn`] commits all-or-nothing and only then
//!   notifies observers
//! - **Live queries**: [`LocalStore::observe`] re-emits the full result set
//!   whenever a row of the observed table changes
//! - **Vertical slicing**: each table module owns its queries and mutations
//!
//! # Example
//!
//! ```rust,no_run
//! use cadence_storage::{LocalStore, playlists};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = LocalStore::open("sqlite://cadence.db").await?;
//!
//! let playlist = playlists::create(&store, "user-1", "Road trip", None).await?;
//! let mine = playlists::list_for_user(&store, "user-1").await?;
//! assert_eq!(mine[0].id, playlist.id);
//! # Ok(())
//! # }
//! ```

mod error;
mod observe;
mod query;
mod store;
mod table;

// Vertical slices
pub mod disliked_songs;
pub mod favorites;
pub mod play_history;
pub mod playlist_songs;
pub mod playlists;

// Sync bookkeeping
pub mod sync_state;

pub use error::{Result, StorageError};
pub use observe::{LiveQuery, ObserverHandle};
pub use query::{Op, Order, Query, Value};
pub use store::{LocalStore, WriteTxn};
pub use table::{DirtyRow, LocalTable};

use sqlx::migrate::Migrator;
use sqlx::sqlite::SqlitePool;

// Embed migrations into binary
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Run database migrations
///
/// This should be called once when the application starts to ensure
/// the database schema is up to date.
pub async fn run_migrations(pool: &SqlitePool) -> std::result::Result<(), sqlx::migrate::MigrateError> {
    MIGRATOR.run(pool).await
}

/// Create a new `SQLite` pool
///
/// # Arguments
///
/// * `database_url` - `SQLite` connection string (e.g., `<sqlite://cadence.db>`)
pub async fn create_pool(database_url: &str) -> std::result::Result<SqlitePool, sqlx::Error> {
    use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
    use std::str::FromStr;

    tracing::debug!(url = %database_url, "Creating SQLite pool");

    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(std::time::Duration::from_secs(30));

    SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
}
