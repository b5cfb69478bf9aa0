//! Cadence Core
//!
//! Platform-agnostic types shared by every crate of the sync core.
//!
//! # Architecture
//!
//! The core crate defines:
//! - **Domain Types**: `Playlist`, `PlaylistSong`, `FavoriteSong`, `PlayRecord`, `DislikedSong`
//! - **Sync Contract**: `SyncTable`, `SyncRecord`, `SyncState`
//! - **Session Context**: a single shared `SessionContext` threaded into every component
//! - **Event Dispatcher**: typed publish/subscribe for cross-cutting notifications
//! - **Error Handling**: `CoreError` and `Result`
//!
//! # Example
//!
//! ```rust
//! use cadence_core::{Playlist, Session, SessionContext, SyncRecord, SyncTable};
//!
//! let session = SessionContext::new();
//! session.sign_in(Session::new("user-1", "token"));
//!
//! let playlist = Playlist::new("user-1", "Road trip");
//! assert_eq!(Playlist::TABLE, SyncTable::Playlists);
//! assert_eq!(playlist.user_id(), "user-1");
//! ```

#![forbid(unsafe_code)]

pub mod error;
pub mod events;
pub mod play_session;
pub mod session;
pub mod time;
pub mod types;

pub use error::{CoreError, Result};
pub use events::{AppEvent, EventDispatcher, ListenerId};
pub use play_session::{parse_interval, PlaySession, COMPLETION_RATIO, MIN_PLAY_SECONDS};
pub use session::{Session, SessionContext};
pub use types::{
    DislikedSong, FavoriteSong, PlayRecord, Playlist, PlaylistSong, SongInfo, SyncRecord,
    SyncState, SyncTable,
};
