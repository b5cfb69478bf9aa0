//! Cadence Library
//!
//! Bridges the local store and the player: live projections of playlists,
//! favorites, play history and dislikes into the shapes the player renders,
//! and a recorder that turns listening sessions into play history.
//!
//! # Example
//!
//! ```ignore
//! use cadence_library::{PlayHistoryRecorder, PlaylistProjection};
//!
//! let lists = PlaylistProjection::start(store.clone(), session.clone(), events.clone());
//! let mut updates = lists.subscribe();
//! updates.changed().await?;
//! for list in &lists.current().lists {
//!     println!("{} ({})", list.name, list.id);
//! }
//!
//! let recorder = PlayHistoryRecorder::new(store, session);
//! recorder.record_start(&song);
//! // ... playback ...
//! recorder.record_end().await?;
//! ```

mod error;
mod projection;
mod recorder;
mod types;

pub use error::{LibraryError, Result};
pub use projection::{
    DislikesProjection, DislikesProjector, FavoritesProjection, FavoritesProjector,
    HistoryProjection, HistoryProjector, PlaylistProjection, PlaylistProjector, PlaylistView,
    Projection, Projector, DEFAULT_HISTORY_LIMIT,
};
pub use recorder::PlayHistoryRecorder;
pub use types::{
    format_interval, list_id, playlist_id, HistoryEntry, MusicInfo, UserList, LIST_ID_PREFIX,
    UNKNOWN_ARTIST,
};
