mod dislike;
mod favorite;
mod history;
mod playlist;
mod song;
mod table;

pub use dislike::DislikedSong;
pub use favorite::FavoriteSong;
pub use history::PlayRecord;
pub use playlist::{Playlist, PlaylistSong};
pub use song::SongInfo;
pub use table::{SyncRecord, SyncState, SyncTable};

/// Generate a fresh row identifier
pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
