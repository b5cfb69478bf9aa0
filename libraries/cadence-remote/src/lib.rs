//! Cadence Remote
//!
//! Client for the multi-device sync backend: a PostgREST-style HTTP API for
//! the user-scoped tables plus a websocket change feed.
//!
//! # Features
//!
//! - **Pull**: rows written since a cursor on the backend clock, paged
//! - **Push**: batch upsert with per-row isolation of rejected rows
//! - **Soft delete**: mark rows deleted by id
//! - **Realtime**: insert/update/delete events for one table and user
//!
//! Every call reads the session from the shared `SessionContext`; without
//! one it fails with [`RemoteError::Unauthenticated`].
//!
//! # Example
//!
//! ```ignore
//! use cadence_core::{FavoriteSong, Session, SessionContext};
//! use cadence_remote::{RemoteApiExt, RemoteConfig, RestClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let session = SessionContext::signed_in(Session::new("user-1", "jwt"));
//!     let client = RestClient::new(RemoteConfig::new("https://project.example.co", "anon"), session)?;
//!
//!     let favorites = client.fetch_rows::<FavoriteSong>("user-1", None).await?;
//!     println!("{} favorites on the server", favorites.rows.len());
//!     Ok(())
//! }
//! ```

mod api;
mod client;
mod error;
mod realtime;
mod types;

pub use api::{decode_row, row_id, synced_at, RemoteApi, RemoteApiExt, SYNCED_AT};
pub use client::RestClient;
pub use error::{RemoteError, Result};
pub use types::{
    ChangeKind, InvalidRow, PulledRows, RealtimeEvent, RealtimeSubscription, RejectedRow,
    RemoteConfig, UpsertOutcome, DEFAULT_PAGE_SIZE,
};
