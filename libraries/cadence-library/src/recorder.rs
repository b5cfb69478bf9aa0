//! Play history recording driven by the player

use crate::error::Result;
use crate::types::MusicInfo;
use cadence_core::{time, PlayRecord, PlaySession, SessionContext};
use cadence_storage::{play_history, LocalStore};
use chrono::{DateTime, Utc};
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// Turns start/end notifications from the player into play records
///
/// Only one song plays at a time: starting a new song replaces the pending
/// session without recording it. Callers end the previous song first when it
/// should count.
pub struct PlayHistoryRecorder {
    store: LocalStore,
    session: SessionContext,
    current: Mutex<Option<PlaySession>>,
}

impl PlayHistoryRecorder {
    pub fn new(store: LocalStore, session: SessionContext) -> Self {
        Self {
            store,
            session,
            current: Mutex::new(None),
        }
    }

    /// A song started playing
    pub fn record_start(&self, music: &MusicInfo) {
        self.record_start_at(music, time::now());
    }

    pub fn record_start_at(&self, music: &MusicInfo, started_at: DateTime<Utc>) {
        if !self.session.is_authenticated() {
            debug!(song_id = %music.id, "Not signed in, play not tracked");
            return;
        }
        let session = PlaySession::start_at(music.to_song_info(), started_at);
        *self.slot() = Some(session);
    }

    /// Song that is currently being tracked
    pub fn current(&self) -> Option<MusicInfo> {
        self.slot().as_ref().map(|s| MusicInfo::from(&s.song))
    }

    /// The current song stopped
    ///
    /// Returns the stored record, or `None` when nothing was playing, the
    /// session was too short or nobody is signed in.
    pub async fn record_end(&self) -> Result<Option<PlayRecord>> {
        self.record_end_at(time::now()).await
    }

    pub async fn record_end_at(&self, ended_at: DateTime<Utc>) -> Result<Option<PlayRecord>> {
        let pending = self.slot().take();
        let Some(session) = pending else {
            return Ok(None);
        };
        let Some(user_id) = self.session.user_id() else {
            debug!("Signed out while playing, play dropped");
            return Ok(None);
        };

        let Some(record) = session.finish_at(&user_id, ended_at) else {
            debug!(song_id = %session.song.song_id, "Play too short, not recorded");
            return Ok(None);
        };

        play_history::append(&self.store, &record).await?;
        Ok(Some(record))
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<PlaySession>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
