//! Listening session rules
//!
//! A session becomes a [`PlayRecord`] only when it lasted at least
//! [`MIN_PLAY_SECONDS`]; it counts as completed when the listened time reaches
//! [`COMPLETION_RATIO`] of the track length.

use crate::time;
use crate::types::{PlayRecord, SongInfo};
use chrono::{DateTime, Utc};

/// Sessions shorter than this are not recorded
pub const MIN_PLAY_SECONDS: i64 = 5;

/// Fraction of the track that must be heard for `completed`
pub const COMPLETION_RATIO: f64 = 0.8;

/// A song that started playing and has not finished yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaySession {
    pub song: SongInfo,
    pub started_at: DateTime<Utc>,
}

impl PlaySession {
    /// Start a session now
    pub fn start(song: SongInfo) -> Self {
        Self::start_at(song, time::now())
    }

    pub fn start_at(song: SongInfo, started_at: DateTime<Utc>) -> Self {
        Self { song, started_at }
    }

    /// Finish the session at `ended_at`
    ///
    /// Returns `None` for sessions shorter than [`MIN_PLAY_SECONDS`].
    pub fn finish_at(&self, user_id: &str, ended_at: DateTime<Utc>) -> Option<PlayRecord> {
        let played = (ended_at - self.started_at).num_seconds();
        self.finish_with_duration(user_id, played)
    }

    /// Finish the session with an externally measured listening time
    pub fn finish_with_duration(&self, user_id: &str, played_seconds: i64) -> Option<PlayRecord> {
        if played_seconds < MIN_PLAY_SECONDS {
            return None;
        }

        let total = self.song.duration.unwrap_or(0);
        Some(PlayRecord::new(
            user_id,
            self.song.clone(),
            played_seconds,
            is_completed(played_seconds, total),
            self.started_at,
        ))
    }
}

/// Completion rule; an unknown track length never counts as completed
fn is_completed(played_seconds: i64, total_seconds: i64) -> bool {
    total_seconds > 0 && played_seconds as f64 >= total_seconds as f64 * COMPLETION_RATIO
}

/// Parse a track length as the player reports it
///
/// Accepts `"mm:ss"` and plain seconds; anything else, including negative
/// parts and lengths that overflow, is 0.
pub fn parse_interval(interval: &str) -> i64 {
    let interval = interval.trim();
    let seconds = match interval.split_once(':') {
        Some((minutes, seconds)) => match (minutes.parse::<i64>(), seconds.parse::<i64>()) {
            (Ok(m), Ok(s)) if m >= 0 && s >= 0 => {
                m.checked_mul(60).and_then(|m| m.checked_add(s))
            }
            _ => None,
        },
        None => interval.parse::<i64>().ok().filter(|s| *s >= 0),
    };
    seconds.unwrap_or(0)
}
