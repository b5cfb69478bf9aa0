//! Timestamp helpers
//!
//! Rows are compared at microsecond precision, which is what both the local
//! store (integer microseconds) and the backend (`timestamptz`) keep.

use chrono::{DateTime, SubsecRound, Utc};

/// Current time truncated to microseconds
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Convert a timestamp to the integer form stored in `SQLite`
pub fn to_micros(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_micros()
}

/// Convert a stored integer back into a timestamp
///
/// Out-of-range values clamp to the Unix epoch.
pub fn from_micros(micros: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(micros).unwrap_or(DateTime::UNIX_EPOCH)
}
