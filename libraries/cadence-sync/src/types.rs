use cadence_core::{SyncState, SyncTable};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default time between scheduled cycles
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// What triggered a sync cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncTrigger {
    Startup,      // Engine started
    Interval,     // Periodic timer
    Manual,       // User asked for a sync
    Reconnect,    // Network or session came back
    Foreground,   // App returned to the foreground
    Background,   // App is about to be backgrounded
    Realtime,     // Backend pushed a change
}

impl SyncTrigger {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Startup => "startup",
            Self::Interval => "interval",
            Self::Manual => "manual",
            Self::Reconnect => "reconnect",
            Self::Foreground => "foreground",
            Self::Background => "background",
            Self::Realtime => "realtime",
        }
    }
}

impl std::fmt::Display for SyncTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of asking the engine to run a cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CycleOutcome {
    /// The cycle ran; individual tables may still have failed
    Completed(CycleReport),
    /// Another cycle was in flight; nothing was done
    Coalesced,
    /// No usable session; the engine is suspended
    Suspended,
}

/// Per-table result of one cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableReport {
    pub table: SyncTable,
    /// Rows received from the backend
    pub pulled: usize,
    /// Remote rows written locally
    pub applied: usize,
    /// Remote rows that lost to a newer local row
    pub kept_local: usize,
    /// Remote rows that could not be decoded
    pub skipped: usize,
    /// Local rows acknowledged by the backend
    pub pushed: usize,
    /// Local rows the backend refused; they stay queued
    pub rejected: usize,
    /// Pending removals delivered
    pub removed: usize,
    pub cursor_advanced: bool,
    pub error: Option<String>,
}

impl TableReport {
    pub fn new(table: SyncTable) -> Self {
        Self {
            table,
            pulled: 0,
            applied: 0,
            kept_local: 0,
            skipped: 0,
            pushed: 0,
            rejected: 0,
            removed: 0,
            cursor_advanced: false,
            error: None,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Summary of a completed cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleReport {
    pub cycle_id: String,
    pub trigger: SyncTrigger,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub tables: Vec<TableReport>,
}

impl CycleReport {
    pub fn table(&self, table: SyncTable) -> Option<&TableReport> {
        self.tables.iter().find(|t| t.table == table)
    }

    pub fn failed_tables(&self) -> Vec<SyncTable> {
        self.tables
            .iter()
            .filter(|t| t.is_failed())
            .map(|t| t.table)
            .collect()
    }

    pub fn applied(&self) -> usize {
        self.tables.iter().map(|t| t.applied).sum()
    }

    pub fn pushed(&self) -> usize {
        self.tables.iter().map(|t| t.pushed).sum()
    }

    pub fn is_success(&self) -> bool {
        self.tables.iter().all(|t| !t.is_failed())
    }
}

/// Observable engine status
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SyncStatus {
    pub state: SyncState,
    pub is_running: bool,
    pub last_sync_at: Option<DateTime<Utc>>,
    /// Local rows waiting to be pushed
    pub pending_uploads: i64,
    pub last_report: Option<CycleReport>,
    /// Errors of the last cycle, `table: message`
    pub errors: Vec<String>,
}

/// Scheduler settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Time between scheduled cycles
    pub interval: Duration,
    /// Open realtime subscriptions that trigger cycles on remote changes
    pub realtime: bool,
    /// Delay before re-opening a dropped realtime subscription
    pub realtime_retry: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            realtime: true,
            realtime_retry: Duration::from_secs(30),
        }
    }
}
