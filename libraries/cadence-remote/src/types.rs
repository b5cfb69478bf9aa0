//! Types for the remote backend client.

use cadence_core::SyncTable;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Default number of rows requested per page when pulling
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Connection settings for the sync backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Backend base URL (e.g., "https://project.example.co")
    pub url: String,

    /// Public project key sent as `apikey` with every request
    pub anon_key: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Rows per page for pull requests
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

impl RemoteConfig {
    /// Create a config with default timeout and page size.
    pub fn new(url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            anon_key: anon_key.into(),
            timeout_secs: default_timeout_secs(),
            page_size: default_page_size(),
        }
    }
}

/// A row the backend refused during an upsert
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedRow {
    pub id: String,
    pub status: u16,
    pub message: String,
}

/// Result of a batch upsert
///
/// `committed` holds the rows as the backend stored them.
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertOutcome<T> {
    pub committed: Vec<T>,
    pub rejected: Vec<RejectedRow>,
}

impl<T> Default for UpsertOutcome<T> {
    fn default() -> Self {
        Self {
            committed: Vec::new(),
            rejected: Vec::new(),
        }
    }
}

/// A pulled row that could not be decoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidRow {
    pub id: String,
    pub message: String,
}

/// Rows pulled from one table
#[derive(Debug, Clone, PartialEq)]
pub struct PulledRows<R> {
    pub rows: Vec<R>,
    /// Rows skipped because they did not decode
    pub invalid: Vec<InvalidRow>,
    /// Newest `synced_at` among all fetched rows, including invalid ones
    pub watermark: Option<DateTime<Utc>>,
}

impl<R> PulledRows<R> {
    /// Number of rows the backend returned
    pub fn len(&self) -> usize {
        self.rows.len() + self.invalid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<R> Default for PulledRows<R> {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            invalid: Vec::new(),
            watermark: None,
        }
    }
}

/// Kind of change carried by a realtime event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    /// Parse the backend's `INSERT`/`UPDATE`/`DELETE` label
    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "INSERT" => Some(Self::Insert),
            "UPDATE" => Some(Self::Update),
            "DELETE" => Some(Self::Delete),
            _ => None,
        }
    }
}

/// A row change pushed by the backend
#[derive(Debug, Clone, PartialEq)]
pub struct RealtimeEvent {
    pub table: SyncTable,
    pub kind: ChangeKind,
    /// New row for inserts and updates, old row for deletes
    pub row: Value,
}

/// Stream of realtime events for one table and user
///
/// Dropping the subscription closes the underlying connection.
#[derive(Debug)]
pub struct RealtimeSubscription {
    events: mpsc::Receiver<RealtimeEvent>,
    task: Option<JoinHandle<()>>,
}

impl RealtimeSubscription {
    /// Wrap a channel fed by some other source (e.g., an in-memory backend)
    pub fn from_channel(events: mpsc::Receiver<RealtimeEvent>) -> Self {
        Self { events, task: None }
    }

    pub(crate) fn with_task(events: mpsc::Receiver<RealtimeEvent>, task: JoinHandle<()>) -> Self {
        Self {
            events,
            task: Some(task),
        }
    }

    /// Next event, or `None` once the connection is gone
    pub async fn recv(&mut self) -> Option<RealtimeEvent> {
        self.events.recv().await
    }
}

impl Drop for RealtimeSubscription {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
