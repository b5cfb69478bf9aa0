use crate::types::{CycleReport, SyncStatus};
use cadence_core::{AppEvent, EventDispatcher, SyncState, SyncTable};
use cadence_storage::sync_state::{self, SyncErrorEntry};
use cadence_storage::LocalStore;
use chrono::Utc;
use tokio::sync::watch;
use tracing::warn;

/// Owns the engine status and publishes every transition
///
/// The status lives in a watch channel; its write lock doubles as the gate
/// that keeps cycles from overlapping.
pub struct StateManager {
    store: LocalStore,
    events: EventDispatcher<AppEvent>,
    status: watch::Sender<SyncStatus>,
}

impl StateManager {
    pub fn new(store: LocalStore, events: EventDispatcher<AppEvent>) -> Self {
        let (status, _) = watch::channel(SyncStatus::default());
        Self {
            store,
            events,
            status,
        }
    }

    pub fn status(&self) -> SyncStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    /// Claim the engine for a new cycle
    ///
    /// Returns `false` if a cycle is already in flight.
    pub fn try_begin(&self) -> bool {
        let claimed = self.status.send_if_modified(|status| {
            if status.is_running || !status.state.accepts_trigger() {
                return false;
            }
            status.is_running = true;
            status.state = SyncState::Pulling;
            true
        });

        if claimed {
            self.emit_state(SyncState::Pulling);
        }
        claimed
    }

    /// Move a running cycle to `state`
    pub fn set_phase(&self, state: SyncState) {
        let changed = self.status.send_if_modified(|status| {
            if status.state == state {
                return false;
            }
            status.state = state;
            true
        });

        if changed {
            self.emit_state(state);
        }
    }

    /// Release the gate after an abandoned cycle
    pub fn release(&self) {
        self.status.send_modify(|status| {
            status.is_running = false;
            if status.state != SyncState::Suspended {
                status.state = SyncState::Idle;
            }
        });
        let state = self.status.borrow().state;
        self.emit_state(state);
    }

    /// No usable session: stop and wait for one
    pub fn suspend(&self) {
        self.status.send_modify(|status| {
            status.is_running = false;
            status.state = SyncState::Suspended;
        });
        self.emit_state(SyncState::Suspended);
    }

    /// Publish a finished cycle
    pub fn finish(&self, report: &CycleReport, pending_uploads: i64) {
        let errors: Vec<String> = report
            .tables
            .iter()
            .filter_map(|t| t.error.as_ref().map(|e| format!("{}: {}", t.table, e)))
            .collect();

        self.status.send_modify(|status| {
            status.state = SyncState::Idle;
            status.is_running = false;
            status.last_sync_at = Some(report.finished_at);
            status.pending_uploads = pending_uploads;
            status.last_report = Some(report.clone());
            status.errors = errors;
        });

        self.emit_state(SyncState::Idle);
        self.events.emit(&AppEvent::SyncCompleted {
            failed_tables: report.failed_tables(),
            applied: report.applied(),
            pushed: report.pushed(),
        });
    }

    /// Persist a cycle failure to the sync error log
    ///
    /// Logging is best effort; a failing write is only traced.
    pub async fn log_error(
        &self,
        cycle_id: &str,
        table: Option<SyncTable>,
        kind: &str,
        message: &str,
    ) {
        let entry = SyncErrorEntry {
            cycle_id: cycle_id.to_string(),
            table,
            kind: kind.to_string(),
            message: message.to_string(),
            occurred_at: Utc::now(),
        };

        if let Err(e) = sync_state::log_error(&self.store, &entry).await {
            warn!(error = %e, "Failed to record sync error");
        }
    }

    fn emit_state(&self, state: SyncState) {
        self.events.emit(&AppEvent::SyncStateChanged { state });
    }
}

/// Releases the gate if a cycle ends without reaching `finish`
pub(crate) struct CycleGuard<'a> {
    state: &'a StateManager,
    armed: bool,
}

impl<'a> CycleGuard<'a> {
    pub(crate) fn new(state: &'a StateManager) -> Self {
        Self { state, armed: true }
    }

    pub(crate) fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.state.release();
        }
    }
}
