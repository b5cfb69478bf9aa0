//! The sync cycle: pull, reconcile, push

use crate::error::{Result, SyncError};
use crate::resolver::{resolve, Resolution};
use crate::state::{CycleGuard, StateManager};
use crate::types::{CycleOutcome, CycleReport, SyncStatus, SyncTrigger, TableReport};
use cadence_core::{
    AppEvent, DislikedSong, EventDispatcher, FavoriteSong, PlayRecord, Playlist, PlaylistSong,
    SessionContext, SyncRecord, SyncState, SyncTable,
};
use cadence_remote::{RemoteApi, RemoteApiExt};
use cadence_storage::sync_state::{self, SyncErrorEntry};
use cadence_storage::{playlists, LocalStore, LocalTable};
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

/// Pulls reach this far behind the cursor
///
/// Backend stamps are taken when a write starts, so a slow transaction can
/// become visible after a later one was already pulled.
const CURSOR_LOOKBACK_SECS: i64 = 5;

/// Run `$body` with `$row` bound to the record type of `$table`
macro_rules! for_table {
    ($table:expr, $row:ident => $body:expr) => {
        match $table {
            SyncTable::Playlists => {
                type $row = Playlist;
                $body
            }
            SyncTable::PlaylistSongs => {
                type $row = PlaylistSong;
                $body
            }
            SyncTable::FavoriteSongs => {
                type $row = FavoriteSong;
                $body
            }
            SyncTable::PlayHistory => {
                type $row = PlayRecord;
                $body
            }
            SyncTable::DislikedSongs => {
                type $row = DislikedSong;
                $body
            }
        }
    };
}

/// Last-write-wins sync between the local store and the backend
pub struct SyncEngine {
    store: LocalStore,
    remote: Arc<dyn RemoteApi>,
    session: SessionContext,
    events: EventDispatcher<AppEvent>,
    state: StateManager,
}

impl SyncEngine {
    pub fn new(
        store: LocalStore,
        remote: Arc<dyn RemoteApi>,
        session: SessionContext,
        events: EventDispatcher<AppEvent>,
    ) -> Self {
        let state = StateManager::new(store.clone(), events.clone());
        Self {
            store,
            remote,
            session,
            events,
            state,
        }
    }

    pub fn status(&self) -> SyncStatus {
        self.state.status()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.state.subscribe()
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub fn events(&self) -> &EventDispatcher<AppEvent> {
        &self.events
    }

    pub(crate) fn remote(&self) -> &Arc<dyn RemoteApi> {
        &self.remote
    }

    /// Failures recorded by recent cycles, newest first
    pub async fn recent_errors(&self, limit: i64) -> Result<Vec<SyncErrorEntry>> {
        Ok(sync_state::recent_errors(&self.store, limit).await?)
    }

    /// Run one full cycle now
    ///
    /// Returns [`CycleOutcome::Coalesced`] without doing anything if another
    /// cycle is in flight, and [`CycleOutcome::Suspended`] if there is no
    /// session. Table failures are reported, not returned; only a failure
    /// outside any table surfaces as an error.
    #[instrument(skip(self), fields(trigger = %trigger))]
    pub async fn run_cycle(&self, trigger: SyncTrigger) -> Result<CycleOutcome> {
        if !self.state.try_begin() {
            debug!("Sync already running, trigger coalesced");
            return Ok(CycleOutcome::Coalesced);
        }
        let guard = CycleGuard::new(&self.state);

        let Some(user_id) = self.session.user_id() else {
            info!("No session, sync suspended");
            self.state.suspend();
            guard.disarm();
            return Ok(CycleOutcome::Suspended);
        };

        let cycle_id = uuid::Uuid::new_v4().to_string();
        let started_at = Utc::now();
        info!(cycle_id = %cycle_id, "Sync cycle started");

        match self.cycle(&cycle_id, &user_id).await {
            Ok(tables) => {
                let report = CycleReport {
                    cycle_id,
                    trigger,
                    started_at,
                    finished_at: Utc::now(),
                    tables,
                };
                self.complete(&user_id, &report).await;
                guard.disarm();
                Ok(CycleOutcome::Completed(report))
            }
            Err(e) if e.is_unauthenticated() => {
                warn!(cycle_id = %cycle_id, "Session rejected by backend, sync suspended");
                self.state
                    .log_error(&cycle_id, None, e.kind(), &e.to_string())
                    .await;
                self.state.suspend();
                guard.disarm();
                Ok(CycleOutcome::Suspended)
            }
            Err(e) => {
                warn!(cycle_id = %cycle_id, error = %e, "Sync cycle abandoned");
                self.state
                    .log_error(&cycle_id, None, e.kind(), &e.to_string())
                    .await;
                Err(e)
            }
        }
    }

    async fn cycle(&self, cycle_id: &str, user_id: &str) -> Result<Vec<TableReport>> {
        let mut reports: Vec<TableReport> =
            SyncTable::ALL.iter().map(|t| TableReport::new(*t)).collect();
        let mut watermarks: HashMap<SyncTable, DateTime<Utc>> = HashMap::new();

        self.state.set_phase(SyncState::Pulling);
        for report in &mut reports {
            let table = report.table;
            let pulled = for_table!(table, R => self.pull::<R>(cycle_id, user_id, report).await);
            match pulled {
                Ok(Some(watermark)) => {
                    watermarks.insert(table, watermark);
                }
                Ok(None) => {}
                Err(e) => self.fail_table(cycle_id, report, e).await?,
            }
        }

        self.state.set_phase(SyncState::Reconciling);
        match playlists::reconcile_song_counts(&self.store, user_id).await {
            Ok(0) => {}
            Ok(fixed) => debug!(fixed, "Playlist song counts reconciled"),
            Err(e) => {
                warn!(error = %e, "Failed to reconcile song counts");
                let e = SyncError::from(e);
                self.state
                    .log_error(cycle_id, Some(SyncTable::Playlists), e.kind(), &e.to_string())
                    .await;
            }
        }

        self.state.set_phase(SyncState::Pushing);
        for report in &mut reports {
            if report.is_failed() {
                continue;
            }
            let table = report.table;
            let pushed = for_table!(table, R => self.push::<R>(user_id, report).await);
            if let Err(e) = pushed {
                self.fail_table(cycle_id, report, e).await?;
            }
        }

        for report in &mut reports {
            if report.is_failed() {
                continue;
            }
            if let Some(watermark) = watermarks.get(&report.table) {
                match sync_state::set_cursor(&self.store, user_id, report.table, *watermark).await
                {
                    Ok(()) => report.cursor_advanced = true,
                    Err(e) => self.fail_table(cycle_id, report, e.into()).await?,
                }
            }
        }

        Ok(reports)
    }

    /// Record a table failure; an unauthenticated session aborts the cycle
    async fn fail_table(
        &self,
        cycle_id: &str,
        report: &mut TableReport,
        error: SyncError,
    ) -> Result<()> {
        if error.is_unauthenticated() {
            return Err(error);
        }

        warn!(table = %report.table, error = %error, "Table sync failed");
        self.state
            .log_error(cycle_id, Some(report.table), error.kind(), &error.to_string())
            .await;
        report.error = Some(error.to_string());
        Ok(())
    }

    /// Fetch changes since the cursor and apply them locally
    ///
    /// Returns the newest backend `synced_at` pulled. Rows that fail to
    /// decode are logged and skipped.
    async fn pull<T: LocalTable>(
        &self,
        cycle_id: &str,
        user_id: &str,
        report: &mut TableReport,
    ) -> Result<Option<DateTime<Utc>>> {
        let cursor = sync_state::get_cursor(&self.store, user_id, T::TABLE).await?;
        let since = cursor.map(|c| c - Duration::seconds(CURSOR_LOOKBACK_SECS));
        let pulled = self.remote.fetch_rows::<T>(user_id, since).await?;
        report.pulled = pulled.len();

        for invalid in &pulled.invalid {
            warn!(table = %T::TABLE, id = %invalid.id, error = %invalid.message, "Skipping undecodable row");
            let message = format!("row {}: {}", invalid.id, invalid.message);
            self.state
                .log_error(cycle_id, Some(T::TABLE), "decode", &message)
                .await;
        }
        report.skipped = pulled.invalid.len();

        let watermark = pulled.watermark;
        let rows = pulled.rows;
        if rows.is_empty() {
            return Ok(watermark);
        }
        let pending: HashMap<String, DateTime<Utc>> =
            sync_state::tombstones(&self.store, user_id, T::TABLE)
                .await?
                .into_iter()
                .map(|t| (t.row_id, t.deleted_at))
                .collect();
        let mut revived = Vec::new();

        let mut txn = self.store.write().await?;
        for row in &rows {
            if row.user_id() != user_id {
                warn!(table = %T::TABLE, id = row.id(), "Ignoring row of another user");
                continue;
            }

            if let Some(deleted_at) = pending.get(row.id()) {
                if row.updated_at() <= *deleted_at {
                    report.kept_local += 1;
                    continue;
                }
                revived.push(row.id().to_string());
            }

            let local = txn.find::<T>(row.id()).await?;
            match resolve(local.as_ref(), row) {
                Resolution::Skip => {}
                Resolution::KeepLocal => {
                    report.kept_local += 1;
                    if local.as_ref().is_some_and(|l| !l.is_dirty()) {
                        txn.mark_dirty::<T>(row.id()).await?;
                    }
                }
                Resolution::Insert if removes_locally::<T>(row) => {}
                Resolution::Overwrite if removes_locally::<T>(row) => {
                    if txn.delete_local::<T>(row.id(), row.updated_at()).await? {
                        report.applied += 1;
                    }
                }
                Resolution::Insert | Resolution::Overwrite => {
                    if txn.apply_remote(row).await? {
                        report.applied += 1;
                    } else {
                        report.kept_local += 1;
                    }
                }
            }
        }
        txn.commit().await?;

        if !revived.is_empty() {
            sync_state::clear_tombstones(&self.store, T::TABLE, &revived).await?;
        }

        debug!(
            table = %T::TABLE,
            pulled = report.pulled,
            applied = report.applied,
            kept_local = report.kept_local,
            skipped = report.skipped,
            "Pulled"
        );
        Ok(watermark)
    }

    /// Upload dirty rows and pending removals
    ///
    /// The cursor is left alone; the next pull sees the pushed rows again
    /// and skips them as unchanged.
    async fn push<T: LocalTable>(&self, user_id: &str, report: &mut TableReport) -> Result<()> {
        let dirty = self.store.dirty_rows::<T>(user_id).await?;
        if !dirty.is_empty() {
            let mut seen = HashSet::new();
            let mut captured = HashMap::new();
            let mut outbound = Vec::with_capacity(dirty.len());
            for entry in dirty.into_iter().rev() {
                if seen.insert(entry.row.id().to_string()) {
                    captured.insert(entry.row.id().to_string(), entry.dirty);
                    outbound.push(entry.row);
                }
            }
            outbound.reverse();

            let outcome = self.remote.upsert_rows(&outbound).await?;

            for row in &outcome.committed {
                let Some(dirty) = captured.get(row.id()) else {
                    continue;
                };
                if !self.store.mark_clean::<T>(row.id(), *dirty).await? {
                    debug!(table = %T::TABLE, id = row.id(), "Row changed during push, kept dirty");
                }
                report.pushed += 1;
            }

            for rejected in &outcome.rejected {
                warn!(
                    table = %T::TABLE,
                    id = %rejected.id,
                    status = rejected.status,
                    message = %rejected.message,
                    "Row rejected by backend"
                );
            }
            report.rejected = outcome.rejected.len();
        }

        let tombstones = sync_state::tombstones(&self.store, user_id, T::TABLE).await?;
        if !tombstones.is_empty() {
            let ids: Vec<String> = tombstones.into_iter().map(|t| t.row_id).collect();
            self.remote.soft_delete(T::TABLE, &ids).await?;
            sync_state::clear_tombstones(&self.store, T::TABLE, &ids).await?;
            report.removed = ids.len();
        }

        debug!(
            table = %T::TABLE,
            pushed = report.pushed,
            rejected = report.rejected,
            removed = report.removed,
            "Pushed"
        );
        Ok(())
    }

    async fn complete(&self, user_id: &str, report: &CycleReport) {
        let pending = match self.store.pending_count(user_id).await {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "Failed to count pending uploads");
                0
            }
        };

        for table in report.tables.iter().filter(|t| t.rejected > 0) {
            let message = format!("{} rows rejected by backend", table.rejected);
            self.state
                .log_error(&report.cycle_id, Some(table.table), "rejected", &message)
                .await;
        }

        info!(
            cycle_id = %report.cycle_id,
            applied = report.applied(),
            pushed = report.pushed(),
            failed = report.failed_tables().len(),
            pending,
            "Sync cycle finished"
        );
        self.state.finish(report, pending);
    }
}

/// Playlist entries are removed outright; other tables keep soft-deleted rows
fn removes_locally<T: SyncRecord>(row: &T) -> bool {
    T::TABLE == SyncTable::PlaylistSongs && row.is_deleted()
}
