//! Background scheduling of sync cycles

use crate::engine::SyncEngine;
use crate::types::{CycleOutcome, SyncConfig, SyncTrigger};
use cadence_core::{AppEvent, SyncTable};
use cadence_remote::RemoteError;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

const TRIGGER_BUFFER: usize = 16;

/// Handle to a running scheduler
///
/// Dropping the handle stops the scheduler once the current cycle is done.
pub struct SyncHandle {
    triggers: mpsc::Sender<SyncTrigger>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl SyncHandle {
    /// Ask for a cycle
    ///
    /// Returns `false` if the request was dropped because the queue is full
    /// or the scheduler is gone. A request made while a cycle runs is
    /// discarded when that cycle ends.
    pub fn trigger(&self, trigger: SyncTrigger) -> bool {
        self.triggers.try_send(trigger).is_ok()
    }

    /// Stop scheduling and wait for an in-flight cycle to finish
    pub async fn shutdown(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Sync scheduler ended abnormally");
            }
        }
    }
}

impl SyncEngine {
    /// Spawn the scheduler
    ///
    /// Runs a startup cycle, then one per `config.interval`, one per
    /// [`SyncHandle::trigger`] call and one whenever the session changes.
    /// With `config.realtime`, backend change events trigger cycles as well.
    pub fn start(self: &Arc<Self>, config: SyncConfig) -> SyncHandle {
        let (trigger_tx, mut trigger_rx) = mpsc::channel(TRIGGER_BUFFER);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let engine = Arc::clone(self);
        let realtime_tx = trigger_tx.clone();

        let task = tokio::spawn(async move {
            info!(interval_secs = config.interval.as_secs(), "Sync scheduler started");

            let mut session_rx = engine.session().watch();

            let mut realtime = RealtimeFeeds::default();
            if config.realtime {
                realtime.restart(&engine, &config, &realtime_tx);
            }

            run_logged(&engine, SyncTrigger::Startup).await;

            let mut ticker = interval_at(Instant::now() + config.interval, config.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                let trigger = tokio::select! {
                    _ = &mut shutdown_rx => break,
                    Some(trigger) = trigger_rx.recv() => trigger,
                    _ = ticker.tick() => SyncTrigger::Interval,
                    Ok(()) = session_rx.changed() => {
                        let user_id = session_rx
                            .borrow_and_update()
                            .as_ref()
                            .map(|s| s.user_id.clone());
                        engine.events().emit(&AppEvent::SessionChanged { user_id });
                        if config.realtime {
                            realtime.restart(&engine, &config, &realtime_tx);
                        }
                        SyncTrigger::Reconnect
                    }
                };

                run_logged(&engine, trigger).await;

                let mut dropped = 0;
                while trigger_rx.try_recv().is_ok() {
                    dropped += 1;
                }
                if dropped > 0 {
                    debug!(dropped, "Dropped triggers queued during cycle");
                }
            }

            realtime.stop();
            info!("Sync scheduler stopped");
        });

        SyncHandle {
            triggers: trigger_tx,
            shutdown: Some(shutdown_tx),
            task: Some(task),
        }
    }
}

async fn run_logged(engine: &SyncEngine, trigger: SyncTrigger) {
    match engine.run_cycle(trigger).await {
        Ok(CycleOutcome::Completed(report)) if !report.is_success() => {
            warn!(failed = ?report.failed_tables(), "Sync cycle finished with errors");
        }
        Ok(CycleOutcome::Completed(_)) => {}
        Ok(CycleOutcome::Coalesced) => debug!(trigger = %trigger, "Trigger coalesced"),
        Ok(CycleOutcome::Suspended) => debug!(trigger = %trigger, "Sync suspended"),
        Err(e) => warn!(trigger = %trigger, error = %e, "Sync cycle failed"),
    }
}

/// One realtime listener per table for the current user
#[derive(Default)]
struct RealtimeFeeds {
    tasks: Vec<JoinHandle<()>>,
}

impl RealtimeFeeds {
    fn restart(
        &mut self,
        engine: &Arc<SyncEngine>,
        config: &SyncConfig,
        triggers: &mpsc::Sender<SyncTrigger>,
    ) {
        self.stop();
        let Some(user_id) = engine.session().user_id() else {
            return;
        };

        for table in SyncTable::ALL {
            let engine = Arc::clone(engine);
            let triggers = triggers.clone();
            let user_id = user_id.clone();
            let retry = config.realtime_retry;

            self.tasks.push(tokio::spawn(async move {
                loop {
                    match engine.remote().subscribe(table, &user_id).await {
                        Ok(mut subscription) => {
                            while let Some(event) = subscription.recv().await {
                                debug!(table = %table, kind = ?event.kind, "Remote change");
                                // A full queue already holds a pending cycle
                                let _ = triggers.try_send(SyncTrigger::Realtime);
                            }
                            debug!(table = %table, "Realtime feed closed");
                        }
                        Err(RemoteError::Unauthenticated) => break,
                        Err(e) => warn!(table = %table, error = %e, "Realtime subscribe failed"),
                    }
                    tokio::time::sleep(retry).await;
                }
            }));
        }
    }

    fn stop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}
