//! Live queries
//!
//! Every committed [`crate::WriteTxn`] broadcasts the tables it touched. A
//! [`LiveQuery`] listens for its own table and re-runs the whole query, so
//! consumers always receive complete, committed result sets.

use crate::error::{Result, StorageError};
use crate::query::Query;
use crate::store::LocalStore;
use crate::table::LocalTable;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tokio::task::JoinHandle;

/// A query whose result set is re-emitted on every change to its table
pub struct LiveQuery<T> {
    store: LocalStore,
    query: Query<T>,
    changes: broadcast::Receiver<cadence_core::SyncTable>,
    fingerprint: String,
    primed: bool,
}

impl<T: LocalTable> LiveQuery<T> {
    pub(crate) fn new(
        store: LocalStore,
        query: Query<T>,
        changes: broadcast::Receiver<cadence_core::SyncTable>,
    ) -> Self {
        let fingerprint = query.fingerprint();
        Self {
            store,
            query,
            changes,
            fingerprint,
            primed: false,
        }
    }

    /// Table, predicates and sort of the observed query
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Next full result set
    ///
    /// The first call returns immediately with the current rows; later calls
    /// wait for a commit touching the observed table. Bursts of commits are
    /// folded into one re-query.
    pub async fn next(&mut self) -> Result<Vec<T>> {
        if self.primed {
            self.wait_for_change().await?;
        } else {
            self.primed = true;
        }
        self.query.fetch(&self.store).await
    }

    async fn wait_for_change(&mut self) -> Result<()> {
        loop {
            match self.changes.recv().await {
                Ok(table) if table == T::TABLE => break,
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(query = %self.fingerprint, skipped, "Live query lagged");
                    break;
                }
                Err(RecvError::Closed) => return Err(StorageError::Closed),
            }
        }

        // Drain what is already queued; one re-query covers it all
        loop {
            match self.changes.try_recv() {
                Ok(_) | Err(TryRecvError::Lagged(_)) => {}
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
        Ok(())
    }
}

/// Registration of a callback observer
///
/// The observer task is aborted when the handle is dropped.
#[derive(Debug)]
pub struct ObserverHandle {
    fingerprint: String,
    task: Option<JoinHandle<()>>,
}

impl ObserverHandle {
    pub(crate) fn spawn<T, F>(mut live: LiveQuery<T>, callback: F) -> Self
    where
        T: LocalTable,
        F: Fn(Vec<T>) + Send + Sync + 'static,
    {
        let fingerprint = live.fingerprint().to_string();
        let task = tokio::spawn(async move {
            loop {
                match live.next().await {
                    Ok(rows) => callback(rows),
                    Err(StorageError::Closed) => break,
                    Err(e) => {
                        tracing::warn!(query = %live.fingerprint(), error = %e, "Live query failed");
                    }
                }
            }
        });

        Self {
            fingerprint,
            task: Some(task),
        }
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Stop delivering results
    pub fn unsubscribe(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for ObserverHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
