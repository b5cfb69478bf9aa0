//! Store handle and atomic write transactions

use crate::error::Result;
use crate::observe::{LiveQuery, ObserverHandle};
use crate::query::Query;
use crate::table::{self, DirtyRow, LocalTable};
use cadence_core::SyncTable;
use chrono::{DateTime, Utc};
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use std::collections::HashSet;
use tokio::sync::broadcast;

/// Buffered change notifications per store; slow observers see `Lagged`
/// and simply re-query.
const CHANGE_CAPACITY: usize = 256;

/// Handle to the on-device database
///
/// Cloning is cheap; all clones share the pool and the change registry.
#[derive(Clone)]
pub struct LocalStore {
    pool: SqlitePool,
    changes: broadcast::Sender<SyncTable>,
}

impl LocalStore {
    /// Wrap an existing pool whose migrations have already run
    pub fn new(pool: SqlitePool) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Self { pool, changes }
    }

    /// Open (creating if missing) and migrate the database at `database_url`
    pub async fn open(database_url: &str) -> Result<Self> {
        let pool = crate::create_pool(database_url).await?;
        crate::run_migrations(&pool).await?;
        tracing::info!(url = %database_url, "Local store ready");
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Start a query over `T`'s table
    pub fn query<T: LocalTable>(&self) -> Query<T> {
        Query::new()
    }

    /// Begin an all-or-nothing write
    ///
    /// Nothing is visible to other readers or observers until
    /// [`WriteTxn::commit`]; dropping the transaction rolls it back.
    pub async fn write(&self) -> Result<WriteTxn> {
        Ok(WriteTxn {
            tx: self.pool.begin().await?,
            touched: HashSet::new(),
            changes: self.changes.clone(),
        })
    }

    /// Live view of `query`'s result set
    pub fn observe<T: LocalTable>(&self, query: Query<T>) -> LiveQuery<T> {
        LiveQuery::new(self.clone(), query, self.changes.subscribe())
    }

    /// Call `callback` with the full result set now and after every change
    ///
    /// Must be called inside a tokio runtime. The observer stops when the
    /// handle is dropped or [`ObserverHandle::unsubscribe`] is called.
    pub fn observe_with<T, F>(&self, query: Query<T>, callback: F) -> ObserverHandle
    where
        T: LocalTable,
        F: Fn(Vec<T>) + Send + Sync + 'static,
    {
        ObserverHandle::spawn(self.observe(query), callback)
    }

    /// Raw table-level change notifications
    pub fn subscribe_changes(&self) -> broadcast::Receiver<SyncTable> {
        self.changes.subscribe()
    }

    /// Look up a row and its dirty counter
    pub async fn find<T: LocalTable>(&self, id: &str) -> Result<Option<DirtyRow<T>>> {
        let mut conn = self.pool.acquire().await?;
        table::find(&mut *conn, id).await
    }

    /// Rows of `user_id` waiting to be pushed
    pub async fn dirty_rows<T: LocalTable>(&self, user_id: &str) -> Result<Vec<DirtyRow<T>>> {
        let mut conn = self.pool.acquire().await?;
        table::dirty_rows(&mut *conn, user_id).await
    }

    /// Acknowledge a pushed row if it was not written since it was collected
    pub async fn mark_clean<T: LocalTable>(&self, id: &str, captured: i64) -> Result<bool> {
        let mut conn = self.pool.acquire().await?;
        table::mark_clean::<T>(&mut *conn, id, captured).await
    }

    /// Number of dirty rows of `user_id` across all synced tables
    pub async fn pending_count(&self, user_id: &str) -> Result<i64> {
        let mut total = 0;
        for table in SyncTable::ALL {
            let sql = format!(
                "SELECT COUNT(*) FROM {} WHERE user_id = ? AND dirty > 0",
                table.as_str()
            );
            let count: i64 = sqlx::query_scalar(&sql)
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;
            total += count;
        }
        Ok(total)
    }
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore")
            .field("observers", &self.changes.receiver_count())
            .finish_non_exhaustive()
    }
}

/// An open write transaction
pub struct WriteTxn {
    tx: Transaction<'static, Sqlite>,
    touched: HashSet<SyncTable>,
    changes: broadcast::Sender<SyncTable>,
}

impl WriteTxn {
    /// Connection for statements that are not covered by the typed helpers
    ///
    /// Call [`WriteTxn::touch`] for every table modified through it.
    pub fn conn(&mut self) -> &mut SqliteConnection {
        &mut *self.tx
    }

    /// Record that `table` changed so its observers are notified on commit
    pub fn touch(&mut self, table: SyncTable) {
        self.touched.insert(table);
    }

    pub async fn find<T: LocalTable>(&mut self, id: &str) -> Result<Option<DirtyRow<T>>> {
        table::find(&mut *self.tx, id).await
    }

    /// Insert or overwrite `row` as a local edit, bumping its dirty counter
    pub async fn save<T: LocalTable>(&mut self, row: &T) -> Result<()> {
        table::save(&mut *self.tx, row).await?;
        self.touch(T::TABLE);
        Ok(())
    }

    /// Store a remote row that won last-write-wins, clean
    ///
    /// Returns `false` if the stored row turned out to be newer and was kept.
    pub async fn apply_remote<T: LocalTable>(&mut self, row: &T) -> Result<bool> {
        let applied = table::apply_remote(&mut *self.tx, row).await?;
        if applied {
            self.touch(T::TABLE);
        }
        Ok(applied)
    }

    /// Queue a row for the next push without touching its content
    pub async fn mark_dirty<T: LocalTable>(&mut self, id: &str) -> Result<bool> {
        table::mark_dirty::<T>(&mut *self.tx, id).await
    }

    /// Compare-and-clear the dirty counter
    pub async fn mark_clean<T: LocalTable>(&mut self, id: &str, captured: i64) -> Result<bool> {
        table::mark_clean::<T>(&mut *self.tx, id, captured).await
    }

    /// Hard delete a row unless it changed after `not_after`
    pub async fn delete_local<T: LocalTable>(
        &mut self,
        id: &str,
        not_after: DateTime<Utc>,
    ) -> Result<bool> {
        let deleted = table::delete_local::<T>(&mut *self.tx, id, not_after).await?;
        if deleted {
            self.touch(T::TABLE);
        }
        Ok(deleted)
    }

    /// Commit and notify observers of every touched table
    pub async fn commit(self) -> Result<()> {
        let Self {
            tx,
            touched,
            changes,
        } = self;
        tx.commit().await?;

        for table in touched {
            tracing::trace!(table = %table, "Table changed");
            let _ = changes.send(table);
        }
        Ok(())
    }

    /// Discard every change
    pub async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
