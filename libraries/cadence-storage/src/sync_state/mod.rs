//! Sync bookkeeping: pull cursors, pending tombstones and the error log

use crate::error::Result;
use crate::store::LocalStore;
use cadence_core::{time, SyncTable};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqliteConnection};

/// A locally hard-deleted row whose removal still has to reach the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tombstone {
    pub table: SyncTable,
    pub row_id: String,
    pub user_id: String,
    pub deleted_at: DateTime<Utc>,
}

/// A failure recorded by a sync cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncErrorEntry {
    pub cycle_id: String,
    /// `None` for failures that are not tied to one table
    pub table: Option<SyncTable>,
    pub kind: String,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

/// Pull watermark of `table` for `user_id`
pub async fn get_cursor(
    store: &LocalStore,
    user_id: &str,
    table: SyncTable,
) -> Result<Option<DateTime<Utc>>> {
    let watermark: Option<i64> = sqlx::query_scalar(
        "SELECT watermark FROM sync_cursors WHERE user_id = ? AND table_name = ?",
    )
    .bind(user_id)
    .bind(table.as_str())
    .fetch_optional(store.pool())
    .await?;

    Ok(watermark.map(time::from_micros))
}

/// Store the pull watermark of `table`
///
/// Watermarks only move forward; an older value is ignored.
pub async fn set_cursor(
    store: &LocalStore,
    user_id: &str,
    table: SyncTable,
    watermark: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO sync_cursors (user_id, table_name, watermark, updated_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(user_id, table_name) DO UPDATE SET
            watermark = MAX(watermark, excluded.watermark),
            updated_at = excluded.updated_at
        "#,
    )
    .bind(user_id)
    .bind(table.as_str())
    .bind(time::to_micros(watermark))
    .bind(time::to_micros(time::now()))
    .execute(store.pool())
    .await?;

    Ok(())
}

/// Every stored watermark of `user_id`
pub async fn cursors(store: &LocalStore, user_id: &str) -> Result<Vec<(SyncTable, DateTime<Utc>)>> {
    let rows = sqlx::query(
        "SELECT table_name, watermark FROM sync_cursors WHERE user_id = ? ORDER BY table_name",
    )
    .bind(user_id)
    .fetch_all(store.pool())
    .await?;

    Ok(rows
        .iter()
        .filter_map(|row| {
            let name: String = row.get("table_name");
            SyncTable::from_str(&name).map(|table| (table, time::from_micros(row.get("watermark"))))
        })
        .collect())
}

/// Queue the removal of a hard-deleted row, inside the deleting transaction
pub(crate) async fn record_tombstone(
    conn: &mut SqliteConnection,
    table: SyncTable,
    row_id: &str,
    user_id: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO sync_tombstones (table_name, row_id, user_id, deleted_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(table_name, row_id) DO UPDATE SET deleted_at = excluded.deleted_at
        "#,
    )
    .bind(table.as_str())
    .bind(row_id)
    .bind(user_id)
    .bind(time::to_micros(time::now()))
    .execute(conn)
    .await?;

    Ok(())
}

/// Pending tombstones of `table` for `user_id`
pub async fn tombstones(store: &LocalStore, user_id: &str, table: SyncTable) -> Result<Vec<Tombstone>> {
    let rows = sqlx::query(
        r#"
        SELECT row_id, user_id, deleted_at FROM sync_tombstones
        WHERE user_id = ? AND table_name = ?
        ORDER BY deleted_at ASC
        "#,
    )
    .bind(user_id)
    .bind(table.as_str())
    .fetch_all(store.pool())
    .await?;

    Ok(rows
        .iter()
        .map(|row| Tombstone {
            table,
            row_id: row.get("row_id"),
            user_id: row.get("user_id"),
            deleted_at: time::from_micros(row.get("deleted_at")),
        })
        .collect())
}

/// Drop tombstones whose removal the backend acknowledged
pub async fn clear_tombstones(store: &LocalStore, table: SyncTable, row_ids: &[String]) -> Result<u64> {
    let mut tx = store.pool().begin().await?;
    let mut cleared = 0;
    for row_id in row_ids {
        cleared += sqlx::query("DELETE FROM sync_tombstones WHERE table_name = ? AND row_id = ?")
            .bind(table.as_str())
            .bind(row_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
    }
    tx.commit().await?;
    Ok(cleared)
}

/// Append to the sync error log
pub async fn log_error(store: &LocalStore, entry: &SyncErrorEntry) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO sync_errors (cycle_id, table_name, error_kind, message, occurred_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&entry.cycle_id)
    .bind(entry.table.map(|t| t.as_str()))
    .bind(&entry.kind)
    .bind(&entry.message)
    .bind(time::to_micros(entry.occurred_at))
    .execute(store.pool())
    .await?;

    Ok(())
}

/// Most recent sync errors, newest first
pub async fn recent_errors(store: &LocalStore, limit: i64) -> Result<Vec<SyncErrorEntry>> {
    let rows = sqlx::query(
        r#"
        SELECT cycle_id, table_name, error_kind, message, occurred_at
        FROM sync_errors
        ORDER BY occurred_at DESC, id DESC
        LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(store.pool())
    .await?;

    Ok(rows
        .iter()
        .map(|row| SyncErrorEntry {
            cycle_id: row.get("cycle_id"),
            table: row
                .get::<Option<String>, _>("table_name")
                .as_deref()
                .and_then(SyncTable::from_str),
            kind: row.get("error_kind"),
            message: row.get("message"),
            occurred_at: time::from_micros(row.get("occurred_at")),
        })
        .collect())
}

/// Delete log entries older than `before`
pub async fn prune_errors(store: &LocalStore, before: DateTime<Utc>) -> Result<u64> {
    let result = sqlx::query("DELETE FROM sync_errors WHERE occurred_at < ?")
        .bind(time::to_micros(before))
        .execute(store.pool())
        .await?;
    Ok(result.rows_affected())
}
