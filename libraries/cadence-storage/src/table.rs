//! Generic row access shared by every synced table
//!
//! Each entity describes its columns once through [`LocalTable`]; inserts,
//! last-write-wins overwrites and dirty bookkeeping are built from that
//! description.

use crate::error::Result;
use crate::query::{bind_value, Value};
use cadence_core::{time, SyncRecord};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

/// A synced entity stored in a local table of the same name
///
/// `COLUMNS` lists every persisted field in the order [`LocalTable::values`]
/// returns them; `id` must come first. The local-only `dirty` column is not
/// part of the list.
pub trait LocalTable: SyncRecord {
    const COLUMNS: &'static [&'static str];

    /// Decode a row selected with `COLUMNS`
    fn from_row(row: &SqliteRow) -> std::result::Result<Self, sqlx::Error>;

    /// Column values in `COLUMNS` order
    fn values(&self) -> Vec<Value>;
}

/// A stored row together with its dirty counter
#[derive(Debug, Clone, PartialEq)]
pub struct DirtyRow<T> {
    pub row: T,
    pub dirty: i64,
}

impl<T> DirtyRow<T> {
    /// Whether the row has local changes not yet acknowledged by the backend
    pub fn is_dirty(&self) -> bool {
        self.dirty > 0
    }
}

pub(crate) fn timestamp(row: &SqliteRow, column: &str) -> std::result::Result<DateTime<Utc>, sqlx::Error> {
    Ok(time::from_micros(row.try_get::<i64, _>(column)?))
}

pub(crate) fn optional_timestamp(
    row: &SqliteRow,
    column: &str,
) -> std::result::Result<Option<DateTime<Utc>>, sqlx::Error> {
    Ok(row
        .try_get::<Option<i64>, _>(column)?
        .map(time::from_micros))
}

pub(crate) fn flag(row: &SqliteRow, column: &str) -> std::result::Result<bool, sqlx::Error> {
    Ok(row.try_get::<i64, _>(column)? != 0)
}

fn select_sql<T: LocalTable>(predicate: &str) -> String {
    format!(
        "SELECT {}, dirty FROM {} WHERE {}",
        T::COLUMNS.join(", "),
        T::TABLE.as_str(),
        predicate
    )
}

fn decode<T: LocalTable>(row: &SqliteRow) -> Result<DirtyRow<T>> {
    Ok(DirtyRow {
        row: T::from_row(row)?,
        dirty: row.try_get("dirty")?,
    })
}

/// How an upsert treats the dirty counter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    /// Local edit: bump the counter
    Local,
    /// Remote row that won last-write-wins: store clean
    Remote,
}

fn upsert_sql<T: LocalTable>(origin: Origin) -> String {
    let table = T::TABLE.as_str();
    let placeholders = vec!["?"; T::COLUMNS.len()].join(", ");
    let assignments = T::COLUMNS
        .iter()
        .skip(1)
        .map(|c| format!("{c} = excluded.{c}"))
        .collect::<Vec<_>>()
        .join(", ");

    match origin {
        Origin::Local => format!(
            "INSERT INTO {table} ({cols}, dirty) VALUES ({placeholders}, 1) \
             ON CONFLICT(id) DO UPDATE SET {assignments}, dirty = {table}.dirty + 1",
            cols = T::COLUMNS.join(", "),
        ),
        // A row written locally after the engine read it carries a newer
        // timestamp and must survive.
        Origin::Remote => format!(
            "INSERT INTO {table} ({cols}, dirty) VALUES ({placeholders}, 0) \
             ON CONFLICT(id) DO UPDATE SET {assignments}, dirty = 0 \
             WHERE excluded.updated_at >= {table}.updated_at",
            cols = T::COLUMNS.join(", "),
        ),
    }
}

async fn upsert<T: LocalTable>(conn: &mut SqliteConnection, row: &T, origin: Origin) -> Result<bool> {
    let sql = upsert_sql::<T>(origin);
    let mut query = sqlx::query(&sql);
    for value in row.values() {
        query = bind_value(query, value);
    }
    let result = query.execute(conn).await?;
    Ok(result.rows_affected() > 0)
}

/// Fetch a row and its dirty counter by id
pub(crate) async fn find<T: LocalTable>(conn: &mut SqliteConnection, id: &str) -> Result<Option<DirtyRow<T>>> {
    let sql = select_sql::<T>("id = ?");
    let row = sqlx::query(&sql).bind(id).fetch_optional(conn).await?;
    row.as_ref().map(decode::<T>).transpose()
}

/// Every row of `user_id` with a non-zero dirty counter
pub(crate) async fn dirty_rows<T: LocalTable>(
    conn: &mut SqliteConnection,
    user_id: &str,
) -> Result<Vec<DirtyRow<T>>> {
    let sql = format!("{} ORDER BY updated_at ASC", select_sql::<T>("user_id = ? AND dirty > 0"));
    let rows = sqlx::query(&sql).bind(user_id).fetch_all(conn).await?;
    rows.iter().map(decode::<T>).collect()
}

/// Insert or overwrite a row as a local edit
pub(crate) async fn save<T: LocalTable>(conn: &mut SqliteConnection, row: &T) -> Result<()> {
    upsert(conn, row, Origin::Local).await.map(|_| ())
}

/// Insert or overwrite a row with a remote version, stored clean
///
/// Returns `false` when the stored row is newer than `row` and was kept.
pub(crate) async fn apply_remote<T: LocalTable>(conn: &mut SqliteConnection, row: &T) -> Result<bool> {
    upsert(conn, row, Origin::Remote).await
}

/// Queue a row for the next push without changing its content
pub(crate) async fn mark_dirty<T: LocalTable>(conn: &mut SqliteConnection, id: &str) -> Result<bool> {
    let sql = format!("UPDATE {} SET dirty = dirty + 1 WHERE id = ?", T::TABLE.as_str());
    let result = sqlx::query(&sql).bind(id).execute(conn).await?;
    Ok(result.rows_affected() > 0)
}

/// Clear the dirty counter if it still holds `captured`
///
/// Returns `false` when the row was written again after it was collected; it
/// then stays dirty for the next cycle.
pub(crate) async fn mark_clean<T: LocalTable>(
    conn: &mut SqliteConnection,
    id: &str,
    captured: i64,
) -> Result<bool> {
    let sql = format!(
        "UPDATE {} SET dirty = 0 WHERE id = ? AND dirty = ?",
        T::TABLE.as_str()
    );
    let result = sqlx::query(&sql).bind(id).bind(captured).execute(conn).await?;
    Ok(result.rows_affected() > 0)
}

/// Hard delete a row unless it was modified after `not_after`
pub(crate) async fn delete_local<T: LocalTable>(
    conn: &mut SqliteConnection,
    id: &str,
    not_after: DateTime<Utc>,
) -> Result<bool> {
    let sql = format!(
        "DELETE FROM {} WHERE id = ? AND updated_at <= ?",
        T::TABLE.as_str()
    );
    let result = sqlx::query(&sql)
        .bind(id)
        .bind(time::to_micros(not_after))
        .execute(conn)
        .await?;
    Ok(result.rows_affected() > 0)
}
