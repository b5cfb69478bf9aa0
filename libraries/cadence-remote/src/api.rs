//! The backend contract used by sync and migration.

use crate::error::{RemoteError, Result};
use crate::types::{InvalidRow, PulledRows, RealtimeSubscription, UpsertOutcome};
use async_trait::async_trait;
use cadence_core::{SyncRecord, SyncTable};
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Column the backend stamps with its own clock on every insert and update
///
/// Device clocks decide conflicts through `updated_at`; the backend clock
/// decides what is new since a pull. A row pushed late with an old
/// `updated_at` still gets a fresh `synced_at`.
pub const SYNCED_AT: &str = "synced_at";

/// CRUD and realtime access to the user-scoped backend tables.
///
/// Rows travel as JSON so the trait stays object-safe; [`RemoteApiExt`]
/// adds typed wrappers.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Rows of `user_id` with [`SYNCED_AT`] at or after `cursor`, in
    /// [`SYNCED_AT`] order
    ///
    /// `None` fetches everything.
    async fn fetch_since(
        &self,
        table: SyncTable,
        user_id: &str,
        cursor: Option<DateTime<Utc>>,
    ) -> Result<Vec<Value>>;

    /// Insert or overwrite rows by id
    ///
    /// Rows the backend refuses are reported in `rejected` without failing
    /// the others.
    async fn upsert(&self, table: SyncTable, rows: Vec<Value>) -> Result<UpsertOutcome<Value>>;

    /// Mark rows deleted
    async fn soft_delete(&self, table: SyncTable, ids: &[String]) -> Result<()>;

    /// Insert a single new row
    async fn create(&self, table: SyncTable, row: Value) -> Result<Value>;

    /// Live changes to `table` scoped to `user_id`
    async fn subscribe(&self, table: SyncTable, user_id: &str) -> Result<RealtimeSubscription>;
}

/// Typed helpers over [`RemoteApi`]
#[async_trait]
pub trait RemoteApiExt: RemoteApi {
    async fn fetch_rows<R: SyncRecord>(
        &self,
        user_id: &str,
        cursor: Option<DateTime<Utc>>,
    ) -> Result<PulledRows<R>> {
        let values = self.fetch_since(R::TABLE, user_id, cursor).await?;
        let mut pulled = PulledRows::default();

        // An undecodable row still counts towards the watermark
        for value in values {
            pulled.watermark = pulled.watermark.max(synced_at(&value));
            let id = row_id(&value);
            match decode_row(value) {
                Ok(row) => pulled.rows.push(row),
                Err(e) => pulled.invalid.push(InvalidRow {
                    id,
                    message: e.to_string(),
                }),
            }
        }
        Ok(pulled)
    }

    async fn upsert_rows<R: SyncRecord>(&self, rows: &[R]) -> Result<UpsertOutcome<R>> {
        let values = rows
            .iter()
            .map(serde_json::to_value)
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let outcome = self.upsert(R::TABLE, values).await?;
        Ok(UpsertOutcome {
            committed: outcome
                .committed
                .into_iter()
                .map(decode_row)
                .collect::<Result<_>>()?,
            rejected: outcome.rejected,
        })
    }

    async fn create_row<R: SyncRecord>(&self, row: &R) -> Result<R> {
        let created = self.create(R::TABLE, serde_json::to_value(row)?).await?;
        decode_row(created)
    }
}

impl<A: RemoteApi + ?Sized> RemoteApiExt for A {}

/// Decode a backend row into a typed record
pub fn decode_row<R: SyncRecord>(value: Value) -> Result<R> {
    serde_json::from_value(value)
        .map_err(|e| RemoteError::Decode(format!("{} row: {}", R::TABLE, e)))
}

/// Backend write stamp of a JSON row
pub fn synced_at(row: &Value) -> Option<DateTime<Utc>> {
    row.get(SYNCED_AT)
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
}

/// Id of a JSON row, empty if absent
pub fn row_id(row: &Value) -> String {
    row.get("id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}
