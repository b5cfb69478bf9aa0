//! HTTP client for the backend's REST interface.

use crate::api::{row_id, RemoteApi, SYNCED_AT};
use crate::error::{RemoteError, Result};
use crate::realtime;
use crate::types::{RealtimeSubscription, RejectedRow, RemoteConfig, UpsertOutcome};
use async_trait::async_trait;
use cadence_core::{time, Session, SessionContext, SyncTable};
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, RequestBuilder, Response};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

/// REST client for the sync backend.
///
/// Every request reads the current session from the shared
/// [`SessionContext`]; the client never stores credentials of its own.
///
/// # Example
///
/// ```ignore
/// use cadence_core::{Session, SessionContext};
/// use cadence_remote::{RemoteApiExt, RemoteConfig, RestClient};
///
/// let session = SessionContext::signed_in(Session::new("user-1", "jwt"));
/// let client = RestClient::new(RemoteConfig::new("https://project.example.co", "anon"), session)?;
///
/// let playlists = client.fetch_rows::<cadence_core::Playlist>("user-1", None).await?;
/// ```
#[derive(Clone)]
pub struct RestClient {
    http: Client,
    config: RemoteConfig,
    session: SessionContext,
}

impl RestClient {
    /// Create a new client with the given configuration.
    pub fn new(config: RemoteConfig, session: SessionContext) -> Result<Self> {
        if config.url.is_empty() {
            return Err(RemoteError::InvalidUrl("URL cannot be empty".into()));
        }

        let url = config.url.trim_end_matches('/').to_string();
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(RemoteError::InvalidUrl(
                "URL must start with http:// or https://".into(),
            ));
        }
        url::Url::parse(&url).map_err(|e| RemoteError::InvalidUrl(e.to_string()))?;

        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(format!("Cadence/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RemoteError::NetworkUnavailable(e.to_string()))?;

        Ok(Self {
            http,
            config: RemoteConfig { url, ..config },
            session,
        })
    }

    /// Backend base URL, without trailing slash
    pub fn url(&self) -> &str {
        &self.config.url
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    fn current_session(&self) -> Result<Session> {
        self.session.current().ok_or(RemoteError::Unauthenticated)
    }

    fn table_url(&self, table: SyncTable) -> String {
        format!("{}/rest/v1/{}", self.config.url, table.as_str())
    }

    fn authorize(&self, request: RequestBuilder, session: &Session) -> RequestBuilder {
        request
            .header("apikey", &self.config.anon_key)
            .bearer_auth(&session.access_token)
    }

    async fn send(request: RequestBuilder) -> Result<Response> {
        let response = request.send().await?;
        let status = response.status();

        if status.is_success() {
            Ok(response)
        } else {
            let message = response.text().await.unwrap_or_default();
            Err(RemoteError::from_status(status.as_u16(), message))
        }
    }

    async fn json_rows(response: Response) -> Result<Vec<Value>> {
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        match serde_json::from_str::<Value>(&text)? {
            Value::Array(rows) => Ok(rows),
            Value::Object(row) => Ok(vec![Value::Object(row)]),
            other => Err(RemoteError::Decode(format!("expected rows, got {other}"))),
        }
    }

    async fn post_rows(&self, table: SyncTable, session: &Session, rows: &[Value]) -> Result<Vec<Value>> {
        let request = self
            .authorize(self.http.post(self.table_url(table)), session)
            .query(&[("on_conflict", "id")])
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .json(rows);

        Self::json_rows(Self::send(request).await?).await
    }

    /// Upsert one row at a time so refused rows do not take others down
    async fn upsert_each(
        &self,
        table: SyncTable,
        session: &Session,
        rows: Vec<Value>,
    ) -> Result<UpsertOutcome<Value>> {
        let mut outcome = UpsertOutcome::default();

        for row in rows {
            match self.post_rows(table, session, std::slice::from_ref(&row)).await {
                Ok(stored) => outcome.committed.extend(stored),
                Err(RemoteError::RemoteRejected { status, message }) => {
                    warn!(table = %table, id = %row_id(&row), status, message = %message, "Row rejected");
                    outcome.rejected.push(RejectedRow {
                        id: row_id(&row),
                        status,
                        message,
                    });
                }
                Err(e) => return Err(e),
            }
        }

        Ok(outcome)
    }
}

fn format_cursor(cursor: DateTime<Utc>) -> String {
    cursor.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[async_trait]
impl RemoteApi for RestClient {
    async fn fetch_since(
        &self,
        table: SyncTable,
        user_id: &str,
        cursor: Option<DateTime<Utc>>,
    ) -> Result<Vec<Value>> {
        let session = self.current_session()?;
        let page_size = self.config.page_size.max(1);
        let mut rows = Vec::new();

        loop {
            let mut params = vec![
                ("select", "*".to_string()),
                ("user_id", format!("eq.{user_id}")),
                ("order", format!("{SYNCED_AT}.asc,id.asc")),
                ("limit", page_size.to_string()),
                ("offset", rows.len().to_string()),
            ];
            if let Some(cursor) = cursor {
                params.push((SYNCED_AT, format!("gte.{}", format_cursor(cursor))));
            }

            let request = self
                .authorize(self.http.get(self.table_url(table)), &session)
                .query(&params);
            let page = Self::json_rows(Self::send(request).await?).await?;
            let complete = page.len() < page_size;
            rows.extend(page);

            if complete {
                break;
            }
        }

        debug!(table = %table, rows = rows.len(), cursor = ?cursor, "Fetched remote rows");
        Ok(rows)
    }

    async fn upsert(&self, table: SyncTable, rows: Vec<Value>) -> Result<UpsertOutcome<Value>> {
        if rows.is_empty() {
            return Ok(UpsertOutcome::default());
        }
        let session = self.current_session()?;

        match self.post_rows(table, &session, &rows).await {
            Ok(committed) => {
                debug!(table = %table, rows = committed.len(), "Upserted batch");
                Ok(UpsertOutcome {
                    committed,
                    rejected: Vec::new(),
                })
            }
            Err(RemoteError::RemoteRejected { status, message }) if rows.len() > 1 => {
                debug!(table = %table, status, message = %message, "Batch rejected, retrying row by row");
                self.upsert_each(table, &session, rows).await
            }
            Err(RemoteError::RemoteRejected { status, message }) => Ok(UpsertOutcome {
                committed: Vec::new(),
                rejected: vec![RejectedRow {
                    id: rows.first().map(row_id).unwrap_or_default(),
                    status,
                    message,
                }],
            }),
            Err(e) => Err(e),
        }
    }

    async fn soft_delete(&self, table: SyncTable, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let session = self.current_session()?;
        let now = format_cursor(time::now());

        let request = self
            .authorize(self.http.patch(self.table_url(table)), &session)
            .query(&[("id", format!("in.({})", ids.join(",")))])
            .header("Prefer", "return=minimal")
            .json(&json!({
                "is_deleted": true,
                "deleted_at": now,
                "updated_at": now,
            }));
        Self::send(request).await?;

        debug!(table = %table, rows = ids.len(), "Soft deleted remote rows");
        Ok(())
    }

    async fn create(&self, table: SyncTable, row: Value) -> Result<Value> {
        let session = self.current_session()?;
        let request = self
            .authorize(self.http.post(self.table_url(table)), &session)
            .header("Prefer", "return=representation")
            .json(&row);

        Self::json_rows(Self::send(request).await?)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RemoteError::Decode("create returned no row".into()))
    }

    async fn subscribe(&self, table: SyncTable, user_id: &str) -> Result<RealtimeSubscription> {
        let session = self.current_session()?;
        realtime::subscribe(&self.config, &session, table, user_id).await
    }
}
