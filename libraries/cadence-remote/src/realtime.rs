//! Realtime change feed over the backend's websocket (Phoenix channels).
//!
//! One socket per subscription: join a `postgres_changes` channel filtered to
//! the user, heartbeat every 30 seconds, forward row changes.

use crate::error::{RemoteError, Result};
use crate::types::{ChangeKind, RealtimeEvent, RealtimeSubscription, RemoteConfig};
use cadence_core::{Session, SyncTable};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const EVENT_BUFFER: usize = 64;

/// Websocket endpoint for a REST base URL
pub(crate) fn socket_url(config: &RemoteConfig) -> Result<String> {
    let base = if let Some(rest) = config.url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = config.url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        return Err(RemoteError::InvalidUrl(config.url.clone()));
    };

    let mut url = url::Url::parse(&format!("{base}/realtime/v1/websocket"))
        .map_err(|e| RemoteError::InvalidUrl(e.to_string()))?;
    url.query_pairs_mut()
        .append_pair("apikey", &config.anon_key)
        .append_pair("vsn", "1.0.0");
    Ok(url.to_string())
}

pub(crate) fn topic(table: SyncTable, user_id: &str) -> String {
    format!("realtime:{}:{}", table.as_str(), user_id)
}

/// Channel join request for changes to `table` rows owned by `user_id`
pub(crate) fn join_message(table: SyncTable, user_id: &str, access_token: &str) -> Value {
    json!({
        "topic": topic(table, user_id),
        "event": "phx_join",
        "payload": {
            "config": {
                "postgres_changes": [{
                    "event": "*",
                    "schema": "public",
                    "table": table.as_str(),
                    "filter": format!("user_id=eq.{user_id}"),
                }]
            },
            "access_token": access_token,
        },
        "ref": "1",
    })
}

fn heartbeat_message(seq: u64) -> Value {
    json!({
        "topic": "phoenix",
        "event": "heartbeat",
        "payload": {},
        "ref": seq.to_string(),
    })
}

/// Extract a row change from a server frame; other frames yield `None`
pub(crate) fn parse_change(table: SyncTable, frame: &str) -> Option<RealtimeEvent> {
    let message: Value = serde_json::from_str(frame).ok()?;
    if message.get("event")?.as_str()? != "postgres_changes" {
        return None;
    }

    let data = message.get("payload")?.get("data")?;
    let kind = ChangeKind::from_str(data.get("type")?.as_str()?)?;
    let row = match kind {
        ChangeKind::Delete => data.get("old_record")?,
        ChangeKind::Insert | ChangeKind::Update => data.get("record")?,
    };

    Some(RealtimeEvent {
        table,
        kind,
        row: row.clone(),
    })
}

fn is_join_error(frame: &str) -> Option<String> {
    let message: Value = serde_json::from_str(frame).ok()?;
    let event = message.get("event")?.as_str()?;
    let payload = message.get("payload")?;

    let failed = matches!(event, "phx_reply" | "phx_error" | "system")
        && payload.get("status").and_then(Value::as_str) == Some("error");
    failed.then(|| payload.to_string())
}

/// Connect, join and start forwarding events
pub(crate) async fn subscribe(
    config: &RemoteConfig,
    session: &Session,
    table: SyncTable,
    user_id: &str,
) -> Result<RealtimeSubscription> {
    let url = socket_url(config)?;
    let (socket, _) = tokio_tungstenite::connect_async(url.as_str())
        .await
        .map_err(|e| RemoteError::NetworkUnavailable(e.to_string()))?;
    let (mut sink, mut stream) = socket.split();

    let join = join_message(table, user_id, &session.access_token);
    sink.send(WsMessage::Text(join.to_string().into()))
        .await
        .map_err(|e| RemoteError::NetworkUnavailable(e.to_string()))?;

    info!(table = %table, "Realtime subscription started");

    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    let task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut seq: u64 = 1;

        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    seq += 1;
                    let frame = WsMessage::Text(heartbeat_message(seq).to_string().into());
                    if let Err(e) = sink.send(frame).await {
                        warn!(table = %table, error = %e, "Realtime heartbeat failed");
                        break;
                    }
                }
                message = stream.next() => {
                    match message {
                        Some(Ok(WsMessage::Text(text))) => {
                            if let Some(error) = is_join_error(text.as_str()) {
                                warn!(table = %table, error = %error, "Realtime channel error");
                                break;
                            }
                            if let Some(event) = parse_change(table, text.as_str()) {
                                debug!(table = %table, kind = ?event.kind, "Realtime change");
                                if tx.send(event).await.is_err() {
                                    break;
                                }
                            }
                        }
                        Some(Ok(WsMessage::Ping(payload))) => {
                            let _ = sink.send(WsMessage::Pong(payload)).await;
                        }
                        Some(Ok(WsMessage::Close(_))) | None => {
                            info!(table = %table, "Realtime connection closed");
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!(table = %table, error = %e, "Realtime connection failed");
                            break;
                        }
                    }
                }
            }
        }
    });

    Ok(RealtimeSubscription::with_task(rx, task))
}
