//! Admin surface: shared-token middleware, stats, and forced disconnects

use crate::core::{
    ChannelActivity, ChannelId, ConnectionState, PayloadError, RelayError, RequestError,
};
use crate::server::host::ServerHost;
use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Reject requests whose `Authorization` header is not the configured token
///
/// Runs as a route layer, so the body of a rejected request is never read.
pub async fn require_token(
    State(host): State<Arc<ServerHost>>,
    request: Request,
    next: Next,
) -> Result<Response, RelayError> {
    if let Err(e) = host.auth.verify(request.headers()) {
        tracing::debug!(path = %request.uri().path(), reason = ?e, "Rejected unauthorized request");
        return Err(e.into());
    }
    Ok(next.run(request).await)
}

#[derive(Debug, Serialize)]
pub struct ChannelStats {
    pub channel_id: ChannelId,
    /// Current subscribers
    pub connections: usize,
    /// Broadcasts since startup
    pub messages: u64,
    pub last_message: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct ClientStats {
    pub id: String,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub channels: Vec<ChannelId>,
    pub connected_at: DateTime<Utc>,
    pub state: ConnectionState,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub channels: Vec<ChannelStats>,
    pub clients: Vec<ClientStats>,
}

/// `GET /stats`
///
/// Channels are listed if they currently have subscribers or have ever been
/// broadcast to, sorted by channel ID. Clients are sorted by connect time.
pub async fn stats_handler(State(host): State<Arc<ServerHost>>) -> Json<StatsResponse> {
    let mut merged: BTreeMap<ChannelId, (usize, ChannelActivity)> = host
        .dispatcher
        .activity()
        .await
        .into_iter()
        .map(|(channel, activity)| (channel, (0, activity)))
        .collect();

    for (channel, count) in host.registry.channel_subscriber_counts().await {
        merged.entry(channel).or_default().0 = count;
    }

    let channels = merged
        .into_iter()
        .map(|(channel_id, (connections, activity))| ChannelStats {
            channel_id,
            connections,
            messages: activity.messages,
            last_message: activity.last_message,
        })
        .collect();

    let mut clients: Vec<ClientStats> = host
        .registry
        .connections()
        .await
        .iter()
        .map(|conn| ClientStats {
            id: conn.id().to_string(),
            ip: conn.info().addr.map(|addr| addr.ip().to_string()),
            user_agent: conn.info().user_agent.clone(),
            channels: conn.channels().iter().cloned().collect(),
            connected_at: conn.info().connected_at,
            state: conn.state(),
        })
        .collect();
    clients.sort_by(|a, b| a.connected_at.cmp(&b.connected_at).then(a.id.cmp(&b.id)));

    Json(StatsResponse { channels, clients })
}

#[derive(Debug, Deserialize)]
pub struct DisconnectRequest {
    /// Connection ID as listed by `/stats`
    pub id: String,
}

#[derive(Debug, Serialize)]
pub struct DisconnectResponse {
    pub ok: bool,
    pub id: String,
}

/// `POST /disconnect`
///
/// Unregisters the connection (its queued frames are discarded) and wakes its
/// writer, which sends a Close frame.
pub async fn disconnect_handler(
    State(host): State<Arc<ServerHost>>,
    payload: Result<Json<DisconnectRequest>, JsonRejection>,
) -> Result<Json<DisconnectResponse>, RelayError> {
    let Json(request) = payload.map_err(|rejection| match rejection {
        JsonRejection::MissingJsonContentType(_) => PayloadError::UnsupportedMediaType {
            content_type: String::new(),
        },
        other => PayloadError::InvalidJson {
            message: other.body_text(),
        },
    })?;

    let connection = host
        .registry
        .get(&request.id)
        .await
        .ok_or_else(|| RequestError::ConnectionNotFound {
            id: request.id.clone(),
        })?;

    host.registry.begin_close(&connection);
    host.registry.unregister(connection.id()).await;

    tracing::info!(connection_id = %request.id, "Connection force-closed by admin");

    Ok(Json(DisconnectResponse {
        ok: true,
        id: request.id,
    }))
}
