//! WebSocket upgrade handler and per-connection loops
//!
//! This module handles the HTTP → WebSocket upgrade and runs two tasks per
//! connection:
//!
//! 1. A write loop that drains the connection's send queue into the socket and
//!    sends a Ping frame every heartbeat interval, dropping peers that leave
//!    too many pings unanswered
//! 2. A read loop that answers `{"type":"ping"}` and watches for the close
//!
//! Whichever task finishes first ends the connection; the other is aborted and
//! the connection is unregistered.

use super::protocol::{ClientMessage, ServerMessage, WsQuery};
use crate::core::{
    ClientInfo, ConnectionHandle, ConnectionRegistry, Payload, PayloadError, RelayError,
    parse_channels,
};
use crate::server::host::ServerHost;
use axum::body::Bytes;
use axum::extract::rejection::QueryRejection;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{ConnectInfo, FromRequestParts, Query, State, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::http::header::USER_AGENT;
use axum::http::request::Parts;
use axum::response::Response;
use futures::SinkExt;
use futures::stream::{SplitSink, SplitStream, StreamExt};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};

/// Peer address, if the server was started with connect info
///
/// Unlike `ConnectInfo`, this never rejects, so the router also works under
/// `axum_test::TestServer` and `tower::ServiceExt::oneshot`.
#[derive(Debug, Clone, Copy)]
pub struct PeerAddr(pub Option<SocketAddr>);

impl<S> FromRequestParts<S> for PeerAddr
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(PeerAddr(
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| *addr),
        ))
    }
}

/// WebSocket upgrade handler
///
/// This is the axum handler for `GET /ws?channels=a,b`. Rate limiting and
/// channel validation happen before the upgrade, so a rejected client gets a
/// plain HTTP error.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(host): State<Arc<ServerHost>>,
    PeerAddr(addr): PeerAddr,
    headers: HeaderMap,
    query: Result<Query<WsQuery>, QueryRejection>,
) -> Result<Response, RelayError> {
    if let (Some(limiter), Some(addr)) = (&host.rate_limiter, addr)
        && let Err(e) = limiter.check(addr.ip()).await
    {
        tracing::warn!(ip = %addr.ip(), "WebSocket connect rate limited");
        return Err(e.into());
    }

    let Query(query) = query.map_err(|e| PayloadError::InvalidField {
        field: "channels".to_string(),
        message: e.body_text(),
    })?;
    let channels = parse_channels(query.channels.as_deref().unwrap_or_default())?;

    let user_agent = headers
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let info = ClientInfo::new(addr, user_agent);

    Ok(ws.on_upgrade(move |socket| async move {
        let (conn, rx) = host.registry.register(channels, info).await;
        handle_socket(socket, host, conn, rx).await;
    }))
}

/// Drive a registered connection until either side ends it
async fn handle_socket(
    socket: WebSocket,
    host: Arc<ServerHost>,
    conn: ConnectionHandle,
    rx: mpsc::Receiver<Payload>,
) {
    let registry = host.registry.clone();
    let (ws_write, ws_read) = socket.split();
    let missed = Arc::new(AtomicU32::new(0));

    let mut write_handle = tokio::spawn(write_loop(
        conn.clone(),
        rx,
        ws_write,
        host.config.heartbeat_interval(),
        missed.clone(),
    ));

    if !registry.open(&conn) {
        // Force-closed before the upgrade finished
        write_handle.abort();
        registry.unregister(conn.id()).await;
        return;
    }

    tracing::debug!(
        connection_id = %conn.id(),
        channels = ?conn.channels(),
        addr = ?conn.info().addr,
        "WebSocket client connected"
    );

    let mut read_handle = tokio::spawn(read_loop(registry.clone(), conn.clone(), ws_read, missed));

    tokio::select! {
        _ = &mut write_handle => read_handle.abort(),
        _ = &mut read_handle => write_handle.abort(),
    }

    // Cleanup
    registry.begin_close(&conn);
    registry.unregister(conn.id()).await;
    tracing::debug!(connection_id = %conn.id(), "WebSocket client disconnected");
}

/// Upper bound on a single socket write
///
/// A peer that stops reading eventually fills the TCP window; past this the
/// connection is dropped instead of pinning its tasks.
const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound on delivering the close frame during teardown
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Heartbeats the peer may leave unanswered before it is dropped
const MAX_MISSED_HEARTBEATS: u32 = 2;

/// Forward queued frames to the socket and keep the connection alive
///
/// Stops as soon as the registry tears the connection down, even mid-write;
/// frames still queued at that point are dropped.
async fn write_loop(
    conn: ConnectionHandle,
    mut rx: mpsc::Receiver<Payload>,
    mut ws_write: SplitSink<WebSocket, Message>,
    heartbeat: Duration,
    missed: Arc<AtomicU32>,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + heartbeat, heartbeat);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            _ = conn.closed() => {
                let delivered = tokio::time::timeout(
                    CLOSE_TIMEOUT,
                    ws_write.send(Message::Close(None)),
                )
                .await;
                if !matches!(delivered, Ok(Ok(()))) {
                    tracing::debug!(connection_id = %conn.id(), "Close frame not delivered");
                }
                break;
            }
            frame = rx.recv() => {
                let Some(payload) = frame else { break };
                if !send_frame(&conn, &mut ws_write, Message::Text(payload)).await {
                    break;
                }
            }
            _ = ticker.tick() => {
                if missed.fetch_add(1, Ordering::AcqRel) >= MAX_MISSED_HEARTBEATS {
                    tracing::debug!(
                        connection_id = %conn.id(),
                        "Heartbeat not answered, closing"
                    );
                    break;
                }
                if !send_frame(&conn, &mut ws_write, Message::Ping(Bytes::new())).await {
                    break;
                }
            }
        }
    }
}

/// Write one frame, giving up on teardown or after [`SEND_TIMEOUT`]
///
/// Returns `false` when the write loop should stop.
async fn send_frame(
    conn: &ConnectionHandle,
    ws_write: &mut SplitSink<WebSocket, Message>,
    message: Message,
) -> bool {
    tokio::select! {
        biased;

        _ = conn.closed() => {
            tracing::debug!(connection_id = %conn.id(), "Connection closed during write");
            false
        }
        result = tokio::time::timeout(SEND_TIMEOUT, ws_write.send(message)) => match result {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::debug!(
                    connection_id = %conn.id(),
                    error = %e,
                    "WebSocket write failed, closing"
                );
                false
            }
            Err(_) => {
                tracing::warn!(connection_id = %conn.id(), "WebSocket write timed out, closing");
                false
            }
        },
    }
}

/// Read client frames until the client goes away
///
/// Any inbound frame counts as proof of life and resets the heartbeat count.
async fn read_loop(
    registry: Arc<ConnectionRegistry>,
    conn: ConnectionHandle,
    mut ws_read: SplitStream<WebSocket>,
    missed: Arc<AtomicU32>,
) {
    while let Some(result) = ws_read.next().await {
        match result {
            Ok(Message::Text(text)) => {
                missed.store(0, Ordering::Release);
                handle_client_message(&registry, &conn, text.as_str()).await;
            }
            Ok(Message::Close(_)) => {
                tracing::debug!(connection_id = %conn.id(), "Client sent close frame");
                break;
            }
            Ok(_) => {
                // Pong, ping and binary frames
                missed.store(0, Ordering::Release);
            }
            Err(e) => {
                tracing::debug!(
                    connection_id = %conn.id(),
                    error = %e,
                    "WebSocket read error"
                );
                break;
            }
        }
    }
}

/// Process a single client text frame
async fn handle_client_message(registry: &ConnectionRegistry, conn: &ConnectionHandle, text: &str) {
    let Ok(ClientMessage::Ping) = serde_json::from_str::<ClientMessage>(text) else {
        tracing::trace!(connection_id = %conn.id(), "Ignoring client frame");
        return;
    };

    match serde_json::to_string(&ServerMessage::Pong) {
        Ok(json) => {
            registry.send(conn, Payload::from(json)).await;
        }
        Err(e) => {
            tracing::error!(
                connection_id = %conn.id(),
                error = %e,
                "Failed to serialize ServerMessage"
            );
        }
    }
}
