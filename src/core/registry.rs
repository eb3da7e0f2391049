//! Connection registry for WebSocket clients
//!
//! The `ConnectionRegistry` owns every live connection and the
//! [`ChannelRouter`] that indexes them. Structural changes (register,
//! unregister) take the write lock; dispatch takes a read lock only long enough
//! to copy a subscriber snapshot, then sends without holding any lock.
//!
//! # Lifecycle
//!
//! ```text
//! CONNECTING ──open()──▶ OPEN ──close/error/overflow──▶ CLOSING ──unregister()──▶ CLOSED
//! ```
//!
//! Only `OPEN` connections are broadcast targets.

use super::envelope::{ChannelId, Payload};
use super::error::DeliveryError;
use super::router::{ChannelRouter, ConnectionId};
use chrono::{DateTime, Utc};
use indexmap::IndexSet;
use serde::Serialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use tokio::sync::{Notify, RwLock, mpsc};
use uuid::Uuid;

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ConnectionState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnectionState::Connecting,
            1 => ConnectionState::Open,
            2 => ConnectionState::Closing,
            _ => ConnectionState::Closed,
        }
    }
}

/// Metadata captured at connect time
#[derive(Debug, Clone)]
pub struct ClientInfo {
    /// Peer address, when the server was started with connect info
    pub addr: Option<SocketAddr>,
    /// User-Agent header of the upgrade request
    pub user_agent: Option<String>,
    /// When the connection was registered
    pub connected_at: DateTime<Utc>,
}

impl ClientInfo {
    pub fn new(addr: Option<SocketAddr>, user_agent: Option<String>) -> Self {
        Self {
            addr,
            user_agent,
            connected_at: Utc::now(),
        }
    }
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// A single WebSocket connection
///
/// The subscription set is fixed at connect time.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    channels: IndexSet<ChannelId>,
    tx: mpsc::Sender<Payload>,
    state: AtomicU8,
    shutdown: Notify,
    info: ClientInfo,
}

/// Shared reference to a registered connection
pub type ConnectionHandle = Arc<Connection>;

impl Connection {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Channels this connection subscribed to, in request order
    pub fn channels(&self) -> &IndexSet<ChannelId> {
        &self.channels
    }

    pub fn info(&self) -> &ClientInfo {
        &self.info
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Resolves once the registry has torn this connection down
    ///
    /// The writer task selects on this so queued frames are dropped rather
    /// than flushed after an unregister.
    pub async fn closed(&self) {
        self.shutdown.notified().await
    }

    fn transition(&self, from: ConnectionState, to: ConnectionState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn set_state(&self, to: ConnectionState) {
        self.state.store(to as u8, Ordering::Release);
    }
}

/// Result of a single non-blocking send
#[derive(Debug)]
pub enum SendOutcome {
    /// Handed to an idle writer with nothing queued ahead of it
    Delivered,
    /// Accepted behind frames already waiting in the queue
    Queued,
    /// Rejected; the connection is being torn down
    Failed(DeliveryError),
}

impl SendOutcome {
    pub fn is_accepted(&self) -> bool {
        !matches!(self, SendOutcome::Failed(_))
    }
}

#[derive(Debug, Default)]
struct RegistryInner {
    connections: HashMap<ConnectionId, ConnectionHandle>,
    router: ChannelRouter,
}

/// Tracks all live connections and their channel memberships
pub struct ConnectionRegistry {
    inner: RwLock<RegistryInner>,
    queue_capacity: usize,
}

impl ConnectionRegistry {
    /// Create a registry whose connections get a send queue of `queue_capacity` frames
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
            queue_capacity: queue_capacity.max(1),
        }
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// Register a new connection subscribed to `channels`
    ///
    /// Returns the handle (state `Connecting`) and the receiving end of its
    /// send queue. An empty channel set is legal; such a connection receives
    /// nothing.
    pub async fn register(
        &self,
        channels: IndexSet<ChannelId>,
        info: ClientInfo,
    ) -> (ConnectionHandle, mpsc::Receiver<Payload>) {
        let id = format!("conn_{}", Uuid::new_v4().simple());
        let (tx, rx) = mpsc::channel(self.queue_capacity);

        let handle = Arc::new(Connection {
            id: id.clone(),
            channels,
            tx,
            state: AtomicU8::new(ConnectionState::Connecting as u8),
            shutdown: Notify::new(),
            info,
        });

        {
            let mut inner = self.inner.write().await;
            for channel in handle.channels() {
                inner.router.add_subscription(&id, channel);
            }
            inner.connections.insert(id.clone(), handle.clone());
        }

        tracing::debug!(
            connection_id = %id,
            channels = ?handle.channels(),
            "WebSocket client registered"
        );

        (handle, rx)
    }

    /// Mark a registered connection as `Open` (eligible for broadcasts)
    pub fn open(&self, handle: &Connection) -> bool {
        handle.transition(ConnectionState::Connecting, ConnectionState::Open)
    }

    /// Mark a connection as `Closing` without removing it yet
    pub fn begin_close(&self, handle: &Connection) {
        if handle.transition(ConnectionState::Connecting, ConnectionState::Closing)
            || handle.transition(ConnectionState::Open, ConnectionState::Closing)
        {
            tracing::debug!(connection_id = %handle.id(), "WebSocket client closing");
        }
    }

    /// Remove a connection from all channel indices and mark it `Closed`
    ///
    /// Idempotent. Returns `true` if the connection was still registered.
    /// Frames still queued for it are discarded.
    pub async fn unregister(&self, connection_id: &str) -> bool {
        let removed = {
            let mut inner = self.inner.write().await;
            let removed = inner.connections.remove(connection_id);
            inner.router.remove_connection(connection_id);
            removed
        };

        match removed {
            Some(handle) => {
                handle.set_state(ConnectionState::Closed);
                handle.shutdown.notify_one();
                tracing::debug!(connection_id = %connection_id, "WebSocket client unregistered");
                true
            }
            None => false,
        }
    }

    /// Attempt a non-blocking send to one connection
    ///
    /// A full queue or a vanished writer fails this connection only and
    /// unregisters it; other connections are unaffected.
    pub async fn send(&self, handle: &Connection, payload: Payload) -> SendOutcome {
        if !handle.is_open() {
            return SendOutcome::Failed(DeliveryError::Closed {
                connection_id: handle.id().to_string(),
            });
        }

        let idle = handle.tx.capacity() == handle.tx.max_capacity();
        let error = match handle.tx.try_send(payload) {
            Ok(()) if idle => return SendOutcome::Delivered,
            Ok(()) => return SendOutcome::Queued,
            Err(mpsc::error::TrySendError::Full(_)) => DeliveryError::QueueFull {
                connection_id: handle.id().to_string(),
                capacity: self.queue_capacity,
            },
            Err(mpsc::error::TrySendError::Closed(_)) => DeliveryError::Closed {
                connection_id: handle.id().to_string(),
            },
        };

        tracing::warn!(connection_id = %handle.id(), error = %error, "Dropping connection");
        self.begin_close(handle);
        self.unregister(handle.id()).await;
        SendOutcome::Failed(error)
    }

    /// Copy the open subscribers of `channels`, each connection at most once
    pub async fn snapshot<'a, I>(&self, channels: I) -> Vec<ConnectionHandle>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let inner = self.inner.read().await;
        let mut seen: IndexSet<&str> = IndexSet::new();
        let mut targets = Vec::new();

        for channel in channels {
            for connection_id in inner.router.subscribers_iter(channel) {
                if !seen.insert(connection_id.as_str()) {
                    continue;
                }
                if let Some(handle) = inner.connections.get(connection_id)
                    && handle.is_open()
                {
                    targets.push(handle.clone());
                }
            }
        }

        targets
    }

    /// Look up a connection by ID
    pub async fn get(&self, connection_id: &str) -> Option<ConnectionHandle> {
        self.inner.read().await.connections.get(connection_id).cloned()
    }

    /// All registered connections
    pub async fn connections(&self) -> Vec<ConnectionHandle> {
        self.inner.read().await.connections.values().cloned().collect()
    }

    /// `(channel, subscriber count)` for every channel with subscribers
    pub async fn channel_subscriber_counts(&self) -> Vec<(ChannelId, usize)> {
        let inner = self.inner.read().await;
        inner
            .router
            .channels()
            .map(|(id, count)| (id.clone(), count))
            .collect()
    }

    /// Number of subscribers of one channel
    pub async fn subscriber_count(&self, channel: &str) -> usize {
        self.inner.read().await.router.subscriber_count(channel)
    }

    /// Get the number of registered connections (for monitoring)
    pub async fn connection_count(&self) -> usize {
        self.inner.read().await.connections.len()
    }

    /// Check the router index invariant (used by tests)
    pub async fn is_consistent(&self) -> bool {
        let inner = self.inner.read().await;
        inner.router.is_consistent()
            && inner.connections.iter().all(|(id, handle)| {
                handle
                    .channels()
                    .iter()
                    .all(|ch| inner.router.subscribers_iter(ch).any(|c| c == id))
            })
    }
}
