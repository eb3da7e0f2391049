//! Broadcast dispatcher
//!
//! Resolves the subscribers of one or more channels, serializes the envelope
//! once, and pushes the same bytes into every subscriber's send queue.
//!
//! # Architecture
//!
//! ```text
//! webhook ──submit()──▶ DispatchHandle ──mpsc──▶ run_dispatch_loop()
//!                                                      │
//!                                         registry.snapshot(channels)
//!                                                      │
//!                                        for each connection: registry.send()
//!                                                      │
//!                                      ◀──oneshot── BroadcastReport
//! ```
//!
//! Requests are handled one at a time in arrival order, so the subscriber
//! snapshot of each broadcast is taken after the previous broadcast finished
//! queueing. Sends never wait on a socket: a full queue fails that connection
//! only.

use super::envelope::{ChannelId, MessageEnvelope};
use super::error::{DeliveryError, RelayError};
use super::registry::{ConnectionRegistry, SendOutcome};
use chrono::{DateTime, Utc};
use indexmap::IndexSet;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{RwLock, mpsc, oneshot};

/// Outcome of one broadcast call
#[derive(Debug, Clone, Default, Serialize)]
pub struct BroadcastReport {
    /// Envelope ID
    pub id: String,
    /// Distinct open connections in the subscriber snapshot
    pub recipients: usize,
    /// Frames handed to an idle writer
    pub delivered: usize,
    /// Frames queued behind earlier ones
    pub queued: usize,
    /// Connections that overflowed or were already gone
    pub failed: usize,
}

impl BroadcastReport {
    /// Frames accepted into a send queue
    pub fn accepted(&self) -> usize {
        self.delivered + self.queued
    }
}

/// Per-channel broadcast counters
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChannelActivity {
    /// Broadcasts that targeted the channel
    pub messages: u64,
    /// Time of the last broadcast
    pub last_message: Option<DateTime<Utc>>,
}

/// Fans envelopes out to channel subscribers
pub struct BroadcastDispatcher {
    registry: Arc<ConnectionRegistry>,
    activity: RwLock<HashMap<ChannelId, ChannelActivity>>,
}

impl BroadcastDispatcher {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            registry,
            activity: RwLock::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Broadcast an envelope to every open subscriber of `channels`
    ///
    /// A connection subscribed to several of the channels receives one copy.
    /// Connections that join after the snapshot don't receive this envelope.
    /// Zero subscribers is a successful no-op.
    pub async fn broadcast(
        &self,
        channels: &IndexSet<ChannelId>,
        envelope: &MessageEnvelope,
    ) -> Result<BroadcastReport, RelayError> {
        let payload = envelope.to_payload()?;
        let targets = self
            .registry
            .snapshot(channels.iter().map(String::as_str))
            .await;

        let mut report = BroadcastReport {
            id: envelope.id.clone(),
            recipients: targets.len(),
            ..Default::default()
        };

        for connection in &targets {
            match self.registry.send(connection, payload.clone()).await {
                SendOutcome::Delivered => report.delivered += 1,
                SendOutcome::Queued => report.queued += 1,
                SendOutcome::Failed(DeliveryError::Closed { .. }) => report.failed += 1,
                SendOutcome::Failed(e) => {
                    tracing::warn!(
                        connection_id = %connection.id(),
                        message_id = %envelope.id,
                        error = %e,
                        "Broadcast delivery failed"
                    );
                    report.failed += 1;
                }
            }
        }

        self.record_activity(channels).await;

        tracing::debug!(
            message_id = %report.id,
            channels = ?channels,
            recipients = report.recipients,
            failed = report.failed,
            "Broadcast dispatched"
        );

        Ok(report)
    }

    async fn record_activity(&self, channels: &IndexSet<ChannelId>) {
        let now = Utc::now();
        let mut activity = self.activity.write().await;
        for channel in channels {
            let entry = activity.entry(channel.clone()).or_default();
            entry.messages += 1;
            entry.last_message = Some(now);
        }
    }

    /// Broadcast counters for every channel that has been targeted
    pub async fn activity(&self) -> HashMap<ChannelId, ChannelActivity> {
        self.activity.read().await.clone()
    }

    /// Run the dispatch loop
    ///
    /// Handles queued requests one at a time and replies on each request's
    /// oneshot. Exits when every [`DispatchHandle`] is dropped.
    pub async fn run_dispatch_loop(&self, mut rx: mpsc::Receiver<DispatchRequest>) {
        tracing::info!("Broadcast dispatch loop started");

        while let Some(request) = rx.recv().await {
            let result = self.broadcast(&request.channels, &request.envelope).await;
            if request.reply.send(result).is_err() {
                tracing::debug!(
                    message_id = %request.envelope.id,
                    "Broadcast requester went away before the reply"
                );
            }
        }

        tracing::info!("All dispatch handles dropped, stopping dispatch loop");
    }

    /// Spawn the dispatch loop and return a handle to submit broadcasts
    pub fn spawn(self: Arc<Self>, capacity: usize) -> DispatchHandle {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        tokio::spawn(async move {
            self.run_dispatch_loop(rx).await;
        });
        DispatchHandle { tx }
    }
}

/// A broadcast waiting for the dispatch loop
#[derive(Debug)]
pub struct DispatchRequest {
    pub channels: IndexSet<ChannelId>,
    pub envelope: Arc<MessageEnvelope>,
    pub reply: oneshot::Sender<Result<BroadcastReport, RelayError>>,
}

/// Cloneable entry point into the dispatch loop
#[derive(Debug, Clone)]
pub struct DispatchHandle {
    tx: mpsc::Sender<DispatchRequest>,
}

impl DispatchHandle {
    /// Build a handle around an existing request queue
    pub fn from_sender(tx: mpsc::Sender<DispatchRequest>) -> Self {
        Self { tx }
    }

    /// Queue a broadcast and wait for its report
    pub async fn submit(
        &self,
        channels: IndexSet<ChannelId>,
        envelope: MessageEnvelope,
    ) -> Result<BroadcastReport, RelayError> {
        let (reply, response) = oneshot::channel();
        let request = DispatchRequest {
            channels,
            envelope: Arc::new(envelope),
            reply,
        };

        self.tx
            .send(request)
            .await
            .map_err(|_| RelayError::Internal("dispatcher is not running".to_string()))?;

        response
            .await
            .map_err(|_| RelayError::Internal("dispatcher dropped the request".to_string()))?
    }
}
