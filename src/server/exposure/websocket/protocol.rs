//! WebSocket protocol definitions
//!
//! The relay is push-only: after the upgrade the server sends serialized
//! [`MessageEnvelope`](crate::core::MessageEnvelope)s and nothing else
//! unprompted. Channels are chosen once, in the upgrade query string:
//!
//! ```text
//! GET /ws?channels=orders,alerts
//! ```
//!
//! ## Client → Server Messages
//!
//! ```json
//! // Application-level keepalive
//! {"type": "ping"}
//! ```
//!
//! Any other client frame is ignored.
//!
//! ## Server → Client Messages
//!
//! ```json
//! // Broadcast envelope
//! {"id": "msg_...", "type": "message", "data": {...}, "receivedAt": "..."}
//!
//! // Keepalive response
//! {"type": "pong"}
//! ```

use serde::{Deserialize, Serialize};

/// Query string of the upgrade request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WsQuery {
    /// Comma-separated channel IDs; absent or empty subscribes to nothing
    pub channels: Option<String>,
}

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Keepalive ping
    Ping,
}

/// Messages sent from server to client outside of broadcasts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Keepalive response
    Pong,
}
