//! # Relay
//!
//! A channel-based WebSocket broadcast server with webhook ingestion.
//!
//! Backend services `POST` JSON to `/webhook/{channels}`; every WebSocket
//! client connected to `/ws?channels=...` with at least one of those channels
//! receives the same envelope.
//!
//! ## Features
//!
//! - **Fixed subscriptions**: channels are chosen once, at connect time
//! - **Fan-out without duplicates**: a client on several target channels gets one copy
//! - **Slow-consumer isolation**: bounded per-connection queues; overflow drops only that client
//! - **Shared-token auth** on webhook and admin routes, checked before the body is read
//! - **Admin surface**: `/stats` and `/disconnect`
//! - **YAML + environment configuration**
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use relay::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     ServerBuilder::new()
//!         .with_config(ServerConfig::with_token("123"))
//!         .serve()
//!         .await
//! }
//! ```
//!
//! ```text
//! wscat -c 'ws://localhost:3131/ws?channels=orders'
//! curl -X POST localhost:3131/webhook/orders \
//!     -H 'Authorization: 123' -H 'Content-Type: application/json' \
//!     -d '{"message": "hello"}'
//! ```

pub mod config;
pub mod core;
pub mod server;

/// Re-exports of commonly used types
pub mod prelude {
    // === Core ===
    pub use crate::core::{
        BroadcastDispatcher, BroadcastReport, ChannelId, ChannelRouter, ClientInfo,
        ConnectionHandle, ConnectionId, ConnectionRegistry, ConnectionState, DispatchHandle,
        MessageEnvelope, Payload, RelayError, SendOutcome, TokenAuth, parse_channels,
        parse_target_channels,
    };

    // === Config ===
    pub use crate::config::{CompressionConfig, RateLimitConfig, ServerConfig};

    // === Server ===
    pub use crate::server::{RestExposure, ServerBuilder, ServerHost, WebSocketExposure};

    // === External dependencies ===
    pub use anyhow::Result;
    pub use chrono::{DateTime, Utc};
    pub use serde::{Deserialize, Serialize};
    pub use serde_json::{Value, json};

    // === Axum ===
    pub use axum::{
        Router,
        routing::{get, post},
    };
}
