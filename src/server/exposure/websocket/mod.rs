//! WebSocket API exposure for the relay
//!
//! Clients subscribe to a fixed set of channels when they connect and then
//! receive every envelope broadcast to any of them.
//!
//! # Architecture
//!
//! ```text
//! Client ──ws──▶ /ws?channels=a,b ──▶ ws_handler() ──▶ ConnectionRegistry::register
//!                                                              │
//!        webhook ──▶ DispatchHandle ──▶ BroadcastDispatcher ───┘
//!                                              │
//!                                      send queue (bounded)
//!                                              │
//!                                   write_loop ──▶ Client
//! ```
//!
//! # Protocol
//!
//! See [`protocol`].

mod handler;
pub mod protocol;

pub use handler::PeerAddr;

use crate::server::host::ServerHost;
use anyhow::Result;
use axum::{Router, routing::get};
use std::sync::Arc;

/// WebSocket API exposure implementation
///
/// Consumes a `ServerHost` and produces an Axum router with the `/ws`
/// endpoint. Broadcasts reach the sockets through the host's registry, so the
/// dispatch loop must already be running (it is started by
/// [`ServerHost::from_config`]).
///
/// # Example
///
/// ```rust,ignore
/// let host = Arc::new(ServerHost::from_config(ServerConfig::with_token("123"))?);
///
/// let rest_router = RestExposure::build_router(host.clone(), vec![])?;
/// let ws_router = WebSocketExposure::build_router(host)?;
///
/// let app = rest_router.merge(ws_router);
/// ```
pub struct WebSocketExposure;

impl WebSocketExposure {
    /// Build the WebSocket router from a host
    pub fn build_router(host: Arc<ServerHost>) -> Result<Router> {
        let router = Router::new()
            .route("/ws", get(handler::ws_handler))
            .with_state(host);

        Ok(router)
    }
}
