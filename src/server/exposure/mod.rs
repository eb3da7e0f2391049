//! API exposure modules
//!
//! Each exposure consumes a `ServerHost` and produces a Router for its
//! protocol: REST for webhooks and admin, WebSocket for subscribers.

pub mod rest;
pub mod websocket;

pub use rest::RestExposure;
pub use websocket::WebSocketExposure;
