//! Core module: broadcast domain types, independent of the HTTP/WebSocket exposure

pub mod auth;
pub mod dispatcher;
pub mod envelope;
pub mod error;
pub mod rate_limit;
pub mod registry;
pub mod router;

pub use auth::TokenAuth;
pub use dispatcher::{BroadcastDispatcher, BroadcastReport, ChannelActivity, DispatchHandle};
pub use envelope::{ChannelId, MessageEnvelope, Payload, parse_channels, parse_target_channels};
pub use error::{
    AuthError, ConfigError, DeliveryError, PayloadError, RelayError, RequestError,
};
pub use rate_limit::ConnectRateLimiter;
pub use registry::{
    ClientInfo, Connection, ConnectionHandle, ConnectionRegistry, ConnectionState, SendOutcome,
};
pub use router::{ChannelRouter, ConnectionId};
