//! Server module: shared host, protocol exposures, and the `ServerBuilder`

pub mod builder;
pub mod exposure;
pub mod host;

pub use builder::ServerBuilder;
pub use exposure::{RestExposure, WebSocketExposure};
pub use host::ServerHost;
