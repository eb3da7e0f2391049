//! Server host shared by all exposures
//!
//! The host owns the broadcast state (registry, dispatcher, rate limiter) and
//! is handed to the REST and WebSocket exposures as `Arc<ServerHost>`. It is
//! agnostic to the transport and is the single source of truth for the
//! connection and channel state of this instance.

use crate::config::ServerConfig;
use crate::core::{
    BroadcastDispatcher, ConnectRateLimiter, ConnectionRegistry, DispatchHandle, RelayError,
    TokenAuth,
};
use std::sync::Arc;

/// Capacity of the queue between webhook handlers and the dispatch loop
pub const DISPATCH_QUEUE_CAPACITY: usize = 1024;

/// Host context containing all server state
///
/// # Example
///
/// ```rust,ignore
/// let host = Arc::new(ServerHost::from_config(ServerConfig::with_token("123"))?);
///
/// let rest_app = RestExposure::build_router(host.clone(), vec![])?;
/// let ws_app = WebSocketExposure::build_router(host)?;
/// ```
pub struct ServerHost {
    /// Validated configuration
    pub config: Arc<ServerConfig>,

    /// Shared-token checker for webhook and admin routes
    pub auth: TokenAuth,

    /// Live connections and the channel index
    pub registry: Arc<ConnectionRegistry>,

    /// Fan-out engine (used directly for stats)
    pub dispatcher: Arc<BroadcastDispatcher>,

    /// Entry point into the running dispatch loop
    pub dispatch: DispatchHandle,

    /// Connect rate limiter, if enabled
    pub rate_limiter: Option<Arc<ConnectRateLimiter>>,
}

impl ServerHost {
    /// Build the host and start its dispatch loop
    ///
    /// Must be called from within a Tokio runtime.
    pub fn from_config(config: ServerConfig) -> Result<Self, RelayError> {
        config.validate_config()?;

        let registry = Arc::new(ConnectionRegistry::new(config.queue_capacity));
        let dispatcher = Arc::new(BroadcastDispatcher::new(registry.clone()));
        let dispatch = dispatcher.clone().spawn(DISPATCH_QUEUE_CAPACITY);

        let rate_limiter = config.rate_limit.enabled.then(|| {
            Arc::new(ConnectRateLimiter::new(
                config.rate_limit.max_connections,
                config.rate_limit.window(),
            ))
        });

        Ok(Self {
            auth: TokenAuth::new(config.auth_token.clone()),
            config: Arc::new(config),
            registry,
            dispatcher,
            dispatch,
            rate_limiter,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_from_config_builds_state() {
        let host = ServerHost::from_config(ServerConfig::with_token("123")).unwrap();

        assert_eq!(host.registry.queue_capacity(), 256);
        assert_eq!(host.registry.connection_count().await, 0);
        assert!(host.rate_limiter.is_some());
        assert!(host.auth.verify_value(Some("123")).is_ok());
    }

    #[tokio::test]
    async fn test_rate_limiter_disabled() {
        let mut config = ServerConfig::with_token("123");
        config.rate_limit.enabled = false;

        let host = ServerHost::from_config(config).unwrap();
        assert!(host.rate_limiter.is_none());
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let result = ServerHost::from_config(ServerConfig::default());
        assert!(matches!(result, Err(RelayError::Config(_))));
    }
}
