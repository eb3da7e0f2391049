//! ServerBuilder for fluent API to build and run the relay server

use super::exposure::{RestExposure, WebSocketExposure};
use super::host::ServerHost;
use crate::config::ServerConfig;
use crate::core::{RelayError, RequestError};
use anyhow::Result;
use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Builder for creating the relay HTTP + WebSocket server
///
/// # Example
///
/// ```ignore
/// ServerBuilder::new()
///     .with_config(ServerConfig::with_token("123"))
///     .serve()
///     .await?;
/// ```
pub struct ServerBuilder {
    config: Option<ServerConfig>,
    custom_routes: Vec<Router>,
}

impl ServerBuilder {
    /// Create a new ServerBuilder
    pub fn new() -> Self {
        Self {
            config: None,
            custom_routes: Vec::new(),
        }
    }

    /// Set the server configuration (required)
    pub fn with_config(mut self, config: ServerConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Add custom routes to the server
    ///
    /// Custom routes are merged into the REST surface and are not behind the
    /// shared-token check.
    pub fn with_custom_routes(mut self, routes: Router) -> Self {
        self.custom_routes.push(routes);
        self
    }

    /// Build the transport-agnostic host
    ///
    /// Starts the dispatch loop, so it must run inside a Tokio runtime.
    pub fn build_host(&mut self) -> Result<ServerHost> {
        let config = self
            .config
            .take()
            .ok_or_else(|| anyhow::anyhow!("ServerConfig is required. Call .with_config()"))?;
        Ok(ServerHost::from_config(config)?)
    }

    /// Build the full application router from an existing host
    ///
    /// REST routes, the `/ws` endpoint, a JSON 404 fallback, and request tracing.
    pub fn build_router(host: Arc<ServerHost>, custom_routes: Vec<Router>) -> Result<Router> {
        let rest_router = RestExposure::build_router(host.clone(), custom_routes)?;
        let ws_router = WebSocketExposure::build_router(host)?;

        Ok(rest_router
            .merge(ws_router)
            .fallback(not_found)
            .layer(TraceLayer::new_for_http()))
    }

    /// Build the host and the router together
    ///
    /// Returns the host as well so callers (and tests) can reach the registry.
    pub fn build_with_host(mut self) -> Result<(Arc<ServerHost>, Router)> {
        let custom_routes = std::mem::take(&mut self.custom_routes);
        let host = Arc::new(self.build_host()?);
        let router = Self::build_router(host.clone(), custom_routes)?;
        Ok((host, router))
    }

    /// Build the final router
    pub fn build(self) -> Result<Router> {
        Ok(self.build_with_host()?.1)
    }

    /// Serve on the configured address until SIGINT/SIGTERM
    pub async fn serve(self) -> Result<()> {
        let addr = self
            .config
            .as_ref()
            .map(ServerConfig::socket_addr)
            .ok_or_else(|| anyhow::anyhow!("ServerConfig is required. Call .with_config()"))?;
        let listener = TcpListener::bind(&addr).await?;

        self.serve_with_listener(listener, shutdown_signal()).await
    }

    /// Serve on an already-bound listener until `shutdown` resolves
    pub async fn serve_with_listener<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (host, app) = self.build_with_host()?;
        let local_addr = listener.local_addr()?;

        tracing::info!(addr = %local_addr, "Server listening");
        if host.config.compression.enabled {
            tracing::info!(
                threshold = host.config.compression.threshold,
                level = host.config.compression.level,
                "HTTP response compression enabled; WebSocket frames are sent uncompressed"
            );
        }

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await?;

        tracing::info!("Server shutdown complete");
        Ok(())
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

async fn not_found() -> RelayError {
    RequestError::NotFound.into()
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM signal, initiating graceful shutdown...");
        },
    }
}
