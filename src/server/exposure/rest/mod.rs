//! REST API exposure for the relay
//!
//! Health checks, webhook ingestion, and the admin surface. Every route except
//! health and custom routes sits behind the shared-token middleware, which
//! runs before any body is read.
//!
//! The REST exposure consumes a `ServerHost` and produces an Axum `Router`.

mod admin;
mod webhook;

pub use admin::{
    ChannelStats, ClientStats, DisconnectRequest, DisconnectResponse, StatsResponse, require_token,
};
pub use webhook::{WebhookResponse, webhook_handler};

use super::super::host::ServerHost;
use crate::config::CompressionConfig;
use anyhow::Result;
use axum::{
    Json, Router, middleware,
    routing::{get, post},
};
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::CompressionLevel;
use tower_http::compression::CompressionLayer;
use tower_http::compression::predicate::SizeAbove;

/// REST API exposure implementation
pub struct RestExposure;

impl RestExposure {
    /// Build the REST router from a host
    ///
    /// # Arguments
    ///
    /// * `host` - The server host containing all relay state
    /// * `custom_routes` - Additional custom routes to merge
    ///
    /// # Returns
    ///
    /// An Axum router with:
    /// - Health check routes
    /// - `POST /webhook/{channels}` and its `POST /broadcast/{channels}` alias
    /// - `GET /stats` and `POST /disconnect`
    /// - Custom routes
    pub fn build_router(host: Arc<ServerHost>, custom_routes: Vec<Router>) -> Result<Router> {
        let protected = Router::new()
            .route("/webhook/{channels}", post(webhook_handler))
            .route("/broadcast/{channels}", post(webhook_handler))
            .route("/stats", get(admin::stats_handler))
            .route("/disconnect", post(admin::disconnect_handler))
            .route_layer(middleware::from_fn_with_state(host.clone(), require_token))
            .with_state(host.clone());

        let mut app = Self::health_routes().merge(protected);

        for custom_router in custom_routes {
            app = app.merge(custom_router);
        }

        if host.config.compression.enabled {
            app = app.layer(Self::compression_layer(&host.config.compression));
        }

        Ok(app)
    }

    fn compression_layer(config: &CompressionConfig) -> CompressionLayer<SizeAbove> {
        CompressionLayer::new()
            .gzip(true)
            .quality(CompressionLevel::Precise(config.level))
            .compress_when(SizeAbove::new(config.threshold))
    }

    /// Build health check routes
    fn health_routes() -> Router {
        Router::new()
            .route("/health", get(Self::health_check))
            .route("/healthz", get(Self::health_check))
    }

    /// Health check endpoint handler
    async fn health_check() -> Json<Value> {
        Json(json!({
            "status": "ok",
            "service": "relay"
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn host(config: ServerConfig) -> Arc<ServerHost> {
        Arc::new(ServerHost::from_config(config).unwrap())
    }

    #[tokio::test]
    async fn test_health_routes() {
        let app = RestExposure::build_router(host(ServerConfig::with_token("t")), vec![]).unwrap();

        for path in ["/health", "/healthz"] {
            let response = app
                .clone()
                .oneshot(Request::get(path).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
    }

    #[tokio::test]
    async fn test_stats_requires_token() {
        let app = RestExposure::build_router(host(ServerConfig::with_token("t")), vec![]).unwrap();

        let response = app
            .oneshot(Request::get("/stats").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_custom_routes_are_merged() {
        let custom = Router::new().route("/version", get(|| async { "1" }));
        let app =
            RestExposure::build_router(host(ServerConfig::with_token("t")), vec![custom]).unwrap();

        let response = app
            .oneshot(Request::get("/version").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_compression_applies_above_threshold() {
        let mut config = ServerConfig::with_token("t");
        config.compression.enabled = true;
        config.compression.threshold = 1;
        let app = RestExposure::build_router(host(config), vec![]).unwrap();

        let response = app
            .oneshot(
                Request::get("/health")
                    .header("accept-encoding", "gzip")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            response.headers().get("content-encoding").unwrap(),
            "gzip"
        );
    }
}
