//! HTTP-level tests for webhook ingestion and the admin surface
//!
//! These run the full router in-process with `axum_test::TestServer`; no
//! WebSocket clients are involved, so broadcasts reach zero recipients.

use axum::body::Bytes;
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderValue, StatusCode};
use axum_test::TestServer;
use relay::config::ServerConfig;
use relay::core::{ClientInfo, parse_channels};
use relay::server::{ServerBuilder, ServerHost};
use serde_json::{Value, json};
use std::sync::Arc;

fn token() -> HeaderValue {
    HeaderValue::from_static("123")
}

async fn make_server() -> (TestServer, Arc<ServerHost>) {
    let (host, app) = ServerBuilder::new()
        .with_config(ServerConfig::with_token("123"))
        .build_with_host()
        .unwrap();
    (TestServer::new(app).unwrap(), host)
}

mod auth_tests {
    use super::*;

    #[tokio::test]
    async fn test_wrong_token_rejected() {
        let (server, _host) = make_server().await;

        let response = server
            .post("/webhook/12345")
            .add_header(AUTHORIZATION, HeaderValue::from_static("WRONG"))
            .json(&json!({"message": "hi"}))
            .await;

        response.assert_status(StatusCode::UNAUTHORIZED);
        let body: Value = response.json();
        assert_eq!(body["ok"], false);
        assert_eq!(body["error"], "UNAUTHORIZED");
        assert!(!body.to_string().contains("123"));
    }

    #[tokio::test]
    async fn test_missing_token_rejected() {
        let (server, _host) = make_server().await;

        let response = server
            .post("/webhook/12345")
            .json(&json!({"message": "hi"}))
            .await;

        response.assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_auth_checked_before_body() {
        let (server, _host) = make_server().await;

        // Malformed body and bad content type still produce 401
        let response = server
            .post("/webhook/12345")
            .add_header(AUTHORIZATION, HeaderValue::from_static("WRONG"))
            .text("{not json")
            .await;

        response.assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_admin_routes_require_token() {
        let (server, _host) = make_server().await;

        server.get("/stats").await.assert_status(StatusCode::UNAUTHORIZED);
        server
            .post("/disconnect")
            .json(&json!({"id": "conn_x"}))
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_health_is_public() {
        let (server, _host) = make_server().await;

        let response = server.get("/health").await;
        response.assert_status_ok();
        response.assert_json(&json!({"status": "ok", "service": "relay"}));
    }
}

mod payload_tests {
    use super::*;

    #[tokio::test]
    async fn test_accepts_object_body() {
        let (server, _host) = make_server().await;

        let response = server
            .post("/webhook/12345")
            .add_header(AUTHORIZATION, token())
            .json(&json!({"message": "Test message 1"}))
            .await;

        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["ok"], true);
        assert_eq!(body["recipients"], 0);
        assert!(body["id"].as_str().unwrap().starts_with("msg_"));
    }

    #[tokio::test]
    async fn test_client_supplied_id_echoed() {
        let (server, _host) = make_server().await;

        let response = server
            .post("/webhook/orders")
            .add_header(AUTHORIZATION, token())
            .json(&json!({"id": "evt-9", "type": "order.created", "data": {}}))
            .await;

        response.assert_status_ok();
        assert_eq!(response.json::<Value>()["id"], "evt-9");
    }

    #[tokio::test]
    async fn test_non_json_content_type() {
        let (server, _host) = make_server().await;

        let response = server
            .post("/webhook/12345")
            .add_header(AUTHORIZATION, token())
            .text(r#"{"message": "hi"}"#)
            .await;

        response.assert_status(StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(response.json::<Value>()["error"], "UNSUPPORTED_MEDIA_TYPE");
    }

    #[tokio::test]
    async fn test_malformed_json() {
        let (server, _host) = make_server().await;

        let response = server
            .post("/webhook/12345")
            .add_header(AUTHORIZATION, token())
            .bytes(Bytes::from_static(b"{not json"))
            .content_type("application/json")
            .await;

        response.assert_status_bad_request();
        assert_eq!(response.json::<Value>()["error"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn test_non_object_body() {
        let (server, _host) = make_server().await;

        for body in [json!([1, 2, 3]), json!("text"), json!(42), json!(null)] {
            let response = server
                .post("/webhook/12345")
                .add_header(AUTHORIZATION, token())
                .json(&body)
                .await;
            response.assert_status_bad_request();
        }
    }

    #[tokio::test]
    async fn test_non_string_type_rejected() {
        let (server, _host) = make_server().await;

        let response = server
            .post("/webhook/12345")
            .add_header(AUTHORIZATION, token())
            .json(&json!({"type": 5, "data": {}}))
            .await;

        response.assert_status_bad_request();
        assert_eq!(response.json::<Value>()["error"], "INVALID_FIELD");
    }

    #[tokio::test]
    async fn test_extra_top_level_keys_not_treated_as_envelope() {
        let (server, _host) = make_server().await;

        // Not an envelope, so `type` is plain data and not validated
        let response = server
            .post("/webhook/12345")
            .add_header(AUTHORIZATION, token())
            .json(&json!({"id": 7, "type": 5, "data": {}, "source": "billing"}))
            .await;

        response.assert_status_ok();
        assert!(response.json::<Value>()["id"].as_str().unwrap().starts_with("msg_"));
    }

    #[tokio::test]
    async fn test_invalid_channel_identifier() {
        let (server, _host) = make_server().await;

        let long = "x".repeat(129);
        for channel in ["bad%20channel", "bad!chan", ",,", long.as_str()] {
            let response = server
                .post(&format!("/webhook/{}", channel))
                .add_header(AUTHORIZATION, token())
                .json(&json!({"message": "hi"}))
                .await;
            response.assert_status_bad_request();
            assert_eq!(response.json::<Value>()["error"], "INVALID_CHANNEL");
        }
    }

    #[tokio::test]
    async fn test_broadcast_alias_same_contract() {
        let (server, _host) = make_server().await;

        server
            .post("/broadcast/news")
            .add_header(AUTHORIZATION, token())
            .json(&json!({"headline": "hi"}))
            .await
            .assert_status_ok();

        server
            .post("/broadcast/news")
            .add_header(AUTHORIZATION, HeaderValue::from_static("WRONG"))
            .json(&json!({"headline": "hi"}))
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }
}

mod admin_tests {
    use super::*;

    #[tokio::test]
    async fn test_stats_reports_activity() {
        let (server, host) = make_server().await;

        let (conn, _rx) = host
            .registry
            .register(parse_channels("alerts").unwrap(), ClientInfo::default())
            .await;
        host.registry.open(&conn);

        server
            .post("/webhook/alerts,audit")
            .add_header(AUTHORIZATION, token())
            .json(&json!({"level": "high"}))
            .await
            .assert_status_ok();

        let response = server.get("/stats").add_header(AUTHORIZATION, token()).await;
        response.assert_status_ok();

        let stats: Value = response.json();
        let channels = stats["channels"].as_array().unwrap();
        assert_eq!(channels.len(), 2);
        assert_eq!(channels[0]["channel_id"], "alerts");
        assert_eq!(channels[0]["connections"], 1);
        assert_eq!(channels[0]["messages"], 1);
        assert_eq!(channels[1]["channel_id"], "audit");
        assert_eq!(channels[1]["connections"], 0);

        let clients = stats["clients"].as_array().unwrap();
        assert_eq!(clients.len(), 1);
        assert_eq!(clients[0]["id"], conn.id());
        assert_eq!(clients[0]["ip"], Value::Null);
    }

    #[tokio::test]
    async fn test_disconnect_known_connection() {
        let (server, host) = make_server().await;

        let (conn, mut rx) = host
            .registry
            .register(parse_channels("a").unwrap(), ClientInfo::default())
            .await;
        host.registry.open(&conn);

        let response = server
            .post("/disconnect")
            .add_header(AUTHORIZATION, token())
            .json(&json!({"id": conn.id()}))
            .await;

        response.assert_status_ok();
        assert_eq!(response.json::<Value>()["ok"], true);
        assert!(!conn.is_open());
        assert_eq!(host.registry.connection_count().await, 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_disconnect_unknown_connection() {
        let (server, _host) = make_server().await;

        let response = server
            .post("/disconnect")
            .add_header(AUTHORIZATION, token())
            .json(&json!({"id": "conn_missing"}))
            .await;

        response.assert_status_not_found();
        assert_eq!(response.json::<Value>()["error"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_disconnect_requires_id() {
        let (server, _host) = make_server().await;

        server
            .post("/disconnect")
            .add_header(AUTHORIZATION, token())
            .json(&json!({}))
            .await
            .assert_status_bad_request();
    }
}

mod routing_tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_route_is_json_404() {
        let (server, _host) = make_server().await;

        let response = server.get("/nope").await;
        response.assert_status_not_found();
        let body: Value = response.json();
        assert_eq!(body["ok"], false);
        assert_eq!(body["error"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_ws_requires_upgrade() {
        let (server, _host) = make_server().await;

        let response = server.get("/ws?channels=a").await;
        assert!(response.status_code().is_client_error());
    }
}
