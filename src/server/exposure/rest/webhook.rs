//! Webhook ingestion
//!
//! `POST /webhook/{channels}` turns an authenticated JSON body into a
//! [`MessageEnvelope`] and hands it to the dispatch loop. The token was
//! already checked by the route middleware; the content type is checked before
//! the channel path, and the body is parsed last.

use crate::core::{MessageEnvelope, PayloadError, RelayError, parse_target_channels};
use crate::server::host::ServerHost;
use axum::Json;
use axum::body::Bytes;
use axum::extract::rejection::PathRejection;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::http::header::CONTENT_TYPE;
use serde::Serialize;
use std::sync::Arc;

/// Acknowledgment returned once the broadcast has been queued
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub ok: bool,
    /// Envelope ID
    pub id: String,
    /// Open subscribers in the broadcast snapshot
    pub recipients: usize,
}

/// Accept a webhook and fan it out to the named channels
pub async fn webhook_handler(
    State(host): State<Arc<ServerHost>>,
    channels: Result<Path<String>, PathRejection>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, RelayError> {
    require_json(&headers)?;

    let Path(raw_channels) = channels.map_err(|e| PayloadError::InvalidChannel {
        channel: e.body_text(),
    })?;
    let channels = parse_target_channels(&raw_channels)?;
    let envelope = MessageEnvelope::from_slice(&body)?;

    tracing::debug!(
        message_id = %envelope.id,
        message_type = %envelope.kind,
        channels = ?channels,
        "Webhook accepted"
    );

    let report = host.dispatch.submit(channels, envelope).await?;

    Ok(Json(WebhookResponse {
        ok: true,
        id: report.id,
        recipients: report.recipients,
    }))
}

/// The body must be declared as JSON; parameters such as charset are allowed
fn require_json(headers: &HeaderMap) -> Result<(), PayloadError> {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    let mime = content_type.split(';').next().unwrap_or_default().trim();
    if mime.eq_ignore_ascii_case("application/json") {
        Ok(())
    } else {
        Err(PayloadError::UnsupportedMediaType {
            content_type: content_type.to_string(),
        })
    }
}
