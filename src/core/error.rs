//! Typed error handling for the relay server
//!
//! Every failure the server can observe is scoped to either one HTTP request or
//! one WebSocket connection. Nothing here is fatal to the process.
//!
//! # Error Categories
//!
//! - [`AuthError`]: bad or missing shared token, rejected before the body is read
//! - [`PayloadError`]: webhook body or channel path that fails the shape checks
//! - [`RequestError`]: other request-scoped rejections (rate limit, unknown connection)
//! - [`DeliveryError`]: a single connection could not accept a frame
//! - [`ConfigError`]: configuration loading and validation
//!
//! Broadcasting to a channel with no subscribers is not an error.
//!
//! # Example
//!
//! ```rust,ignore
//! match dispatcher.broadcast(&channels, &envelope).await {
//!     Ok(report) => println!("delivered to {}", report.recipients),
//!     Err(RelayError::Internal(msg)) => eprintln!("dispatch failed: {}", msg),
//!     Err(e) => eprintln!("{}", e),
//! }
//! ```

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// The main error type for the relay server
#[derive(Debug, Error)]
pub enum RelayError {
    /// Authentication errors
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Webhook payload and channel path errors
    #[error(transparent)]
    Payload(#[from] PayloadError),

    /// Request-scoped errors
    #[error(transparent)]
    Request(#[from] RequestError),

    /// Per-connection delivery errors
    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    /// Configuration errors
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Internal errors (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response structure for HTTP responses
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Always `false`, mirrors the `{ok: true}` acknowledgment
    pub ok: bool,
    /// Error code for programmatic handling
    pub error: String,
    /// Human-readable error message
    pub message: String,
}

impl RelayError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            RelayError::Auth(_) => StatusCode::UNAUTHORIZED,
            RelayError::Payload(e) => e.status_code(),
            RelayError::Request(e) => e.status_code(),
            RelayError::Delivery(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RelayError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RelayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            RelayError::Auth(_) => "UNAUTHORIZED",
            RelayError::Payload(e) => e.error_code(),
            RelayError::Request(e) => e.error_code(),
            RelayError::Delivery(e) => e.error_code(),
            RelayError::Config(_) => "CONFIG_ERROR",
            RelayError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Convert to an error response
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            ok: false,
            error: self.error_code().to_string(),
            message: self.to_string(),
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        if self.status_code().is_server_error() {
            tracing::error!(error = %self, code = self.error_code(), "request failed");
        }
        let status = self.status_code();
        let body = Json(self.to_response());
        (status, body).into_response()
    }
}

// =============================================================================
// Auth Errors
// =============================================================================

/// Errors related to the shared-token check
///
/// Both variants render the same message so a caller cannot tell a missing
/// header from a wrong token, and the expected token is never included.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No `Authorization` header (or a non-ASCII one)
    #[error("Unauthorized")]
    MissingToken,

    /// Header present but does not match the configured token
    #[error("Unauthorized")]
    InvalidToken,
}

// =============================================================================
// Payload Errors
// =============================================================================

/// Errors related to the webhook body and target channels
#[derive(Debug, Error)]
pub enum PayloadError {
    /// Body is not valid JSON
    #[error("Invalid JSON: {message}")]
    InvalidJson { message: String },

    /// Body is valid JSON but not an object
    #[error("Payload must be a JSON object, got {found}")]
    NotAnObject { found: &'static str },

    /// A reserved envelope field has the wrong type
    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    /// Content-Type is not JSON
    #[error("Unsupported media type: {content_type}")]
    UnsupportedMediaType { content_type: String },

    /// A channel identifier fails validation
    #[error("Invalid channel identifier: '{channel}'")]
    InvalidChannel { channel: String },

    /// The channel path segment contains no identifiers
    #[error("No channel identifier given")]
    EmptyChannelList,
}

impl PayloadError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            PayloadError::UnsupportedMediaType { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            PayloadError::InvalidJson { .. } => "BAD_REQUEST",
            PayloadError::NotAnObject { .. } => "BAD_REQUEST",
            PayloadError::InvalidField { .. } => "INVALID_FIELD",
            PayloadError::UnsupportedMediaType { .. } => "UNSUPPORTED_MEDIA_TYPE",
            PayloadError::InvalidChannel { .. } => "INVALID_CHANNEL",
            PayloadError::EmptyChannelList => "INVALID_CHANNEL",
        }
    }
}

// =============================================================================
// Request Errors
// =============================================================================

/// Errors related to HTTP requests that are neither auth nor payload shape
#[derive(Debug, Error)]
pub enum RequestError {
    /// Too many WebSocket connects from one address
    #[error("Too many connection attempts, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// Admin disconnect targeted an unknown connection
    #[error("Connection '{id}' not found")]
    ConnectionNotFound { id: String },

    /// No route matched
    #[error("Not found")]
    NotFound,
}

impl RequestError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RequestError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            RequestError::ConnectionNotFound { .. } => StatusCode::NOT_FOUND,
            RequestError::NotFound => StatusCode::NOT_FOUND,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            RequestError::RateLimited { .. } => "TOO_MANY_REQUESTS",
            RequestError::ConnectionNotFound { .. } => "NOT_FOUND",
            RequestError::NotFound => "NOT_FOUND",
        }
    }
}

// =============================================================================
// Delivery Errors
// =============================================================================

/// A single connection could not accept a frame
///
/// These never fail the originating broadcast; the connection is torn down
/// and the error is logged.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The bounded send queue is full (slow consumer)
    #[error("Send queue for connection '{connection_id}' is full ({capacity} frames)")]
    QueueFull {
        connection_id: String,
        capacity: usize,
    },

    /// The connection's writer is gone
    #[error("Connection '{connection_id}' is closed")]
    Closed { connection_id: String },
}

impl DeliveryError {
    pub fn error_code(&self) -> &'static str {
        match self {
            DeliveryError::QueueFull { .. } => "QUEUE_FULL",
            DeliveryError::Closed { .. } => "CONNECTION_CLOSED",
        }
    }
}

// =============================================================================
// Config Errors
// =============================================================================

/// Errors related to configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    /// IO error while reading configuration
    #[error("IO error reading '{path}': {message}")]
    Io { path: String, message: String },

    /// Failed to parse configuration
    #[error("Failed to parse config: {message}")]
    Parse { message: String },

    /// An environment override could not be parsed
    #[error("Invalid value '{value}' for {field}: {message}")]
    InvalidValue {
        field: String,
        value: String,
        message: String,
    },

    /// Validation failed for one or more fields
    #[error("Invalid configuration: {fields}")]
    Invalid { fields: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_errors_share_status_and_body() {
        let missing = RelayError::from(AuthError::MissingToken);
        let invalid = RelayError::from(AuthError::InvalidToken);

        assert_eq!(missing.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(invalid.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(missing.to_string(), invalid.to_string());
        assert_eq!(missing.error_code(), invalid.error_code());
    }

    #[test]
    fn test_payload_status_codes() {
        let err = RelayError::from(PayloadError::InvalidJson {
            message: "expected value".to_string(),
        });
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

        let err = RelayError::from(PayloadError::UnsupportedMediaType {
            content_type: "text/plain".to_string(),
        });
        assert_eq!(err.status_code(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(err.error_code(), "UNSUPPORTED_MEDIA_TYPE");
    }

    #[test]
    fn test_request_status_codes() {
        let err = RelayError::from(RequestError::RateLimited { retry_after_secs: 3 });
        assert_eq!(err.status_code(), StatusCode::TOO_MANY_REQUESTS);

        let err = RelayError::from(RequestError::ConnectionNotFound {
            id: "conn_x".to_string(),
        });
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_error_response_shape() {
        let err = RelayError::Internal("boom".to_string());
        let body = serde_json::to_value(err.to_response()).unwrap();

        assert_eq!(body["ok"], false);
        assert_eq!(body["error"], "INTERNAL_ERROR");
        assert_eq!(body["message"], "Internal error: boom");
    }

    #[test]
    fn test_into_response_status() {
        let response = RelayError::from(AuthError::InvalidToken).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
