//! Message envelopes and channel identifiers
//!
//! An envelope is built once per webhook call, serialized once, and the same
//! bytes are handed to every subscriber of the target channels.
//!
//! # Wire format
//!
//! ```json
//! {
//!   "id": "1344fsdfsdfds3234",
//!   "type": "translation",
//!   "data": {"message": "testing"},
//!   "receivedAt": "2025-01-01T12:00:00Z"
//! }
//! ```

use crate::core::error::{PayloadError, RelayError};
use axum::extract::ws::Utf8Bytes;
use chrono::{DateTime, Utc};
use indexmap::IndexSet;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::OnceLock;
use uuid::Uuid;

/// A channel identifier (routing key)
pub type ChannelId = String;

/// A serialized envelope, cheap to clone across fan-out targets
pub type Payload = Utf8Bytes;

/// Default `type` for payloads that don't carry one
pub const DEFAULT_MESSAGE_TYPE: &str = "message";

/// Maximum length of a single channel identifier
pub const MAX_CHANNEL_LEN: usize = 128;

/// The structured message unit delivered to subscribers
///
/// Immutable once constructed. `id` is client-supplied when present and is
/// treated as opaque (no deduplication).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEnvelope {
    /// Message ID (client-supplied or generated)
    pub id: String,
    /// Message type, e.g. "translation"
    #[serde(rename = "type")]
    pub kind: String,
    /// Arbitrary JSON payload
    pub data: Value,
    /// When the webhook was accepted
    pub received_at: DateTime<Utc>,
}

impl MessageEnvelope {
    /// Create an envelope with a generated ID
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            id: generate_message_id(),
            kind: kind.into(),
            data,
            received_at: Utc::now(),
        }
    }

    /// Parse a raw webhook body into an envelope
    pub fn from_slice(body: &[u8]) -> Result<Self, PayloadError> {
        let value: Value = serde_json::from_slice(body).map_err(|e| PayloadError::InvalidJson {
            message: e.to_string(),
        })?;
        Self::from_payload(value)
    }

    /// Build an envelope from a decoded webhook body
    ///
    /// An object with a `data` key and no keys besides `id`, `type` and `data`
    /// is a pre-formed envelope (`id` and `type` optional). Any other object is
    /// forwarded whole as `data`, so no top-level key is ever dropped.
    pub fn from_payload(body: Value) -> Result<Self, PayloadError> {
        let mut object = match body {
            Value::Object(object) => object,
            other => {
                return Err(PayloadError::NotAnObject {
                    found: json_kind(&other),
                });
            }
        };

        if !is_preformed(&object) {
            return Ok(Self::new(DEFAULT_MESSAGE_TYPE, Value::Object(object)));
        }

        let id = take_string_field(&mut object, "id")?.unwrap_or_else(generate_message_id);
        let kind = take_string_field(&mut object, "type")?
            .unwrap_or_else(|| DEFAULT_MESSAGE_TYPE.to_string());
        let data = object.remove("data").unwrap_or(Value::Null);

        Ok(Self {
            id,
            kind,
            data,
            received_at: Utc::now(),
        })
    }

    /// Serialize the envelope once for fan-out
    pub fn to_payload(&self) -> Result<Payload, RelayError> {
        serde_json::to_string(self)
            .map(Payload::from)
            .map_err(|e| RelayError::Internal(format!("failed to serialize envelope: {}", e)))
    }
}

/// Keys a pre-formed envelope may carry
const ENVELOPE_KEYS: [&str; 3] = ["id", "type", "data"];

fn is_preformed(object: &Map<String, Value>) -> bool {
    object.contains_key("data") && object.keys().all(|k| ENVELOPE_KEYS.contains(&k.as_str()))
}

fn take_string_field(
    object: &mut Map<String, Value>,
    field: &str,
) -> Result<Option<String>, PayloadError> {
    match object.remove(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(other) => Err(PayloadError::InvalidField {
            field: field.to_string(),
            message: format!("expected a string, got {}", json_kind(&other)),
        }),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn generate_message_id() -> String {
    format!("msg_{}", Uuid::new_v4().simple())
}

/// Check a single channel identifier
pub fn is_valid_channel_id(channel: &str) -> bool {
    static CHANNEL_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = CHANNEL_REGEX.get_or_init(|| Regex::new(r"^[A-Za-z0-9_.:\-]+$").unwrap());
    !channel.is_empty() && channel.len() <= MAX_CHANNEL_LEN && regex.is_match(channel)
}

/// Parse a comma-separated channel list, keeping first-seen order
///
/// Blank entries are skipped, duplicates collapse. An empty result is legal
/// here (a WebSocket connection may subscribe to nothing).
pub fn parse_channels(raw: &str) -> Result<IndexSet<ChannelId>, PayloadError> {
    let mut channels = IndexSet::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        if !is_valid_channel_id(part) {
            return Err(PayloadError::InvalidChannel {
                channel: part.to_string(),
            });
        }
        channels.insert(part.to_string());
    }
    Ok(channels)
}

/// Parse the target channels of a webhook path segment (at least one required)
pub fn parse_target_channels(raw: &str) -> Result<IndexSet<ChannelId>, PayloadError> {
    let channels = parse_channels(raw)?;
    if channels.is_empty() {
        return Err(PayloadError::EmptyChannelList);
    }
    Ok(channels)
}
