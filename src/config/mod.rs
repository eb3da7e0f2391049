//! Configuration loading and management
//!
//! Configuration comes from an optional YAML file, then `RELAY_*` environment
//! variables override individual keys, then the result is validated. Unknown
//! keys in the file are rejected; `authToken` is accepted for `auth_token`.
//!
//! ```yaml
//! host: 0.0.0.0
//! port: 3131
//! auth_token: "123"
//! compression:
//!   enabled: true
//!   threshold: 1024
//!   level: 3
//! queue_capacity: 256
//! heartbeat_interval_secs: 30
//! rate_limit:
//!   enabled: true
//!   max_connections: 100
//!   window_secs: 60
//! ```

use crate::core::error::{ConfigError, RelayError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use validator::Validate;

/// Compression settings for the HTTP surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct CompressionConfig {
    /// Compress HTTP responses
    pub enabled: bool,

    /// Minimum body size in bytes before compressing
    pub threshold: u16,

    /// gzip level (0 = fastest, 9 = smallest)
    #[validate(range(min = 0, max = 9))]
    pub level: i32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold: 1024,
            level: 3,
        }
    }
}

/// Per-IP WebSocket connect rate limiting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct RateLimitConfig {
    pub enabled: bool,

    /// Connects allowed per window
    #[validate(range(min = 1))]
    pub max_connections: u32,

    /// Window length in seconds
    #[validate(range(min = 1))]
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_connections: 100,
            window_secs: 60,
        }
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// Complete server configuration
#[derive(Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Listen address
    pub host: String,

    /// Listen port (0 picks an ephemeral port)
    pub port: u16,

    /// Static shared secret expected in the `Authorization` header
    #[serde(alias = "authToken")]
    #[validate(length(min = 1))]
    pub auth_token: String,

    #[validate(nested)]
    pub compression: CompressionConfig,

    /// Bounded per-connection send queue, in frames
    #[validate(range(min = 1))]
    pub queue_capacity: usize,

    /// Interval between WebSocket Ping frames
    #[validate(range(min = 1))]
    pub heartbeat_interval_secs: u64,

    #[validate(nested)]
    pub rate_limit: RateLimitConfig,

    /// Tracing filter used when `RUST_LOG` is not set
    pub log_filter: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3131,
            auth_token: String::new(),
            compression: CompressionConfig::default(),
            queue_capacity: 256,
            heartbeat_interval_secs: 30,
            rate_limit: RateLimitConfig::default(),
            log_filter: "relay=info,tower_http=info".to_string(),
        }
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("auth_token", &"<redacted>")
            .field("compression", &self.compression)
            .field("queue_capacity", &self.queue_capacity)
            .field("heartbeat_interval_secs", &self.heartbeat_interval_secs)
            .field("rate_limit", &self.rate_limit)
            .field("log_filter", &self.log_filter)
            .finish()
    }
}

impl ServerConfig {
    /// Create a default configuration with the given token
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            auth_token: token.into(),
            ..Self::default()
        }
    }

    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: &str) -> Result<Self, RelayError> {
        let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ConfigError::FileNotFound {
                path: path.to_string(),
            },
            _ => ConfigError::Io {
                path: path.to_string(),
                message: e.to_string(),
            },
        })?;
        Self::from_yaml_str(&content)
    }

    /// Load configuration from a YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self, RelayError> {
        let config: Self = serde_yaml::from_str(yaml).map_err(|e| ConfigError::Parse {
            message: e.to_string(),
        })?;
        Ok(config)
    }

    /// Apply `RELAY_*` overrides from the process environment
    pub fn apply_env_overrides(&mut self) -> Result<(), RelayError> {
        self.apply_env_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply `RELAY_*` overrides from an arbitrary lookup
    pub fn apply_env_overrides_from<F>(&mut self, lookup: F) -> Result<(), RelayError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("RELAY_HOST") {
            self.host = v;
        }
        if let Some(v) = lookup("RELAY_PORT") {
            self.port = parse_env("RELAY_PORT", &v)?;
        }
        if let Some(v) = lookup("RELAY_AUTH_TOKEN") {
            self.auth_token = v;
        }
        if let Some(v) = lookup("RELAY_QUEUE_CAPACITY") {
            self.queue_capacity = parse_env("RELAY_QUEUE_CAPACITY", &v)?;
        }
        if let Some(v) = lookup("RELAY_HEARTBEAT_SECS") {
            self.heartbeat_interval_secs = parse_env("RELAY_HEARTBEAT_SECS", &v)?;
        }
        if let Some(v) = lookup("RELAY_COMPRESSION") {
            self.compression.enabled = parse_bool("RELAY_COMPRESSION", &v)?;
        }
        if let Some(v) = lookup("RELAY_RATE_LIMIT_COUNT") {
            self.rate_limit.max_connections = parse_env("RELAY_RATE_LIMIT_COUNT", &v)?;
        }
        if let Some(v) = lookup("RELAY_RATE_LIMIT_SECONDS") {
            self.rate_limit.window_secs = parse_env("RELAY_RATE_LIMIT_SECONDS", &v)?;
        }
        Ok(())
    }

    /// Validate all fields, naming the offending ones
    pub fn validate_config(&self) -> Result<(), RelayError> {
        self.validate().map_err(|errors| {
            let mut fields: Vec<String> = errors.errors().keys().map(|k| k.to_string()).collect();
            fields.sort();
            ConfigError::Invalid {
                fields: fields.join(", "),
            }
        })?;
        Ok(())
    }

    /// `host:port` to bind
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }
}

fn parse_env<T>(field: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value.trim().parse::<T>().map_err(|e| ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        message: e.to_string(),
    })
}

fn parse_bool(field: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
            message: "expected a boolean".to_string(),
        }),
    }
}
