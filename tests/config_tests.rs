//! Integration tests for configuration loading

use relay::config::ServerConfig;
use relay::core::{ConfigError, RelayError};
use std::io::Write;
use tempfile::NamedTempFile;

fn write_config(yaml: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_full_file() {
    let file = write_config(
        r#"
host: 127.0.0.1
port: 4000
auth_token: "s3cret"
compression:
  enabled: true
  threshold: 512
  level: 6
queue_capacity: 32
heartbeat_interval_secs: 10
rate_limit:
  enabled: false
  max_connections: 5
  window_secs: 30
log_filter: "relay=debug"
"#,
    );

    let config = ServerConfig::from_yaml_file(file.path().to_str().unwrap()).unwrap();

    assert_eq!(config.socket_addr(), "127.0.0.1:4000");
    assert_eq!(config.auth_token, "s3cret");
    assert!(config.compression.enabled);
    assert_eq!(config.compression.threshold, 512);
    assert_eq!(config.compression.level, 6);
    assert_eq!(config.queue_capacity, 32);
    assert_eq!(config.heartbeat_interval().as_secs(), 10);
    assert!(!config.rate_limit.enabled);
    assert_eq!(config.rate_limit.window().as_secs(), 30);
    assert_eq!(config.log_filter, "relay=debug");
    assert!(config.validate_config().is_ok());
}

#[test]
fn test_partial_file_takes_defaults() {
    let file = write_config("auth_token: \"123\"\n");

    let config = ServerConfig::from_yaml_file(file.path().to_str().unwrap()).unwrap();
    assert_eq!(config, ServerConfig::with_token("123"));
}

#[test]
fn test_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.yaml");

    let err = ServerConfig::from_yaml_file(path.to_str().unwrap()).unwrap_err();
    assert!(matches!(
        err,
        RelayError::Config(ConfigError::FileNotFound { .. })
    ));
}

#[test]
fn test_malformed_file() {
    let file = write_config("port: [not, a, port]\n");

    let err = ServerConfig::from_yaml_file(file.path().to_str().unwrap()).unwrap_err();
    assert!(matches!(err, RelayError::Config(ConfigError::Parse { .. })));
}

#[test]
fn test_env_overrides_file_values() {
    let file = write_config("auth_token: from-file\nport: 4000\n");
    let mut config = ServerConfig::from_yaml_file(file.path().to_str().unwrap()).unwrap();

    config
        .apply_env_overrides_from(|key| match key {
            "RELAY_AUTH_TOKEN" => Some("from-env".to_string()),
            "RELAY_HEARTBEAT_SECS" => Some("5".to_string()),
            _ => None,
        })
        .unwrap();

    assert_eq!(config.auth_token, "from-env");
    assert_eq!(config.port, 4000);
    assert_eq!(config.heartbeat_interval_secs, 5);
}

#[test]
fn test_invalid_values_fail_validation() {
    let file = write_config(
        r#"
auth_token: ""
queue_capacity: 0
"#,
    );
    let config = ServerConfig::from_yaml_file(file.path().to_str().unwrap()).unwrap();

    match config.validate_config() {
        Err(RelayError::Config(ConfigError::Invalid { fields })) => {
            assert!(fields.contains("auth_token"));
            assert!(fields.contains("queue_capacity"));
        }
        other => panic!("expected validation failure, got {:?}", other),
    }
}

#[test]
fn test_misspelled_key_rejected() {
    let file = write_config("auth_token: \"123\"\nheartbeat_interval: 5\n");

    let err = ServerConfig::from_yaml_file(file.path().to_str().unwrap()).unwrap_err();
    match err {
        RelayError::Config(ConfigError::Parse { ref message, .. }) => {
            assert!(message.contains("heartbeat_interval"));
        }
        other => panic!("expected parse failure, got {:?}", other),
    }
}

#[test]
fn test_auth_token_camel_case_alias() {
    let file = write_config("authToken: \"s3cret\"\n");

    let config = ServerConfig::from_yaml_file(file.path().to_str().unwrap()).unwrap();
    assert_eq!(config.auth_token, "s3cret");
}
