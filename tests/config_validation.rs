//! Integration tests for configuration validation

#![allow(clippy::expect_used, clippy::unwrap_used)]

use message_protocol::config::ProtocolConfig;
use message_protocol::CodecKind;

#[test]
fn test_default_config_validates() {
    let config = ProtocolConfig::default();
    let errors = config.validate();
    assert!(
        errors.is_empty(),
        "Default config should be valid, but got errors: {:?}",
        errors
    );
}

#[test]
fn test_empty_server_address() {
    let mut config = ProtocolConfig::default();
    config.server.address = String::new();

    let errors = config.validate();
    assert!(!errors.is_empty());
    assert!(errors.iter().any(|e| e.contains("cannot be empty")));
}

#[test]
fn test_zero_connection_limit() {
    let mut config = ProtocolConfig::default();
    config.server.connection_limit = 0;

    let errors = config.validate();
    assert!(!errors.is_empty());
    assert!(errors
        .iter()
        .any(|e| e.contains("connection limit must be greater than 0")));
}

#[test]
fn test_excessive_connection_limit() {
    let mut config = ProtocolConfig::default();
    config.server.connection_limit = 2_000_000;

    let errors = config.validate();
    assert!(!errors.is_empty());
    assert!(errors.iter().any(|e| e.contains("very high")));
}

#[test]
fn test_zero_channel_count() {
    let mut config = ProtocolConfig::default();
    config.transport.channel_count = 0;

    let errors = config.validate();
    assert!(errors
        .iter()
        .any(|e| e.contains("channel count must be greater than 0")));
}

#[test]
fn test_tiny_max_payload() {
    let mut config = ProtocolConfig::default();
    config.transport.max_payload_size = 16;

    let errors = config.validate();
    assert!(errors.iter().any(|e| e.contains("too small")));
}

#[test]
fn test_oversized_max_payload() {
    let mut config = ProtocolConfig::default();
    config.transport.max_payload_size = 1024 * 1024 * 1024;

    let errors = config.validate();
    assert!(errors.iter().any(|e| e.contains("too large")));
}

#[test]
fn test_validate_strict_aggregates_errors() {
    let config = ProtocolConfig::default_with_overrides(|c| {
        c.server.connection_limit = 0;
        c.client.connection_limit = 0;
    });
    let err = config.validate_strict().unwrap_err();
    let text = err.to_string();
    assert!(text.contains("configuration validation failed"));
}

#[test]
fn test_config_from_toml_with_all_sections() {
    let config = ProtocolConfig::from_toml(
        r#"
        [server]
        address = "127.0.0.1"
        port = 40100
        connection_limit = 32

        [client]
        connection_limit = 2

        [transport]
        codec = "json"
        channel_count = 8
        max_payload_size = 1048576

        [logging]
        app_name = "echo-demo"
        log_level = "debug"
        json_format = true
        "#,
    )
    .expect("parse");

    assert_eq!(config.server.port, 40100);
    assert_eq!(config.transport.codec, CodecKind::Json);
    assert_eq!(config.transport.channel_count, 8);
    assert!(config.logging.json_format);
    assert!(config.validate().is_empty());
}

#[test]
fn test_partial_toml_uses_defaults() {
    let config = ProtocolConfig::from_toml(
        r#"
        [transport]
        codec = "msgpack"
        "#,
    )
    .expect("parse");

    assert_eq!(config.transport.codec, CodecKind::MessagePack);
    assert_eq!(config.server.connection_limit, 4);
    assert_eq!(config.client.connection_limit, 1);
}
