// Configuration system integration tests

use std::fs;
use std::path::PathBuf;
use vitalflow::config::{load_config, load_config_with_env, PipelineConfig};
use vitalflow::monitor::BatteryStatus;

#[test]
fn test_load_default_config() {
    let config_path = PathBuf::from("config/default.yaml");

    if config_path.exists() {
        let result = load_config(&config_path);
        assert!(result.is_ok(), "Failed to load default config: {:?}", result.err());

        let config = result.unwrap();

        // Verify defaults
        assert_eq!(config.sender.batch_size, 1000);
        assert_eq!(config.sender.max_batch_age_ms, 250);
        assert_eq!(config.sender.retries, 3);
        assert_eq!(config.streams.window_ms, 10_000);
        assert_eq!(config.monitors.battery.minimum, BatteryStatus::Low);
        assert_eq!(config.monitors.disconnect.timeout_seconds, 300);
        assert_eq!(config.simulation.devices, 2);
        assert_eq!(config.logging.level, "info");
    }
}

#[test]
fn test_config_with_env_vars() {
    let temp_config = r#"
gateway:
  url: ${VITALFLOW_TEST_GATEWAY:-http://fallback:8090}
  timeout_seconds: 10

schema:
  local_dir: ${VITALFLOW_TEST_SCHEMAS:-schemas}

sender:
  batch_size: 100
  max_batch_age_ms: 50

logging:
  level: debug
  format: text
"#;

    let temp_path = PathBuf::from("/tmp/vitalflow_test_config.yaml");
    fs::write(&temp_path, temp_config).expect("Failed to write temp config");

    std::env::set_var("VITALFLOW_TEST_GATEWAY", "http://gateway:9090");

    let result = load_config(&temp_path);
    assert!(result.is_ok(), "Failed to load config with env vars: {:?}", result.err());

    let config = result.unwrap();
    assert_eq!(config.gateway.url, "http://gateway:9090");
    assert_eq!(config.schema.local_dir, "schemas"); // Uses default
    assert_eq!(config.sender.batch_size, 100);
    assert_eq!(config.logging.level, "debug");

    // Cleanup
    fs::remove_file(temp_path).ok();
    std::env::remove_var("VITALFLOW_TEST_GATEWAY");
}

#[test]
fn test_env_overrides_take_precedence() {
    let temp_config = r#"
gateway:
  url: http://file:8090
"#;
    let temp_path = PathBuf::from("/tmp/vitalflow_test_override.yaml");
    fs::write(&temp_path, temp_config).expect("Failed to write temp config");

    std::env::set_var("REGISTRY_URL", "http://registry:8081");
    let config = load_config_with_env(&temp_path).expect("Failed to load config");
    std::env::remove_var("REGISTRY_URL");

    assert_eq!(config.schema.registry_url.as_deref(), Some("http://registry:8081"));

    // Cleanup
    fs::remove_file(temp_path).ok();
}

#[test]
fn test_config_validation() {
    let invalid_config = r#"
gateway:
  url: http://localhost:8090

sender:
  batch_size: 0  # INVALID: must be > 0
"#;

    let temp_path = PathBuf::from("/tmp/vitalflow_invalid_config.yaml");
    fs::write(&temp_path, invalid_config).expect("Failed to write temp config");

    let result = load_config(&temp_path);
    assert!(result.is_err(), "Expected validation error for invalid config");
    assert!(format!("{:#}", result.unwrap_err()).contains("batch_size"));

    // Cleanup
    fs::remove_file(temp_path).ok();
}

#[test]
fn test_missing_config_file() {
    let result = load_config("/tmp/vitalflow_no_such_file.yaml");
    assert!(result.is_err());
}

#[test]
fn test_config_defaults() {
    let config = PipelineConfig::default();

    assert_eq!(config.gateway.url, "http://localhost:8090");
    assert_eq!(config.gateway.timeout_seconds, 30);
    assert_eq!(config.schema.local_dir, "schemas");
    assert!(config.schema.registry_url.is_none());
    assert_eq!(config.sender.batch_size, 1000);
    assert_eq!(config.sender.queue_capacity, 100);
    assert_eq!(config.sender.heartbeat_timeout_ms, 60_000);
    assert_eq!(config.monitors.group, "vitalflow");
    assert_eq!(config.monitors.disconnect.repetitions, 2);
    assert_eq!(config.logging.level, "info");
}
