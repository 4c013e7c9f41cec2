// Configuration module for vitalflow
//
// Provides:
// - YAML configuration file loading
// - Environment variable substitution
// - Configuration validation
// - Default values

pub mod types;
mod loader;

pub use types::*;
pub use loader::ConfigLoader;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a YAML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<PipelineConfig> {
    ConfigLoader::load(path).context("Failed to load configuration")
}

/// Load configuration with environment variable overrides
pub fn load_config_with_env<P: AsRef<Path>>(path: P) -> Result<PipelineConfig> {
    let mut config = load_config(path)?;

    // Allow environment variables to override config values
    if let Ok(gateway_url) = std::env::var("GATEWAY_URL") {
        config.gateway.url = gateway_url;
    }

    if let Ok(registry_url) = std::env::var("REGISTRY_URL") {
        config.schema.registry_url = Some(registry_url);
    }

    if let Ok(schema_dir) = std::env::var("SCHEMA_DIR") {
        config.schema.local_dir = schema_dir;
    }

    if let Ok(state_dir) = std::env::var("STATE_DIR") {
        config.monitors.state_dir = state_dir;
    }

    Ok(config)
}
