// Configuration loader with environment variable substitution

use super::types::*;
use anyhow::{bail, Context, Result};
use regex::Regex;
use std::path::Path;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from file with environment variable substitution
    pub fn load<P: AsRef<Path>>(path: P) -> Result<PipelineConfig> {
        let content = std::fs::read_to_string(path.as_ref())
            .context("Failed to read config file")?;

        // Substitute environment variables
        let content = Self::substitute_env_vars(&content);

        // Parse YAML
        let config: PipelineConfig = serde_yaml::from_str(&content)
            .context("Failed to parse YAML configuration")?;

        // Validate configuration
        Self::validate(&config)?;

        Ok(config)
    }

    /// Substitute ${VAR} and ${VAR:-default} patterns with environment variables
    ///
    /// Examples:
    /// - ${HOME} -> /home/user
    /// - ${GATEWAY_URL:-http://localhost:8090} -> http://localhost:8090 (if GATEWAY_URL not set)
    fn substitute_env_vars(content: &str) -> String {
        let re = Regex::new(r"\$\{([^}:]+)(?::-([^}]+))?\}").unwrap();

        re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default_value = caps.get(2).map(|m| m.as_str());

            match std::env::var(var_name) {
                Ok(value) => value,
                Err(_) => {
                    if let Some(default) = default_value {
                        default.to_string()
                    } else {
                        // Keep original if no default and var not found
                        format!("${{{}}}", var_name)
                    }
                }
            }
        }).to_string()
    }

    /// Validate configuration
    fn validate(config: &PipelineConfig) -> Result<()> {
        // Validate gateway endpoint
        if config.gateway.url.is_empty() {
            bail!("gateway.url cannot be empty");
        }

        if config.gateway.timeout_seconds == 0 {
            bail!("gateway.timeout_seconds must be > 0");
        }

        // Validate schema resolution
        match &config.schema.registry_url {
            Some(url) if url.is_empty() => {
                bail!("schema.registry_url cannot be empty when set");
            }
            None if config.schema.local_dir.is_empty() => {
                bail!("schema.local_dir cannot be empty without a registry URL");
            }
            _ => {}
        }

        // Validate sender tunables
        if config.sender.batch_size == 0 {
            bail!("sender.batch_size must be > 0");
        }

        if config.sender.max_batch_age_ms == 0 {
            bail!("sender.max_batch_age_ms must be > 0");
        }

        if config.sender.queue_capacity == 0 {
            bail!("sender.queue_capacity must be > 0");
        }

        if config.sender.retries == 0 {
            bail!("sender.retries must be > 0");
        }

        if config.sender.heartbeat_timeout_ms == 0 {
            bail!("sender.heartbeat_timeout_ms must be > 0");
        }

        // Validate window settings
        if config.streams.window_ms <= 0 {
            bail!("streams.window_ms must be > 0");
        }

        if config.streams.commit_interval_ms == 0 {
            bail!("streams.commit_interval_ms must be > 0");
        }

        // Validate monitor wiring
        if config.monitors.poll_timeout_ms == 0 {
            bail!("monitors.poll_timeout_ms must be > 0");
        }

        if config.monitors.state_dir.is_empty() {
            bail!("monitors.state_dir cannot be empty");
        }

        if config.monitors.group.is_empty() {
            bail!("monitors.group cannot be empty");
        }

        if config.monitors.source_statistics.output_topic.is_empty() {
            bail!("monitors.source_statistics.output_topic cannot be empty");
        }

        // Validate simulation settings
        if config.simulation.devices == 0 {
            bail!("simulation.devices must be > 0");
        }

        if config.simulation.period_ms == 0 {
            bail!("simulation.period_ms must be > 0");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_var_substitution() {
        // Set test environment variable
        std::env::set_var("VITALFLOW_TEST_VAR", "test_value");

        let input = "url: ${VITALFLOW_TEST_VAR}";
        let output = ConfigLoader::substitute_env_vars(input);
        assert_eq!(output, "url: test_value");

        std::env::remove_var("VITALFLOW_TEST_VAR");
    }

    #[test]
    fn test_env_var_with_default() {
        // Don't set VITALFLOW_TEST_VAR2
        std::env::remove_var("VITALFLOW_TEST_VAR2");

        let input = "url: ${VITALFLOW_TEST_VAR2:-http://localhost:8090}";
        let output = ConfigLoader::substitute_env_vars(input);
        assert_eq!(output, "url: http://localhost:8090");
    }

    #[test]
    fn test_env_var_without_default_kept() {
        std::env::remove_var("VITALFLOW_TEST_VAR3");

        let input = "url: ${VITALFLOW_TEST_VAR3}";
        let output = ConfigLoader::substitute_env_vars(input);
        assert_eq!(output, "url: ${VITALFLOW_TEST_VAR3}");
    }

    #[test]
    fn test_validation_invalid_batch_size() {
        let mut config = PipelineConfig::default();
        config.sender.batch_size = 0;

        let result = ConfigLoader::validate(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("batch_size"));
    }

    #[test]
    fn test_validation_invalid_window() {
        let mut config = PipelineConfig::default();
        config.streams.window_ms = 0;

        let result = ConfigLoader::validate(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("window_ms"));
    }

    #[test]
    fn test_validation_empty_gateway_url() {
        let mut config = PipelineConfig::default();
        config.gateway.url = String::new();

        let result = ConfigLoader::validate(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("gateway.url"));
    }

    #[test]
    fn test_validation_empty_registry_url() {
        let mut config = PipelineConfig::default();
        config.schema.registry_url = Some(String::new());

        let result = ConfigLoader::validate(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("registry_url"));
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = PipelineConfig::default();
        assert!(ConfigLoader::validate(&config).is_ok());
    }
}
