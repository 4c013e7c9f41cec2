// Copyright 2025 vitalflow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Configuration types for vitalflow

use crate::monitor::{BatteryStatus, DisconnectSettings};
use crate::sender::SenderSettings;
use crate::source::SimulationTopics;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub schema: SchemaConfig,
    #[serde(default)]
    pub sender: SenderConfig,
    #[serde(default)]
    pub streams: StreamConfig,
    #[serde(default)]
    pub monitors: MonitorConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            schema: SchemaConfig::default(),
            sender: SenderConfig::default(),
            streams: StreamConfig::default(),
            monitors: MonitorConfig::default(),
            simulation: SimulationConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// REST gateway endpoint
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_url")]
    pub url: String,

    #[serde(default = "default_gateway_timeout")]
    pub timeout_seconds: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: default_gateway_url(),
            timeout_seconds: default_gateway_timeout(),
        }
    }
}

/// Schema resolution: a set registry URL selects the registry resolver,
/// otherwise schemas come from the local bundle directory.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchemaConfig {
    #[serde(default)]
    pub registry_url: Option<String>,

    #[serde(default = "default_schema_dir")]
    pub local_dir: String,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            registry_url: None,
            local_dir: default_schema_dir(),
        }
    }
}

/// Batching and sender worker tunables
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SenderConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_max_batch_age_ms")]
    pub max_batch_age_ms: u64,

    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    #[serde(default = "default_retries")]
    pub retries: u32,

    #[serde(default = "default_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,

    #[serde(default = "default_heartbeat_margin_ms")]
    pub heartbeat_margin_ms: u64,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_batch_age_ms: default_max_batch_age_ms(),
            queue_capacity: default_queue_capacity(),
            retries: default_retries(),
            heartbeat_timeout_ms: default_heartbeat_timeout_ms(),
            heartbeat_margin_ms: default_heartbeat_margin_ms(),
        }
    }
}

impl SenderConfig {
    pub fn settings(&self) -> SenderSettings {
        SenderSettings {
            queue_capacity: self.queue_capacity,
            retries: self.retries,
            heartbeat_timeout: Duration::from_millis(self.heartbeat_timeout_ms),
            heartbeat_margin: Duration::from_millis(self.heartbeat_margin_ms),
        }
    }

    pub fn max_age(&self) -> Duration {
        Duration::from_millis(self.max_batch_age_ms)
    }
}

/// Window aggregation settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StreamConfig {
    #[serde(default = "default_window_ms")]
    pub window_ms: i64,

    #[serde(default = "default_commit_interval_ms")]
    pub commit_interval_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            window_ms: default_window_ms(),
            commit_interval_ms: default_commit_interval_ms(),
        }
    }
}

impl StreamConfig {
    pub fn commit_interval(&self) -> Duration {
        Duration::from_millis(self.commit_interval_ms)
    }
}

/// Monitor wiring and policies
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MonitorConfig {
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,

    #[serde(default = "default_state_dir")]
    pub state_dir: String,

    #[serde(default = "default_monitor_group")]
    pub group: String,

    #[serde(default)]
    pub battery: BatteryMonitorConfig,

    #[serde(default)]
    pub disconnect: DisconnectMonitorConfig,

    #[serde(default)]
    pub source_statistics: SourceStatisticsConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_timeout_ms: default_poll_timeout_ms(),
            state_dir: default_state_dir(),
            group: default_monitor_group(),
            battery: BatteryMonitorConfig::default(),
            disconnect: DisconnectMonitorConfig::default(),
            source_statistics: SourceStatisticsConfig::default(),
        }
    }
}

impl MonitorConfig {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BatteryMonitorConfig {
    #[serde(default = "default_battery_topics")]
    pub topics: Vec<String>,

    /// Least severe status that triggers alerts: "LOW" or "CRITICAL"
    #[serde(default = "default_battery_minimum")]
    pub minimum: BatteryStatus,
}

impl Default for BatteryMonitorConfig {
    fn default() -> Self {
        Self {
            topics: default_battery_topics(),
            minimum: default_battery_minimum(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DisconnectMonitorConfig {
    /// Topics counted as liveness evidence; empty means all topics
    #[serde(default)]
    pub topics: Vec<String>,

    #[serde(default = "default_disconnect_timeout")]
    pub timeout_seconds: u64,

    #[serde(default = "default_alert_repeat_interval")]
    pub alert_repeat_interval_seconds: u64,

    #[serde(default = "default_alert_repetitions")]
    pub repetitions: u32,
}

impl Default for DisconnectMonitorConfig {
    fn default() -> Self {
        Self {
            topics: Vec::new(),
            timeout_seconds: default_disconnect_timeout(),
            alert_repeat_interval_seconds: default_alert_repeat_interval(),
            repetitions: default_alert_repetitions(),
        }
    }
}

impl DisconnectMonitorConfig {
    pub fn settings(&self) -> DisconnectSettings {
        DisconnectSettings {
            timeout: Duration::from_secs(self.timeout_seconds),
            alert_repeat_interval: Duration::from_secs(self.alert_repeat_interval_seconds),
            repetitions: self.repetitions,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceStatisticsConfig {
    #[serde(default = "default_statistics_topics")]
    pub topics: Vec<String>,

    #[serde(default = "default_statistics_output")]
    pub output_topic: String,
}

impl Default for SourceStatisticsConfig {
    fn default() -> Self {
        Self {
            topics: default_statistics_topics(),
            output_topic: default_statistics_output(),
        }
    }
}

/// Simulated device fleet used when no real producer is attached
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SimulationConfig {
    #[serde(default = "default_devices")]
    pub devices: u32,

    #[serde(default = "default_period_ms")]
    pub period_ms: u64,

    #[serde(default = "default_battery_topic")]
    pub battery_topic: String,

    #[serde(default = "default_temperature_topic")]
    pub temperature_topic: String,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            devices: default_devices(),
            period_ms: default_period_ms(),
            battery_topic: default_battery_topic(),
            temperature_topic: default_temperature_topic(),
        }
    }
}

impl SimulationConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }

    pub fn topics(&self) -> SimulationTopics {
        SimulationTopics {
            battery: self.battery_topic.clone(),
            temperature: self.temperature_topic.clone(),
            temperature_output: format!("{}_output", self.temperature_topic),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"

    #[serde(default = "default_log_format")]
    pub format: String, // "text" or "json"
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// Default value functions
fn default_gateway_url() -> String {
    "http://localhost:8090".to_string()
}

fn default_gateway_timeout() -> u64 {
    30
}

fn default_schema_dir() -> String {
    "schemas".to_string()
}

fn default_batch_size() -> usize {
    1000
}

fn default_max_batch_age_ms() -> u64 {
    250
}

fn default_queue_capacity() -> usize {
    100
}

fn default_retries() -> u32 {
    3
}

fn default_heartbeat_timeout_ms() -> u64 {
    60_000
}

fn default_heartbeat_margin_ms() -> u64 {
    10_000
}

fn default_window_ms() -> i64 {
    10_000
}

fn default_commit_interval_ms() -> u64 {
    1000
}

fn default_poll_timeout_ms() -> u64 {
    1000
}

fn default_state_dir() -> String {
    "state".to_string()
}

fn default_monitor_group() -> String {
    "vitalflow".to_string()
}

fn default_battery_topics() -> Vec<String> {
    vec!["android_empatica_e4_battery_level".to_string()]
}

fn default_battery_minimum() -> BatteryStatus {
    BatteryStatus::Low
}

fn default_disconnect_timeout() -> u64 {
    300
}

fn default_alert_repeat_interval() -> u64 {
    3600
}

fn default_alert_repetitions() -> u32 {
    2
}

fn default_statistics_topics() -> Vec<String> {
    vec!["android_empatica_e4_temperature_output".to_string()]
}

fn default_statistics_output() -> String {
    "source_statistics".to_string()
}

fn default_devices() -> u32 {
    2
}

fn default_period_ms() -> u64 {
    1000
}

fn default_battery_topic() -> String {
    "android_empatica_e4_battery_level".to_string()
}

fn default_temperature_topic() -> String {
    "android_empatica_e4_temperature".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}
