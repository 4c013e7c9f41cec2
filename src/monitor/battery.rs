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

// Battery level alerting

use super::{extract_observation, ConsumedRecord, Notifier, TopicMonitor};
use crate::error::PipelineError;
use crate::state::{PersistentStateStore, SourceStatisticsState};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

const CLIENT_ID: &str = "battery_level";

/// Battery severity, ordered from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatteryStatus {
    Normal,
    Low,
    Critical,
}

impl BatteryStatus {
    pub fn from_level(level: f64) -> Self {
        if level < 0.05 {
            BatteryStatus::Critical
        } else if level < 0.2 {
            BatteryStatus::Low
        } else {
            BatteryStatus::Normal
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            BatteryStatus::Normal => "normal",
            BatteryStatus::Low => "low",
            BatteryStatus::Critical => "critical",
        }
    }
}

/// Watches battery topics and notifies on status transitions.
///
/// A worsening transition alerts when the new status is at least the
/// configured severity; a return to NORMAL is announced when the source
/// was previously at exactly that severity. Sources never seen before
/// count as NORMAL. Levels persist across restarts.
pub struct BatteryLevelMonitor {
    topics: Vec<String>,
    minimum: BatteryStatus,
    notifier: Arc<dyn Notifier>,
    store: Arc<PersistentStateStore>,
    group: String,
    state: SourceStatisticsState,
    dirty: bool,
}

impl BatteryLevelMonitor {
    pub async fn new(
        topics: Vec<String>,
        minimum: BatteryStatus,
        notifier: Arc<dyn Notifier>,
        store: Arc<PersistentStateStore>,
        group: impl Into<String>,
    ) -> Result<Self, PipelineError> {
        let group = group.into();
        let state = store
            .retrieve(&group, CLIENT_ID, SourceStatisticsState::default())
            .await?;
        Ok(Self {
            topics,
            minimum,
            notifier,
            store,
            group,
            state,
            dirty: false,
        })
    }
}

#[async_trait]
impl TopicMonitor for BatteryLevelMonitor {
    fn name(&self) -> &str {
        "battery_level"
    }

    fn topics(&self) -> &[String] {
        &self.topics
    }

    async fn observe(&mut self, record: &ConsumedRecord, _now_ms: i64) {
        let Some(observation) = extract_observation(&record.key) else {
            warn!(
                "Dropping record on topic '{}' without a full observation key",
                record.topic
            );
            return;
        };
        let Some(level) = record.value.get("batteryLevel").and_then(Value::as_f64) else {
            debug!(
                "Skipping record on topic '{}' without a battery level",
                record.topic
            );
            return;
        };

        let fingerprint = observation.fingerprint();
        let previous_level = self
            .state
            .battery_levels
            .insert(fingerprint.clone(), level)
            .unwrap_or(1.0);
        self.dirty = true;

        let previous = BatteryStatus::from_level(previous_level);
        let status = BatteryStatus::from_level(level);
        if status > previous && status >= self.minimum {
            self.notifier.notify(
                "Battery level low",
                &format!(
                    "Battery level of source {} went {} ({:.0}%)",
                    fingerprint,
                    status.describe(),
                    level * 100.0
                ),
            );
        } else if status == BatteryStatus::Normal && previous == self.minimum {
            self.notifier.notify(
                "Battery level recovered",
                &format!(
                    "Battery level of source {} returned to normal ({:.0}%)",
                    fingerprint,
                    level * 100.0
                ),
            );
        }
    }

    async fn persist(&mut self) -> Result<(), PipelineError> {
        if !self.dirty {
            return Ok(());
        }
        self.store.store(&self.group, CLIENT_ID, &self.state).await?;
        self.dirty = false;
        Ok(())
    }
}
