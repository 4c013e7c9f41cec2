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

// Source silence detection

use super::{extract_observation, ConsumedRecord, Notifier, TopicMonitor};
use crate::error::PipelineError;
use crate::state::{MissingReport, PersistentStateStore, SourceStatisticsState};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

const CLIENT_ID: &str = "disconnect";

#[derive(Debug, Clone)]
pub struct DisconnectSettings {
    /// Silence before the first alert.
    pub timeout: Duration,
    /// Pause between repeated alerts for a source that stays silent.
    pub alert_repeat_interval: Duration,
    /// Extra alerts after the first one.
    pub repetitions: u32,
}

impl Default for DisconnectSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            alert_repeat_interval: Duration::from_secs(3600),
            repetitions: 2,
        }
    }
}

/// Treats every record as liveness evidence and alerts on silent
/// sources: a first alert once the silence exceeds the timeout, repeats
/// on the configured interval up to the repetition cap, and a recovery
/// notice when a reported source sends again.
pub struct DisconnectMonitor {
    topics: Vec<String>,
    settings: DisconnectSettings,
    notifier: Arc<dyn Notifier>,
    store: Arc<PersistentStateStore>,
    group: String,
    state: SourceStatisticsState,
    dirty: bool,
}

impl DisconnectMonitor {
    pub async fn new(
        topics: Vec<String>,
        settings: DisconnectSettings,
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
            settings,
            notifier,
            store,
            group,
            state,
            dirty: false,
        })
    }

    pub fn reported_missing(&self) -> usize {
        self.state.reported_missing.len()
    }
}

#[async_trait]
impl TopicMonitor for DisconnectMonitor {
    fn name(&self) -> &str {
        "disconnect"
    }

    fn topics(&self) -> &[String] {
        &self.topics
    }

    async fn observe(&mut self, record: &ConsumedRecord, now_ms: i64) {
        let Some(observation) = extract_observation(&record.key) else {
            warn!(
                "Dropping record on topic '{}' without a full observation key",
                record.topic
            );
            return;
        };
        let fingerprint = observation.fingerprint();
        if let Some(report) = self.state.reported_missing.remove(&fingerprint) {
            self.notifier.notify(
                "Source recovered",
                &format!(
                    "Source {} is sending again after {} s of silence",
                    fingerprint,
                    (now_ms - report.last_seen) / 1000
                ),
            );
        }
        self.state.last_seen.insert(fingerprint, now_ms);
        self.dirty = true;
    }

    async fn sweep(&mut self, now_ms: i64) {
        let timeout_ms = self.settings.timeout.as_millis() as i64;
        let newly_missing: Vec<(String, i64)> = self
            .state
            .last_seen
            .iter()
            .filter(|(_, seen)| now_ms - **seen > timeout_ms)
            .map(|(fingerprint, seen)| (fingerprint.clone(), *seen))
            .collect();
        for (fingerprint, seen) in newly_missing {
            self.state.last_seen.remove(&fingerprint);
            self.notifier.notify(
                "Source missing",
                &format!(
                    "Source {} has not sent data for {} s",
                    fingerprint,
                    (now_ms - seen) / 1000
                ),
            );
            self.state.reported_missing.insert(
                fingerprint,
                MissingReport {
                    last_seen: seen,
                    reported_at: now_ms,
                    alert_count: 1,
                },
            );
            self.dirty = true;
        }

        let repeat_ms = self.settings.alert_repeat_interval.as_millis() as i64;
        let max_alerts = 1 + self.settings.repetitions;
        for (fingerprint, report) in self.state.reported_missing.iter_mut() {
            if report.alert_count < max_alerts && now_ms - report.reported_at >= repeat_ms {
                self.notifier.notify(
                    "Source still missing",
                    &format!(
                        "Source {} has not sent data for {} s",
                        fingerprint,
                        (now_ms - report.last_seen) / 1000
                    ),
                );
                report.reported_at = now_ms;
                report.alert_count += 1;
                self.dirty = true;
            }
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
