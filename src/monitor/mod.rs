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

// Monitor module
//
// Monitors observe the record stream and raise alerts or derived
// records: battery level transitions, source silence, and per-source
// observation spans. A MonitorHub drives them from a record channel,
// sweeping for time-based alerts and persisting state periodically.

pub mod battery;
pub mod disconnect;
pub mod source_statistics;

pub use battery::{BatteryLevelMonitor, BatteryStatus};
pub use disconnect::{DisconnectMonitor, DisconnectSettings};
pub use source_statistics::SourceStatisticsMonitor;

use crate::error::PipelineError;
use crate::keys::ObservationKey;
use crate::util::epoch_ms;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Alert delivery seam. The crate ships a logging implementation;
/// deployments plug in their own transport.
pub trait Notifier: Send + Sync {
    fn notify(&self, subject: &str, body: &str);
}

/// Default notifier: alerts land in the log at warn level.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, subject: &str, body: &str) {
        warn!("[{}] {}", subject, body);
    }
}

/// One record as seen by the monitors, before wire encoding.
#[derive(Debug, Clone)]
pub struct ConsumedRecord {
    pub topic: String,
    pub key: Value,
    pub value: Value,
}

impl ConsumedRecord {
    pub fn new(topic: impl Into<String>, key: Value, value: Value) -> Self {
        Self {
            topic: topic.into(),
            key,
            value,
        }
    }
}

/// A record observer with periodic duties. `observe` is called for each
/// record on an accepted topic, `sweep` once per poll round for
/// time-based work, and `persist` on the commit interval.
#[async_trait]
pub trait TopicMonitor: Send {
    fn name(&self) -> &str;

    /// Topics this monitor consumes; empty means every topic.
    fn topics(&self) -> &[String];

    fn accepts(&self, topic: &str) -> bool {
        self.topics().is_empty() || self.topics().iter().any(|t| t == topic)
    }

    async fn observe(&mut self, record: &ConsumedRecord, now_ms: i64);

    async fn sweep(&mut self, _now_ms: i64) {}

    async fn persist(&mut self) -> Result<(), PipelineError> {
        Ok(())
    }
}

/// Fans consumed records out to the registered monitors and drives their
/// sweep and persistence schedules until closed.
pub struct MonitorHub {
    monitors: Vec<Box<dyn TopicMonitor>>,
    rx: mpsc::Receiver<ConsumedRecord>,
    poll_timeout: Duration,
    commit_interval: Duration,
}

impl MonitorHub {
    pub fn new(
        rx: mpsc::Receiver<ConsumedRecord>,
        poll_timeout: Duration,
        commit_interval: Duration,
    ) -> Self {
        Self {
            monitors: Vec::new(),
            rx,
            poll_timeout: poll_timeout.max(Duration::from_millis(10)),
            commit_interval: commit_interval.max(Duration::from_millis(10)),
        }
    }

    pub fn register(&mut self, monitor: Box<dyn TopicMonitor>) {
        info!("Registered monitor '{}'", monitor.name());
        self.monitors.push(monitor);
    }

    pub async fn run(mut self, mut close_rx: watch::Receiver<bool>) -> Result<(), PipelineError> {
        let mut sweep = time::interval(self.poll_timeout);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut commit = time::interval(self.commit_interval);
        commit.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = close_rx.changed() => break,
                maybe = self.rx.recv() => match maybe {
                    Some(record) => {
                        let now = epoch_ms();
                        for monitor in &mut self.monitors {
                            if monitor.accepts(&record.topic) {
                                monitor.observe(&record, now).await;
                            }
                        }
                    }
                    None => break,
                },
                _ = sweep.tick() => {
                    let now = epoch_ms();
                    for monitor in &mut self.monitors {
                        monitor.sweep(now).await;
                    }
                }
                _ = commit.tick() => self.persist_all().await,
            }
        }
        self.persist_all().await;
        debug!("Monitor hub stopped");
        Ok(())
    }

    async fn persist_all(&mut self) {
        for monitor in &mut self.monitors {
            if let Err(e) = monitor.persist().await {
                warn!("Failed to persist state of monitor '{}': {}", monitor.name(), e);
            }
        }
    }
}

/// Pull the observation identity out of a record key. All three fields
/// must be present non-null strings.
pub fn extract_observation(key: &Value) -> Option<ObservationKey> {
    let project = key.get("projectId")?.as_str()?;
    let user = key.get("userId")?.as_str()?;
    let source = key.get("sourceId")?.as_str()?;
    Some(ObservationKey::new(project, user, source))
}
