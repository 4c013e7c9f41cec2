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

// Simulated device fleet

use crate::error::PipelineError;
use crate::keys::ObservationKey;
use crate::monitor::ConsumedRecord;
use crate::sender::{BatchingSender, ThreadedSender};
use crate::stream::{NumericAggregate, TimeWindows, WindowAggregator};
use crate::topic::{TopicBinding, TopicCatalog};
use crate::util::epoch_secs;
use rand::Rng;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

const BATTERY_DECAY_PER_TICK: f64 = 0.002;

/// Topics the simulation produces to.
#[derive(Debug, Clone)]
pub struct SimulationTopics {
    pub battery: String,
    pub temperature: String,
    pub temperature_output: String,
}

#[derive(Debug, Clone)]
pub struct SimulationSettings {
    pub devices: u32,
    pub period: Duration,
    pub windows: TimeWindows,
    pub commit_interval: Duration,
    pub topics: SimulationTopics,
}

/// Generates battery and body-temperature records for a fleet of fake
/// devices, pushing them through the full producer stack. Temperature
/// values also run through a window aggregator whose summaries go to the
/// aggregate output topic, and every record is mirrored to the monitor
/// channel.
pub struct MockSource {
    devices: Vec<ObservationKey>,
    period: Duration,
    windows: TimeWindows,
    commit_interval: Duration,
    topics: SimulationTopics,
    catalog: Arc<TopicCatalog>,
    batching: Arc<BatchingSender>,
    threaded: Arc<ThreadedSender>,
    tap: mpsc::Sender<ConsumedRecord>,
}

impl MockSource {
    pub fn new(
        settings: SimulationSettings,
        catalog: Arc<TopicCatalog>,
        batching: Arc<BatchingSender>,
        threaded: Arc<ThreadedSender>,
        tap: mpsc::Sender<ConsumedRecord>,
    ) -> Self {
        let devices = (0..settings.devices.max(1))
            .map(|i| ObservationKey::new("simulation", format!("user{}", i), format!("source{}", i)))
            .collect();
        Self {
            devices,
            period: settings.period.max(Duration::from_millis(10)),
            windows: settings.windows,
            commit_interval: settings.commit_interval.max(Duration::from_millis(10)),
            topics: settings.topics,
            catalog,
            batching,
            threaded,
            tap,
        }
    }

    pub async fn run(self, mut close_rx: watch::Receiver<bool>) -> Result<(), PipelineError> {
        let battery = self.catalog.binding(&self.topics.battery).await?;
        let temperature = self.catalog.binding(&self.topics.temperature).await?;
        let output = self.catalog.binding(&self.topics.temperature_output).await?;

        let device_keys: Vec<Value> = self
            .devices
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<_, _>>()
            .map_err(|e| PipelineError::encoding("key", e.to_string()))?;

        let mut aggregator: WindowAggregator<ObservationKey, NumericAggregate> =
            WindowAggregator::new(self.windows);
        let mut offsets: HashMap<String, i64> = HashMap::new();
        let mut battery_levels = vec![1.0_f64; self.devices.len()];

        let mut ticker = time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut commit = time::interval(self.commit_interval);
        commit.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Simulating {} devices every {} ms",
            self.devices.len(),
            self.period.as_millis()
        );
        loop {
            tokio::select! {
                _ = close_rx.changed() => break,
                _ = ticker.tick() => {
                    self.emit_round(
                        &battery,
                        &temperature,
                        &device_keys,
                        &mut battery_levels,
                        &mut offsets,
                        &mut aggregator,
                    )
                    .await;
                }
                _ = commit.tick() => {
                    self.publish_aggregates(&mut aggregator, &output, &mut offsets).await;
                }
            }
        }
        self.publish_aggregates(&mut aggregator, &output, &mut offsets).await;
        info!("Simulation stopped");
        Ok(())
    }

    async fn emit_round(
        &self,
        battery: &Arc<TopicBinding>,
        temperature: &Arc<TopicBinding>,
        device_keys: &[Value],
        battery_levels: &mut [f64],
        offsets: &mut HashMap<String, i64>,
        aggregator: &mut WindowAggregator<ObservationKey, NumericAggregate>,
    ) {
        for (i, device) in self.devices.iter().enumerate() {
            let now = epoch_secs();
            battery_levels[i] -= BATTERY_DECAY_PER_TICK;
            if battery_levels[i] < 0.0 {
                battery_levels[i] = 1.0;
            }
            let level = battery_levels[i];
            let temp = 36.6 + rand::thread_rng().gen_range(-0.4..0.4);

            let battery_value = json!({
                "time": now,
                "timeReceived": now,
                "batteryLevel": level,
            });
            self.deliver(battery, offsets, device_keys[i].clone(), battery_value)
                .await;

            let temperature_value = json!({
                "time": now,
                "timeReceived": now,
                "temperature": temp,
            });
            self.deliver(
                temperature,
                offsets,
                device_keys[i].clone(),
                temperature_value,
            )
            .await;
            aggregator.add(device.clone(), (now * 1000.0) as i64, temp);
        }
    }

    async fn publish_aggregates(
        &self,
        aggregator: &mut WindowAggregator<ObservationKey, NumericAggregate>,
        output: &Arc<TopicBinding>,
        offsets: &mut HashMap<String, i64>,
    ) {
        for (window_key, summary) in aggregator.commit() {
            let (key, value) = match (
                serde_json::to_value(&window_key),
                serde_json::to_value(&summary),
            ) {
                (Ok(key), Ok(value)) => (key, value),
                _ => {
                    warn!("Failed to serialize aggregate for '{}'", output.name);
                    continue;
                }
            };
            self.deliver(output, offsets, key, value).await;
        }
    }

    async fn deliver(
        &self,
        binding: &Arc<TopicBinding>,
        offsets: &mut HashMap<String, i64>,
        key: Value,
        value: Value,
    ) {
        let offset = offsets
            .entry(binding.name.clone())
            .and_modify(|o| *o += 1)
            .or_insert(0);
        let offset = *offset;

        match self
            .batching
            .send_record(binding, offset, key.clone(), value.clone())
            .await
        {
            Ok(()) => {}
            Err(PipelineError::NotConnected) => {
                if self.threaded.reset_connection().await {
                    info!("Gateway connection restored");
                } else {
                    debug!(
                        "Gateway still unreachable, dropping record for '{}'",
                        binding.name
                    );
                }
            }
            Err(e) => warn!("Failed to send record for '{}': {}", binding.name, e),
        }

        if self
            .tap
            .send(ConsumedRecord::new(binding.name.as_str(), key, value))
            .await
            .is_err()
        {
            debug!("Monitor channel closed");
        }
    }
}
