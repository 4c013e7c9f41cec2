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

// Per-source observation span tracking

use super::{extract_observation, ConsumedRecord, TopicMonitor};
use crate::error::PipelineError;
use crate::keys::{AggregateKey, ObservationKey};
use crate::sender::Sender;
use crate::state::{PersistentStateStore, SourceStatisticsState};
use crate::topic::{Record, RecordBatch, TopicBinding};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

const CLIENT_ID: &str = "source_statistics";

/// Tracks the `[first seen, last seen]` interval per source across the
/// consumed aggregate topics and republishes the widened interval on
/// every update. Restarts resume from the persisted snapshot.
pub struct SourceStatisticsMonitor {
    topics: Vec<String>,
    output: Arc<TopicBinding>,
    sender: Arc<dyn Sender>,
    store: Arc<PersistentStateStore>,
    group: String,
    state: SourceStatisticsState,
    next_offset: i64,
    dirty: bool,
}

impl SourceStatisticsMonitor {
    pub async fn new(
        topics: Vec<String>,
        output: Arc<TopicBinding>,
        sender: Arc<dyn Sender>,
        store: Arc<PersistentStateStore>,
        group: impl Into<String>,
    ) -> Result<Self, PipelineError> {
        let group = group.into();
        let state = store
            .retrieve(&group, CLIENT_ID, SourceStatisticsState::default())
            .await?;
        Ok(Self {
            topics,
            output,
            sender,
            store,
            group,
            state,
            next_offset: 0,
            dirty: false,
        })
    }

    pub fn tracked_sources(&self) -> usize {
        self.state.sources.len()
    }

    async fn publish(&mut self, observation: ObservationKey, merged: AggregateKey) {
        let (key, value) = match (
            serde_json::to_value(&observation),
            serde_json::to_value(&merged),
        ) {
            (Ok(key), Ok(value)) => (key, value),
            _ => {
                warn!("Failed to serialize statistics for '{}'", observation.fingerprint());
                return;
            }
        };
        let batch = RecordBatch::new(
            Arc::clone(&self.output),
            vec![Record::new(self.next_offset, key, value)],
        );
        self.next_offset += 1;
        if let Err(e) = self.sender.send(batch).await {
            warn!(
                "Failed to republish statistics for '{}': {}",
                observation.fingerprint(),
                e
            );
        }
    }
}

#[async_trait]
impl TopicMonitor for SourceStatisticsMonitor {
    fn name(&self) -> &str {
        "source_statistics"
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
        let Some((start, end)) = record_span(record) else {
            warn!(
                "Dropping record on topic '{}' for '{}': no usable timestamps",
                record.topic,
                observation.fingerprint()
            );
            return;
        };

        let fingerprint = observation.fingerprint();
        let merged = match self.state.sources.get_mut(&fingerprint) {
            Some(existing) => {
                existing.merge_span(start, end);
                existing.clone()
            }
            None => {
                let fresh = AggregateKey::windowed(&observation, start, end);
                self.state.sources.insert(fingerprint, fresh.clone());
                fresh
            }
        };
        self.dirty = true;
        self.publish(observation, merged).await;
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

/// Interval covered by one consumed record: event time when the value
/// carries one, the key's window otherwise.
fn record_span(record: &ConsumedRecord) -> Option<(i64, i64)> {
    let time_ms = ["timeReceived", "time"]
        .iter()
        .find_map(|field| {
            record
                .value
                .get(*field)
                .and_then(Value::as_f64)
                .filter(|t| *t != 0.0)
        })
        .map(|secs| (secs * 1000.0) as i64);
    if let Some(t) = time_ms {
        return Some((t, t));
    }
    let start = record.key.get("start").and_then(Value::as_i64).unwrap_or(0);
    let end = record.key.get("end").and_then(Value::as_i64).unwrap_or(0);
    if start == 0 && end == 0 {
        None
    } else {
        Some((start, end))
    }
}
