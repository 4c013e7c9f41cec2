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

// Record coalescing in front of the gateway

use super::Sender;
use crate::error::PipelineError;
use crate::topic::{Record, RecordBatch, TopicBinding};
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, warn};

struct TopicBuffer {
    topic: Arc<TopicBinding>,
    records: Vec<Record>,
    oldest: Instant,
}

impl TopicBuffer {
    fn new(topic: Arc<TopicBinding>) -> Self {
        Self {
            topic,
            records: Vec::new(),
            oldest: Instant::now(),
        }
    }

    fn push(&mut self, record: Record) {
        if self.records.is_empty() {
            self.oldest = Instant::now();
        }
        self.records.push(record);
    }

    fn append(&mut self, records: Vec<Record>) {
        if self.records.is_empty() && !records.is_empty() {
            self.oldest = Instant::now();
        }
        self.records.extend(records);
    }

    fn due(&self, max_age: Duration) -> bool {
        !self.records.is_empty() && self.oldest.elapsed() >= max_age
    }

    fn take(&mut self) -> RecordBatch {
        RecordBatch::new(Arc::clone(&self.topic), std::mem::take(&mut self.records))
    }
}

struct BatchingInner {
    delegate: Arc<dyn Sender>,
    batch_size: usize,
    max_age: Duration,
    buffers: DashMap<String, TopicBuffer>,
}

impl BatchingInner {
    fn take_due(&self) -> Vec<RecordBatch> {
        let mut due = Vec::new();
        for mut entry in self.buffers.iter_mut() {
            if entry.due(self.max_age) {
                due.push(entry.take());
            }
        }
        due
    }

    fn take_all(&self) -> Vec<RecordBatch> {
        let mut all = Vec::new();
        for mut entry in self.buffers.iter_mut() {
            if !entry.records.is_empty() {
                all.push(entry.take());
            }
        }
        all
    }
}

/// Coalesces single records into per-topic batches before handing them to
/// the delegate. A batch leaves the buffer when it reaches `batch_size`
/// records or when its oldest record exceeds `max_age`; a background sweep
/// of period `max_age` catches idle buffers, so a record waits at most
/// twice `max_age`. Buffer locks are per topic and released before any
/// delegate call.
pub struct BatchingSender {
    inner: Arc<BatchingInner>,
    close_tx: watch::Sender<bool>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl BatchingSender {
    pub fn new(delegate: Arc<dyn Sender>, batch_size: usize, max_age: Duration) -> Self {
        let inner = Arc::new(BatchingInner {
            delegate,
            batch_size: batch_size.max(1),
            max_age: max_age.max(Duration::from_millis(1)),
            buffers: DashMap::new(),
        });
        let (close_tx, close_rx) = watch::channel(false);
        let handle = tokio::spawn(sweep(Arc::clone(&inner), close_rx));
        Self {
            inner,
            close_tx,
            sweeper: Mutex::new(Some(handle)),
        }
    }

    /// Append one record to the topic's pending buffer, forwarding the
    /// buffer downstream when it becomes full or overdue.
    pub async fn send_record(
        &self,
        topic: &Arc<TopicBinding>,
        offset: i64,
        key: Value,
        value: Value,
    ) -> Result<(), PipelineError> {
        let ready = {
            let mut entry = self
                .inner
                .buffers
                .entry(topic.name.clone())
                .or_insert_with(|| TopicBuffer::new(Arc::clone(topic)));
            entry.push(Record::new(offset, key, value));
            if entry.records.len() >= self.inner.batch_size || entry.due(self.inner.max_age) {
                Some(entry.take())
            } else {
                None
            }
        };
        match ready {
            Some(batch) => self.inner.delegate.send(batch).await,
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Sender for BatchingSender {
    async fn send(&self, batch: RecordBatch) -> Result<(), PipelineError> {
        if batch.is_empty() {
            return Ok(());
        }
        let ready = {
            let mut entry = self
                .inner
                .buffers
                .entry(batch.topic.name.clone())
                .or_insert_with(|| TopicBuffer::new(Arc::clone(&batch.topic)));
            entry.append(batch.records);
            if entry.records.len() >= self.inner.batch_size || entry.due(self.inner.max_age) {
                Some(entry.take())
            } else {
                None
            }
        };
        match ready {
            Some(batch) => self.inner.delegate.send(batch).await,
            None => Ok(()),
        }
    }

    async fn is_connected(&self) -> bool {
        self.inner.delegate.is_connected().await
    }

    async fn flush(&self) -> Result<(), PipelineError> {
        for batch in self.inner.take_all() {
            self.inner.delegate.send(batch).await?;
        }
        self.inner.delegate.flush().await
    }

    async fn close(&self) -> Result<(), PipelineError> {
        if let Err(e) = self.flush().await {
            warn!("Flush before close failed: {}", e);
        }
        let _ = self.close_tx.send(true);
        let handle = self.sweeper.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("Batch sweeper task failed: {}", e);
            }
        }
        self.inner.delegate.close().await
    }

    fn last_offset(&self, topic: &str) -> i64 {
        self.inner.delegate.last_offset(topic)
    }
}

async fn sweep(inner: Arc<BatchingInner>, mut close_rx: watch::Receiver<bool>) {
    let mut ticker = time::interval(inner.max_age);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = close_rx.changed() => break,
            _ = ticker.tick() => {
                for batch in inner.take_due() {
                    let topic = batch.topic.name.clone();
                    let size = batch.len();
                    if let Err(e) = inner.delegate.send(batch).await {
                        warn!(
                            "Age flush of {} records for topic '{}' failed: {}",
                            size, topic, e
                        );
                    }
                }
            }
        }
    }
    debug!("Batch sweeper stopped");
}
