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

// Queue-backed sender with a background worker and heartbeats

use super::Sender;
use crate::error::PipelineError;
use crate::topic::RecordBatch;
use crate::util::RollingTimeAverage;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, error, info, warn};

const INITIAL_RETRY_DELAY_MS: u64 = 100;
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);
const THROUGHPUT_WINDOW: Duration = Duration::from_secs(20);

/// Tunables for the queue/worker layer.
#[derive(Debug, Clone)]
pub struct SenderSettings {
    /// Batches held in the queue before `send` applies backpressure.
    pub queue_capacity: usize,
    /// Delegate attempts per batch and per heartbeat.
    pub retries: u32,
    /// Idle time before the worker probes the delegate.
    pub heartbeat_timeout: Duration,
    /// Slack added to the heartbeat timeout before the connection counts
    /// as stale.
    pub heartbeat_margin: Duration,
}

impl Default for SenderSettings {
    fn default() -> Self {
        Self {
            queue_capacity: 100,
            retries: 3,
            heartbeat_timeout: Duration::from_secs(60),
            heartbeat_margin: Duration::from_secs(10),
        }
    }
}

/// Connection and queue state, published through a watch channel so that
/// `flush` can wait without polling.
#[derive(Debug, Clone)]
pub struct SenderStatus {
    pub pending: usize,
    pub sending: bool,
    pub last_connection: Option<Instant>,
    pub last_heartbeat: Option<Instant>,
    pub was_disconnected: bool,
    pub failure: Option<PipelineError>,
}

impl SenderStatus {
    fn fresh() -> Self {
        let now = Instant::now();
        Self {
            pending: 0,
            sending: false,
            last_connection: Some(now),
            last_heartbeat: Some(now),
            was_disconnected: false,
            failure: None,
        }
    }

    fn last_activity(&self) -> Option<Instant> {
        match (self.last_connection, self.last_heartbeat) {
            (Some(c), Some(h)) => Some(c.max(h)),
            (Some(c), None) => Some(c),
            (None, Some(h)) => Some(h),
            (None, None) => None,
        }
    }
}

/// Fire-and-forget wrapper around another sender.
///
/// `send` enqueues and returns; a worker task drains the queue, retries
/// transport failures, and probes the delegate when traffic goes idle.
/// After repeated failures the sender marks itself disconnected, drops
/// the queue, and refuses new batches until `reset_connection` succeeds.
pub struct ThreadedSender {
    delegate: Arc<dyn Sender>,
    settings: SenderSettings,
    tx: mpsc::Sender<RecordBatch>,
    status: Arc<watch::Sender<SenderStatus>>,
    close_tx: watch::Sender<bool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ThreadedSender {
    pub fn new(delegate: Arc<dyn Sender>, settings: SenderSettings) -> Self {
        let (tx, rx) = mpsc::channel(settings.queue_capacity.max(1));
        let (close_tx, close_rx) = watch::channel(false);
        let (status_tx, _) = watch::channel(SenderStatus::fresh());
        let status = Arc::new(status_tx);

        let worker = SenderWorker {
            delegate: Arc::clone(&delegate),
            settings: settings.clone(),
            rx,
            status: Arc::clone(&status),
            close_rx,
        };
        let handle = tokio::spawn(worker.run());

        Self {
            delegate,
            settings,
            tx,
            status,
            close_tx,
            worker: Mutex::new(Some(handle)),
        }
    }

    /// Non-blocking connectivity judgement. A connection with no
    /// delegate activity for longer than timeout + margin flips to
    /// disconnected here rather than waiting for the worker.
    fn connected_now(&self) -> bool {
        let stale_after = self.settings.heartbeat_timeout + self.settings.heartbeat_margin;
        let mut connected = false;
        let flipped = self.status.send_if_modified(|s| {
            if s.was_disconnected {
                return false;
            }
            match s.last_activity() {
                Some(t) if t.elapsed() <= stale_after => {
                    connected = true;
                    false
                }
                _ => {
                    s.was_disconnected = true;
                    s.last_connection = None;
                    s.last_heartbeat = None;
                    s.failure = Some(PipelineError::NotConnected);
                    true
                }
            }
        });
        if flipped {
            error!("Sender connection went stale, marking disconnected");
        }
        connected
    }

    /// Re-probe the delegate after a disconnection. Returns true when the
    /// sender is usable again; only this call clears the disconnected flag.
    pub async fn reset_connection(&self) -> bool {
        if self.connected_now() {
            return true;
        }
        if self.delegate.is_connected().await {
            self.status.send_modify(|s| {
                let now = Instant::now();
                s.last_connection = Some(now);
                s.last_heartbeat = Some(now);
                s.was_disconnected = false;
                s.failure = None;
            });
            info!("Sender reconnected to the gateway");
            true
        } else {
            false
        }
    }

    /// Snapshot of the current queue and connection state.
    pub fn status(&self) -> SenderStatus {
        self.status.borrow().clone()
    }
}

#[async_trait]
impl Sender for ThreadedSender {
    async fn send(&self, batch: RecordBatch) -> Result<(), PipelineError> {
        if !self.connected_now() {
            return Err(PipelineError::NotConnected);
        }
        self.status.send_modify(|s| s.pending += 1);
        if self.tx.send(batch).await.is_err() {
            self.status
                .send_modify(|s| s.pending = s.pending.saturating_sub(1));
            return Err(PipelineError::Cancelled("sender worker stopped".into()));
        }
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.connected_now()
    }

    async fn flush(&self) -> Result<(), PipelineError> {
        let mut status_rx = self.status.subscribe();
        // Scope the watch guard so it is not held across the delegate await;
        // the guard type is not Send.
        {
            let settled = status_rx
                .wait_for(|s| s.was_disconnected || (s.pending == 0 && !s.sending))
                .await
                .map_err(|_| PipelineError::Cancelled("sender status channel closed".into()))?;
            if settled.was_disconnected {
                let failure = settled
                    .failure
                    .clone()
                    .unwrap_or(PipelineError::NotConnected);
                return Err(failure);
            }
        }
        self.delegate.flush().await
    }

    async fn close(&self) -> Result<(), PipelineError> {
        let mut result = self.flush().await;
        if let Err(e) = &result {
            warn!("Flush before close failed: {}", e);
        }
        let _ = self.close_tx.send(true);
        let handle = self.worker.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("Sender worker task failed: {}", e);
            }
        }
        let remaining = self.status.borrow().pending;
        if remaining > 0 {
            warn!("Dropping {} unsent batches at close", remaining);
            if result.is_ok() {
                result = Err(PipelineError::Cancelled(format!(
                    "{} batches dropped at close",
                    remaining
                )));
            }
        }
        // A delegate close failure takes precedence over earlier errors.
        if let Err(e) = self.delegate.close().await {
            result = Err(e);
        }
        result
    }

    fn last_offset(&self, topic: &str) -> i64 {
        self.delegate.last_offset(topic)
    }
}

struct SenderWorker {
    delegate: Arc<dyn Sender>,
    settings: SenderSettings,
    rx: mpsc::Receiver<RecordBatch>,
    status: Arc<watch::Sender<SenderStatus>>,
    close_rx: watch::Receiver<bool>,
}

impl SenderWorker {
    async fn run(mut self) {
        let mut record_rate = RollingTimeAverage::new(THROUGHPUT_WINDOW);
        let mut request_rate = RollingTimeAverage::new(THROUGHPUT_WINDOW);
        loop {
            let deadline = self.heartbeat_deadline();
            tokio::select! {
                _ = self.close_rx.changed() => break,
                maybe_batch = self.rx.recv() => match maybe_batch {
                    Some(batch) => {
                        self.handle_batch(batch, &mut record_rate, &mut request_rate)
                            .await
                    }
                    None => break,
                },
                _ = time::sleep_until(deadline) => self.heartbeat().await,
            }
        }
        debug!("Sender worker stopped");
    }

    fn heartbeat_deadline(&self) -> Instant {
        match self.status.borrow().last_activity() {
            Some(t) => t + self.settings.heartbeat_timeout,
            // Disconnected; idle until reset_connection brings us back.
            None => Instant::now() + self.settings.heartbeat_timeout,
        }
    }

    async fn handle_batch(
        &mut self,
        batch: RecordBatch,
        record_rate: &mut RollingTimeAverage,
        request_rate: &mut RollingTimeAverage,
    ) {
        if self.status.borrow().was_disconnected {
            debug!(
                "Dropping batch of {} records for topic '{}': sender is disconnected",
                batch.len(),
                batch.topic.name
            );
            self.status
                .send_modify(|s| s.pending = s.pending.saturating_sub(1));
            return;
        }

        self.status.send_modify(|s| s.sending = true);
        let topic = batch.topic.name.clone();
        let size = batch.len();
        let result = self.try_send(batch).await;
        match result {
            Ok(()) => {
                record_rate.add(size as f64);
                request_rate.add(1.0);
                self.status.send_modify(|s| {
                    s.last_connection = Some(Instant::now());
                    s.sending = false;
                    s.pending = s.pending.saturating_sub(1);
                });
                if record_rate.has_average() {
                    debug!(
                        "Sending at {:.1} records/s in {:.1} requests/s",
                        record_rate.average(),
                        request_rate.average()
                    );
                }
            }
            Err(e) if e.is_retryable() => {
                self.status.send_modify(|s| {
                    s.sending = false;
                    s.pending = s.pending.saturating_sub(1);
                });
                self.disconnect(e);
            }
            Err(e) => {
                // Malformed data; retrying cannot help and the connection
                // is not at fault.
                error!(
                    "Dropping batch of {} records for topic '{}': {}",
                    size, topic, e
                );
                self.status.send_modify(|s| {
                    s.sending = false;
                    s.pending = s.pending.saturating_sub(1);
                });
            }
        }
    }

    async fn try_send(&self, batch: RecordBatch) -> Result<(), PipelineError> {
        let mut delay = Duration::from_millis(INITIAL_RETRY_DELAY_MS);
        let mut last_err = PipelineError::NotConnected;
        let attempts = self.settings.retries.max(1);
        for attempt in 1..=attempts {
            match self.delegate.send(batch.clone()).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_retryable() && attempt < attempts => {
                    warn!(
                        "Send attempt {}/{} failed for topic '{}': {}",
                        attempt, attempts, batch.topic.name, e
                    );
                    last_err = e;
                    time::sleep(delay).await;
                    delay = (delay * 2).min(MAX_RETRY_DELAY);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err)
    }

    async fn heartbeat(&mut self) {
        if self.status.borrow().was_disconnected {
            return;
        }
        let mut delay = Duration::from_millis(INITIAL_RETRY_DELAY_MS);
        let attempts = self.settings.retries.max(1);
        for attempt in 1..=attempts {
            if self.delegate.is_connected().await {
                self.status.send_modify(|s| {
                    let now = Instant::now();
                    s.last_connection = Some(now);
                    s.last_heartbeat = Some(now);
                });
                return;
            }
            if attempt < attempts {
                warn!("Heartbeat attempt {}/{} failed", attempt, attempts);
                time::sleep(delay).await;
                delay = (delay * 2).min(MAX_RETRY_DELAY);
            }
        }
        self.disconnect(PipelineError::NotConnected);
    }

    fn disconnect(&mut self, cause: PipelineError) {
        let mut dropped = 0usize;
        while self.rx.try_recv().is_ok() {
            dropped += 1;
        }
        self.status.send_modify(|s| {
            s.was_disconnected = true;
            s.last_connection = None;
            s.last_heartbeat = None;
            s.failure = Some(cause.clone());
            s.pending = s.pending.saturating_sub(dropped);
        });
        error!(
            "Sender disconnected from the gateway, dropped {} queued batches: {}",
            dropped, cause
        );
    }
}
