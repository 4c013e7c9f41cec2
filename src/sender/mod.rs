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

// Sender module
//
// One capability trait with three composable implementations:
// RestSender posts batches to the gateway, ThreadedSender adds the
// queue/worker/heartbeat layer, BatchingSender coalesces single records.
// Production wiring is Batching -> Threaded -> Rest.

pub mod batching;
pub mod rest;
pub mod threaded;

pub use batching::BatchingSender;
pub use rest::RestSender;
pub use threaded::{SenderSettings, SenderStatus, ThreadedSender};

use crate::error::PipelineError;
use crate::topic::RecordBatch;
use async_trait::async_trait;

/// Capability trait for everything that can move record batches toward
/// the gateway. Implementations are shared behind `Arc` and use interior
/// state; all methods take `&self`.
#[async_trait]
pub trait Sender: Send + Sync {
    /// Submit one batch. Encoding and schema problems surface here
    /// synchronously; queue-backed implementations may instead accept the
    /// batch and fail asynchronously.
    async fn send(&self, batch: RecordBatch) -> Result<(), PipelineError>;

    /// Cheap connectivity probe. Must not retry internally.
    async fn is_connected(&self) -> bool;

    /// Push everything buffered downstream and wait for acknowledgement.
    async fn flush(&self) -> Result<(), PipelineError>;

    /// Flush what is possible, stop background work, and release the
    /// delegate chain.
    async fn close(&self) -> Result<(), PipelineError>;

    /// Highest producer offset successfully submitted for the topic, or
    /// -1 when nothing was sent yet.
    fn last_offset(&self, topic: &str) -> i64;
}
