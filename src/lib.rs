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

// Biosignal event pipeline in front of a Kafka REST gateway
//
// This is a producer-side pipeline for wearable and phone telemetry that:
// - Batches keyed records per topic by size and age
// - Encodes batches as Avro-JSON gateway requests with resolved schema ids
// - Ships them through a queued worker with retries and heartbeats
// - Aggregates numeric streams over tumbling windows
// - Watches the stream for silent sources and draining batteries

pub mod apps;
pub mod config;
pub mod encoder;
pub mod error;
pub mod keys;
pub mod monitor;
pub mod schema;
pub mod sender;
pub mod source;
pub mod state;
pub mod stream;
pub mod topic;
pub mod util;

// Re-export main types
pub use config::{load_config, load_config_with_env, PipelineConfig};
pub use encoder::JsonWriter;
pub use error::PipelineError;
pub use keys::{AggregateKey, ObservationKey};
pub use monitor::{
    BatteryLevelMonitor, BatteryStatus, ConsumedRecord, DisconnectMonitor, LogNotifier,
    MonitorHub, Notifier, SourceStatisticsMonitor, TopicMonitor,
};
pub use schema::{LocalSchemaResolver, RegistrySchemaResolver, SchemaCache, SchemaResolver};
pub use sender::{
    BatchingSender, RestSender, Sender, SenderSettings, SenderStatus, ThreadedSender,
};
pub use source::MockSource;
pub use state::{PersistentStateStore, SourceStatisticsState};
pub use stream::{NumericAggregate, NumericSummary, TimeWindows, WindowAggregator};
pub use topic::{Record, RecordBatch, TopicBinding, TopicCatalog};
