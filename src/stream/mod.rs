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

// Stream module
//
// Tumbling-window aggregation over keyed event streams: TimeWindows
// assigns events to windows, WindowAggregator holds one collector per
// (key, window) cell, and the collectors turn raw values into summaries.

pub mod collect;
pub mod window;

pub use collect::{
    Collector, NumericAggregate, NumericSummary, UsageCollector, UsageEvent, UsageEventType,
    UsageKey, UsageSummary,
};
pub use window::{TimeWindows, WindowAggregator, WindowKey};
