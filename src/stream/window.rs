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

// Tumbling-window aggregation

use crate::error::PipelineError;
use crate::keys::{AggregateKey, ObservationKey};
use crate::stream::collect::Collector;
use std::collections::HashMap;
use std::hash::Hash;

/// Grouping keys must expose the observation identity so that window
/// emissions can be keyed for the output topic.
pub trait WindowKey: Clone + Eq + Hash {
    fn observation(&self) -> &ObservationKey;
}

impl WindowKey for ObservationKey {
    fn observation(&self) -> &ObservationKey {
        self
    }
}

/// Tumbling window assignment over millisecond event time.
#[derive(Debug, Clone, Copy)]
pub struct TimeWindows {
    width_ms: i64,
}

impl TimeWindows {
    pub fn tumbling(width_ms: i64) -> Result<Self, PipelineError> {
        if width_ms <= 0 {
            return Err(PipelineError::Config(format!(
                "window width must be positive, got {} ms",
                width_ms
            )));
        }
        Ok(Self { width_ms })
    }

    pub fn width_ms(&self) -> i64 {
        self.width_ms
    }

    /// Window index for an event time; floor division keeps pre-epoch
    /// times in the right window.
    pub fn index(&self, event_time_ms: i64) -> i64 {
        event_time_ms.div_euclid(self.width_ms)
    }

    pub fn span(&self, index: i64) -> (i64, i64) {
        (index * self.width_ms, (index + 1) * self.width_ms)
    }
}

/// Groups `(key, value, event time)` triples into tumbling windows, one
/// collector per `(key, window)` cell. `commit` drains and finalizes all
/// cells; a late record arriving after its window was committed simply
/// opens a fresh cell, and downstream consumers merge the overlapping
/// emissions.
pub struct WindowAggregator<K: WindowKey, C: Collector> {
    windows: TimeWindows,
    state: HashMap<(K, i64), C>,
}

impl<K: WindowKey, C: Collector> WindowAggregator<K, C> {
    pub fn new(windows: TimeWindows) -> Self {
        Self {
            windows,
            state: HashMap::new(),
        }
    }

    pub fn add(&mut self, key: K, event_time_ms: i64, input: C::Input) {
        let index = self.windows.index(event_time_ms);
        self.state.entry((key, index)).or_default().add(input);
    }

    pub fn len(&self) -> usize {
        self.state.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }

    /// Drain every open cell, emitting `(window key, summary)` pairs
    /// ordered by window start and then observation fingerprint so that
    /// emission order is deterministic.
    pub fn commit(&mut self) -> Vec<(AggregateKey, C::Output)> {
        let mut out: Vec<(AggregateKey, C::Output)> = self
            .state
            .drain()
            .map(|((key, index), collector)| {
                let (start, end) = self.windows.span(index);
                (
                    AggregateKey::windowed(key.observation(), start, end),
                    collector.finalize(),
                )
            })
            .collect();
        out.sort_by(|a, b| {
            a.0.window_start.cmp(&b.0.window_start).then_with(|| {
                a.0.observation()
                    .fingerprint()
                    .cmp(&b.0.observation().fingerprint())
            })
        });
        out
    }
}
