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

// Per-window collectors

use crate::keys::ObservationKey;
use crate::stream::window::WindowKey;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

const RESERVOIR_CAPACITY: usize = 1000;

/// Incremental state for one `(key, window)` cell.
pub trait Collector: Default {
    type Input;
    type Output;

    fn add(&mut self, input: Self::Input);
    fn finalize(self) -> Self::Output;
}

/// Running numeric statistics with a bounded sample for quartiles.
///
/// The sum uses Kahan compensation; the sample is a uniform reservoir
/// (Vitter's algorithm R) capped at 1000 values.
#[derive(Debug, Clone)]
pub struct NumericAggregate {
    count: u64,
    min: f64,
    max: f64,
    sum: f64,
    compensation: f64,
    sum_squares: f64,
    reservoir: Vec<f64>,
}

impl Default for NumericAggregate {
    fn default() -> Self {
        Self {
            count: 0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            sum: 0.0,
            compensation: 0.0,
            sum_squares: 0.0,
            reservoir: Vec::new(),
        }
    }
}

impl NumericAggregate {
    pub fn count(&self) -> u64 {
        self.count
    }
}

impl Collector for NumericAggregate {
    type Input = f64;
    type Output = NumericSummary;

    fn add(&mut self, value: f64) {
        self.count += 1;
        self.min = self.min.min(value);
        self.max = self.max.max(value);

        let y = value - self.compensation;
        let t = self.sum + y;
        self.compensation = (t - self.sum) - y;
        self.sum = t;
        self.sum_squares += value * value;

        if self.reservoir.len() < RESERVOIR_CAPACITY {
            self.reservoir.push(value);
        } else {
            let j = rand::thread_rng().gen_range(0..self.count);
            if (j as usize) < RESERVOIR_CAPACITY {
                self.reservoir[j as usize] = value;
            }
        }
    }

    fn finalize(mut self) -> NumericSummary {
        if self.count == 0 {
            return NumericSummary::default();
        }
        let n = self.count as f64;
        let mean = self.sum / n;
        let variance = (self.sum_squares / n - mean * mean).max(0.0);

        self.reservoir
            .sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
        let at = |p: usize| {
            let idx = (self.reservoir.len() * p / 100).min(self.reservoir.len() - 1);
            self.reservoir[idx]
        };
        let quartile = [at(25), at(50), at(75)];

        NumericSummary {
            count: self.count,
            min: self.min,
            max: self.max,
            sum: self.sum,
            mean,
            stdev: variance.sqrt(),
            iqr: quartile[2] - quartile[0],
            quartile,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NumericSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub sum: f64,
    pub mean: f64,
    pub stdev: f64,
    pub quartile: [f64; 3],
    pub iqr: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UsageEventType {
    Foreground,
    Background,
    Other,
}

/// One phone app interaction event, as fed to the usage collector.
#[derive(Debug, Clone)]
pub struct UsageEvent {
    pub package_name: String,
    pub time_ms: i64,
    pub event_type: UsageEventType,
    pub category: Option<String>,
}

/// Grouping key for app usage windows: one cell per user per package.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UsageKey {
    pub observation: ObservationKey,
    pub package_name: String,
}

impl UsageKey {
    pub fn new(observation: ObservationKey, package_name: impl Into<String>) -> Self {
        Self {
            observation,
            package_name: package_name.into(),
        }
    }
}

impl WindowKey for UsageKey {
    fn observation(&self) -> &ObservationKey {
        &self.observation
    }
}

/// Accumulates foreground time for one package.
///
/// The gap between a FOREGROUND event and the next event of the same
/// package counts as foreground time. Opens are FOREGROUND transitions.
#[derive(Debug, Clone, Default)]
pub struct UsageCollector {
    foreground_time_ms: i64,
    times_opened: i32,
    last_category: Option<String>,
    previous: Option<(String, i64, UsageEventType)>,
}

impl Collector for UsageCollector {
    type Input = UsageEvent;
    type Output = UsageSummary;

    fn add(&mut self, event: UsageEvent) {
        if let Some((prev_package, prev_time, prev_type)) = &self.previous {
            if *prev_type == UsageEventType::Foreground && *prev_package == event.package_name {
                self.foreground_time_ms += (event.time_ms - prev_time).max(0);
            }
        }
        if event.event_type == UsageEventType::Foreground {
            self.times_opened += 1;
        }
        if event.category.is_some() {
            self.last_category = event.category;
        }
        self.previous = Some((event.package_name, event.time_ms, event.event_type));
    }

    fn finalize(self) -> UsageSummary {
        UsageSummary {
            foreground_time_ms: self.foreground_time_ms,
            times_opened: self.times_opened,
            category: self.last_category,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSummary {
    pub foreground_time_ms: i64,
    pub times_opened: i32,
    pub category: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_aggregate_basic_stats() {
        let mut agg = NumericAggregate::default();
        for v in [1.0, 2.0, 3.0, 4.0, 5.0] {
            agg.add(v);
        }
        let summary = agg.finalize();
        assert_eq!(summary.count, 5);
        assert_eq!(summary.min, 1.0);
        assert_eq!(summary.max, 5.0);
        assert!((summary.mean - 3.0).abs() < 1e-9);
        assert_eq!(summary.quartile, [2.0, 3.0, 4.0]);
        assert!((summary.iqr - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_numeric_aggregate_kahan_sum() {
        let mut agg = NumericAggregate::default();
        agg.add(1e16);
        for _ in 0..10 {
            agg.add(1.0);
        }
        let summary = agg.finalize();
        // A naive f64 sum loses the ten small increments entirely.
        assert_eq!(summary.sum, 1e16 + 10.0);
    }

    #[test]
    fn test_reservoir_stays_bounded() {
        let mut agg = NumericAggregate::default();
        for i in 0..5000 {
            agg.add(i as f64);
        }
        assert_eq!(agg.count(), 5000);
        let summary = agg.finalize();
        assert_eq!(summary.min, 0.0);
        assert_eq!(summary.max, 4999.0);
        assert!(summary.quartile[0] <= summary.quartile[1]);
        assert!(summary.quartile[1] <= summary.quartile[2]);
    }

    #[test]
    fn test_usage_collector_consecutive_foreground() {
        let mut usage = UsageCollector::default();
        usage.add(UsageEvent {
            package_name: "com.example.app".into(),
            time_ms: 1000,
            event_type: UsageEventType::Foreground,
            category: None,
        });
        usage.add(UsageEvent {
            package_name: "com.example.app".into(),
            time_ms: 4000,
            event_type: UsageEventType::Background,
            category: Some("SOCIAL".into()),
        });
        // Different package; the gap does not count.
        usage.add(UsageEvent {
            package_name: "com.other.app".into(),
            time_ms: 9000,
            event_type: UsageEventType::Foreground,
            category: None,
        });
        let summary = usage.finalize();
        assert_eq!(summary.foreground_time_ms, 3000);
        assert_eq!(summary.times_opened, 2);
        assert_eq!(summary.category.as_deref(), Some("SOCIAL"));
    }

    #[test]
    fn test_usage_collector_interrupted_foreground() {
        let mut usage = UsageCollector::default();
        let event = |package: &str, time_ms, event_type| UsageEvent {
            package_name: package.into(),
            time_ms,
            event_type,
            category: None,
        };
        usage.add(event("a", 0, UsageEventType::Foreground));
        // 'b' interrupts before another 'a' event arrives, so a's gap is lost.
        usage.add(event("b", 5000, UsageEventType::Foreground));
        usage.add(event("b", 7000, UsageEventType::Background));
        usage.add(event("a", 8000, UsageEventType::Foreground));
        usage.add(event("a", 8500, UsageEventType::Background));
        let summary = usage.finalize();
        assert_eq!(summary.foreground_time_ms, 2500);
        assert_eq!(summary.times_opened, 3);
    }
}
