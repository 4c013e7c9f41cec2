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

use async_trait::async_trait;
use std::sync::Arc;

use vitalflow::apps::{AppCategoryCache, CategoryProvider};
use vitalflow::error::PipelineError;
use vitalflow::keys::ObservationKey;
use vitalflow::stream::{
    NumericAggregate, TimeWindows, UsageCollector, UsageEvent, UsageEventType, UsageKey,
    WindowAggregator,
};

fn device(name: &str) -> ObservationKey {
    ObservationKey::new("radar-test", "user-1", name)
}

#[test]
fn test_two_windows_emit_separate_aggregates() {
    let mut agg: WindowAggregator<ObservationKey, NumericAggregate> =
        WindowAggregator::new(TimeWindows::tumbling(10_000).unwrap());

    agg.add(device("e4"), 2_000, 36.8);
    agg.add(device("e4"), 5_000, 37.0);
    agg.add(device("e4"), 12_000, 37.2);

    let emitted = agg.commit();
    assert_eq!(emitted.len(), 2);

    let (first_key, first) = &emitted[0];
    assert_eq!((first_key.window_start, first_key.window_end), (0, 10_000));
    assert_eq!(first.count, 2);
    assert!((first.mean - 36.9).abs() < 1e-9);

    let (second_key, second) = &emitted[1];
    assert_eq!(
        (second_key.window_start, second_key.window_end),
        (10_000, 20_000)
    );
    assert_eq!(second.count, 1);
    assert!((second.mean - 37.2).abs() < 1e-9);
}

#[test]
fn test_out_of_order_records_land_in_their_window() {
    let mut agg: WindowAggregator<ObservationKey, NumericAggregate> =
        WindowAggregator::new(TimeWindows::tumbling(10_000).unwrap());

    agg.add(device("e4"), 12_000, 37.2);
    agg.add(device("e4"), 2_000, 36.8);
    agg.add(device("e4"), 5_000, 37.0);

    let emitted = agg.commit();
    assert_eq!(emitted.len(), 2);
    // Emission is ordered by window start regardless of arrival order
    assert_eq!(emitted[0].0.window_start, 0);
    assert_eq!(emitted[0].1.count, 2);
    assert_eq!(emitted[1].0.window_start, 10_000);
    assert_eq!(emitted[1].1.count, 1);
}

#[test]
fn test_sources_aggregate_independently() {
    let mut agg: WindowAggregator<ObservationKey, NumericAggregate> =
        WindowAggregator::new(TimeWindows::tumbling(10_000).unwrap());

    agg.add(device("e4-a"), 1_000, 36.0);
    agg.add(device("e4-b"), 1_000, 38.0);
    agg.add(device("e4-a"), 2_000, 36.4);

    let emitted = agg.commit();
    assert_eq!(emitted.len(), 2);
    // Same window, ordered by observation fingerprint
    assert_eq!(emitted[0].0.source_id, "e4-a");
    assert_eq!(emitted[0].1.count, 2);
    assert!((emitted[0].1.mean - 36.2).abs() < 1e-9);
    assert_eq!(emitted[1].0.source_id, "e4-b");
    assert_eq!(emitted[1].1.count, 1);
}

#[test]
fn test_usage_events_group_per_package() {
    let mut agg: WindowAggregator<UsageKey, UsageCollector> =
        WindowAggregator::new(TimeWindows::tumbling(60_000).unwrap());
    let phone = device("phone");

    let events = [
        ("com.example.social", 0, UsageEventType::Foreground),
        ("com.example.social", 4_000, UsageEventType::Background),
        ("com.example.mail", 5_000, UsageEventType::Foreground),
        ("com.example.mail", 7_500, UsageEventType::Background),
        ("com.example.social", 10_000, UsageEventType::Foreground),
        ("com.example.social", 11_000, UsageEventType::Background),
    ];
    for (package, time_ms, event_type) in events {
        agg.add(
            UsageKey::new(phone.clone(), package),
            time_ms,
            UsageEvent {
                package_name: package.to_string(),
                time_ms,
                event_type,
                category: None,
            },
        );
    }

    let emitted = agg.commit();
    assert_eq!(emitted.len(), 2);
    assert!(emitted.iter().all(|(k, _)| k.window_start == 0));

    // The two packages keep separate usage totals within the shared window
    let mut opened: Vec<i32> = emitted.iter().map(|(_, s)| s.times_opened).collect();
    opened.sort_unstable();
    assert_eq!(opened, vec![1, 2]);
    let foreground: i64 = emitted.iter().map(|(_, s)| s.foreground_time_ms).sum();
    assert_eq!(foreground, 7_500);
}

struct TableProvider;

#[async_trait]
impl CategoryProvider for TableProvider {
    async fn fetch(&self, package_name: &str) -> Result<Option<String>, PipelineError> {
        Ok(match package_name {
            "com.example.social" => Some("SOCIAL".to_string()),
            _ => None,
        })
    }
}

#[tokio::test]
async fn test_usage_summaries_carry_looked_up_categories() {
    let cache = AppCategoryCache::new(Arc::new(TableProvider));
    let phone = device("phone");
    let mut agg: WindowAggregator<UsageKey, UsageCollector> =
        WindowAggregator::new(TimeWindows::tumbling(60_000).unwrap());

    let mut events = vec![
        UsageEvent {
            package_name: "com.example.social".to_string(),
            time_ms: 1_000,
            event_type: UsageEventType::Foreground,
            category: None,
        },
        UsageEvent {
            package_name: "com.example.social".to_string(),
            time_ms: 4_000,
            event_type: UsageEventType::Background,
            category: None,
        },
        UsageEvent {
            package_name: "com.example.unknown".to_string(),
            time_ms: 5_000,
            event_type: UsageEventType::Foreground,
            category: None,
        },
    ];
    for event in &mut events {
        cache.annotate(event).await;
    }
    for event in events {
        let key = UsageKey::new(phone.clone(), event.package_name.clone());
        agg.add(key, event.time_ms, event);
    }

    let emitted = agg.commit();
    assert_eq!(emitted.len(), 2);

    let social = emitted
        .iter()
        .find(|(_, s)| s.category.as_deref() == Some("SOCIAL"))
        .map(|(_, s)| s)
        .expect("no summary annotated with the looked-up category");
    assert_eq!(social.foreground_time_ms, 3_000);
    assert_eq!(social.times_opened, 1);

    // The unknown package stays uncategorized
    assert!(emitted.iter().any(|(_, s)| s.category.is_none()));
}
