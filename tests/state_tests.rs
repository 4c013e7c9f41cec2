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

use tempfile::tempdir;

use vitalflow::keys::{AggregateKey, ObservationKey};
use vitalflow::state::{MissingReport, PersistentStateStore, SourceStatisticsState};

fn sample_state() -> SourceStatisticsState {
    let mut state = SourceStatisticsState::default();
    for (user, start, end) in [
        ("user-1", 1_000, 5_000),
        ("user-2", 2_000, 8_000),
        ("user-3", 500, 9_500),
    ] {
        let observation = ObservationKey::new("radar-test", user, "e4");
        state.sources.insert(
            observation.fingerprint(),
            AggregateKey::windowed(&observation, start, end),
        );
        state.last_seen.insert(observation.fingerprint(), end);
    }
    state.reported_missing.insert(
        "radar-test/user-3/e4".to_string(),
        MissingReport {
            last_seen: 9_500,
            reported_at: 12_000,
            alert_count: 2,
        },
    );
    state
        .battery_levels
        .insert("radar-test/user-1/e4".to_string(), 0.42);
    state
}

#[tokio::test]
async fn test_snapshot_round_trip() {
    let dir = tempdir().unwrap();
    let state = sample_state();

    let store = PersistentStateStore::new(dir.path()).await.unwrap();
    store.store("vitalflow", "disconnect", &state).await.unwrap();

    // A fresh instance over the same directory sees the identical snapshot
    let reopened = PersistentStateStore::new(dir.path()).await.unwrap();
    let loaded: SourceStatisticsState = reopened
        .retrieve("vitalflow", "disconnect", SourceStatisticsState::default())
        .await
        .unwrap();

    assert_eq!(loaded, state);
    assert_eq!(loaded.sources.len(), 3);
    let report = &loaded.reported_missing["radar-test/user-3/e4"];
    assert_eq!(report.alert_count, 2);
    assert_eq!(report.reported_at, 12_000);
}

#[tokio::test]
async fn test_missing_snapshot_yields_default() {
    let dir = tempdir().unwrap();
    let store = PersistentStateStore::new(dir.path()).await.unwrap();

    let fallback = SourceStatisticsState::default();
    let expected_id = fallback.group_id.clone();
    let loaded: SourceStatisticsState = store
        .retrieve("vitalflow", "battery_level", fallback)
        .await
        .unwrap();

    assert_eq!(loaded.group_id, expected_id);
    assert!(loaded.sources.is_empty());
}

#[tokio::test]
async fn test_unreadable_snapshot_yields_default() {
    let dir = tempdir().unwrap();
    let store = PersistentStateStore::new(dir.path()).await.unwrap();
    tokio::fs::write(dir.path().join("g_c.yml"), "{ not yaml: [")
        .await
        .unwrap();

    let loaded: SourceStatisticsState = store
        .retrieve("g", "c", SourceStatisticsState::default())
        .await
        .unwrap();
    assert!(loaded.sources.is_empty());
    assert!(loaded.reported_missing.is_empty());
}

#[tokio::test]
async fn test_store_overwrites_and_leaves_no_temp_file() {
    let dir = tempdir().unwrap();
    let store = PersistentStateStore::new(dir.path()).await.unwrap();

    let first = sample_state();
    store.store("g", "c", &first).await.unwrap();
    let mut second = first.clone();
    second.battery_levels.insert("radar-test/user-2/e4".to_string(), 0.9);
    store.store("g", "c", &second).await.unwrap();

    let loaded: SourceStatisticsState = store
        .retrieve("g", "c", SourceStatisticsState::default())
        .await
        .unwrap();
    assert_eq!(loaded, second);

    let mut names = Vec::new();
    let mut entries = tokio::fs::read_dir(dir.path()).await.unwrap();
    while let Some(entry) = entries.next_entry().await.unwrap() {
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    assert_eq!(names, vec!["g_c.yml"]);
}

#[tokio::test]
async fn test_group_and_client_names_are_sanitized() {
    let dir = tempdir().unwrap();
    let store = PersistentStateStore::new(dir.path()).await.unwrap();

    store
        .store("radar/Test Group", "source:stats", &sample_state())
        .await
        .unwrap();

    let path = dir.path().join("radar_Test_Group_source_stats.yml");
    assert!(path.is_file(), "expected sanitized snapshot at {:?}", path);
}

#[tokio::test]
async fn test_state_created_under_missing_directory() {
    let dir = tempdir().unwrap();
    let nested = dir.path().join("state/monitors");

    let store = PersistentStateStore::new(&nested).await.unwrap();
    store.store("g", "c", &sample_state()).await.unwrap();
    assert!(nested.join("g_c.yml").is_file());
}
