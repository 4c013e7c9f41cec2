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

// Monitor state snapshots on disk

use crate::error::PipelineError;
use crate::keys::AggregateKey;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::warn;
use uuid::Uuid;

/// One YAML file per `(group, client)` pair under a base directory.
/// Writes go to a temporary sibling first and are renamed into place, so
/// a crash mid-write leaves the previous snapshot intact.
pub struct PersistentStateStore {
    base_dir: PathBuf,
}

impl PersistentStateStore {
    pub async fn new(base_dir: impl Into<PathBuf>) -> Result<Self, PipelineError> {
        let base_dir = base_dir.into();
        tokio::fs::create_dir_all(&base_dir).await.map_err(|e| {
            PipelineError::State(format!(
                "failed to create state directory {}: {}",
                base_dir.display(),
                e
            ))
        })?;
        Ok(Self { base_dir })
    }

    fn file_path(&self, group: &str, client: &str) -> PathBuf {
        self.base_dir
            .join(format!("{}_{}.yml", sanitize(group), sanitize(client)))
    }

    pub async fn store<T: Serialize>(
        &self,
        group: &str,
        client: &str,
        state: &T,
    ) -> Result<(), PipelineError> {
        let path = self.file_path(group, client);
        let text = serde_yaml::to_string(state)
            .map_err(|e| PipelineError::State(format!("failed to serialize state: {}", e)))?;

        let mut tmp = path.clone();
        tmp.set_extension("yml.tmp");
        tokio::fs::write(&tmp, text).await.map_err(|e| {
            PipelineError::State(format!("failed to write {}: {}", tmp.display(), e))
        })?;
        tokio::fs::rename(&tmp, &path).await.map_err(|e| {
            PipelineError::State(format!("failed to replace {}: {}", path.display(), e))
        })?;
        Ok(())
    }

    /// Load a snapshot, falling back to `default` when no snapshot exists.
    /// A snapshot that no longer parses is treated as absent, with a
    /// warning, rather than blocking startup.
    pub async fn retrieve<T: DeserializeOwned>(
        &self,
        group: &str,
        client: &str,
        default: T,
    ) -> Result<T, PipelineError> {
        let path = self.file_path(group, client);
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(default),
            Err(e) => {
                return Err(PipelineError::State(format!(
                    "failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };
        match serde_yaml::from_str(&text) {
            Ok(state) => Ok(state),
            Err(e) => {
                warn!(
                    "Discarding unreadable state snapshot {}: {}",
                    path.display(),
                    e
                );
                Ok(default)
            }
        }
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// A source that went silent: when it was last seen, when the latest
/// alert went out, and how many alerts were sent so far.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingReport {
    pub last_seen: i64,
    pub reported_at: i64,
    pub alert_count: u32,
}

/// Snapshot shared by the source-facing monitors, keyed by observation
/// fingerprint. Each monitor persists its own copy under its own client
/// id and touches only the fields it owns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceStatisticsState {
    /// Random identity assigned when the state is first created; survives
    /// restarts so republished statistics stay attributable.
    pub group_id: String,
    #[serde(default)]
    pub sources: BTreeMap<String, AggregateKey>,
    #[serde(default)]
    pub last_seen: BTreeMap<String, i64>,
    #[serde(default)]
    pub reported_missing: BTreeMap<String, MissingReport>,
    #[serde(default)]
    pub battery_levels: BTreeMap<String, f64>,
}

impl Default for SourceStatisticsState {
    fn default() -> Self {
        Self {
            group_id: Uuid::new_v4().to_string(),
            sources: BTreeMap::new(),
            last_seen: BTreeMap::new(),
            reported_missing: BTreeMap::new(),
            battery_levels: BTreeMap::new(),
        }
    }
}
