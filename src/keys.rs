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

// Composite record keys shared by the producer, streams, and monitors

use serde::{Deserialize, Serialize};

/// Identity of one observed source: a device or app install that belongs
/// to a user inside a project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservationKey {
    pub project_id: String,
    pub user_id: String,
    pub source_id: String,
}

impl ObservationKey {
    pub fn new(
        project_id: impl Into<String>,
        user_id: impl Into<String>,
        source_id: impl Into<String>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            user_id: user_id.into(),
            source_id: source_id.into(),
        }
    }

    /// Canonical string form, used as a map key by monitors and state
    /// snapshots.
    pub fn fingerprint(&self) -> String {
        format!("{}/{}/{}", self.project_id, self.user_id, self.source_id)
    }
}

/// Key of one windowed aggregate: the observed source plus the half-open
/// `[window_start, window_end)` interval in epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateKey {
    pub project_id: String,
    pub user_id: String,
    pub source_id: String,
    #[serde(rename = "start")]
    pub window_start: i64,
    #[serde(rename = "end")]
    pub window_end: i64,
}

impl AggregateKey {
    pub fn windowed(key: &ObservationKey, window_start: i64, window_end: i64) -> Self {
        Self {
            project_id: key.project_id.clone(),
            user_id: key.user_id.clone(),
            source_id: key.source_id.clone(),
            window_start,
            window_end,
        }
    }

    pub fn observation(&self) -> ObservationKey {
        ObservationKey::new(&self.project_id, &self.user_id, &self.source_id)
    }

    /// Widen the interval to cover `[start, end]` as well. Used by the
    /// source statistics monitor; the operation is commutative and
    /// associative, so merge order does not matter.
    pub fn merge_span(&mut self, start: i64, end: i64) {
        if start < self.window_start {
            self.window_start = start;
        }
        if end > self.window_end {
            self.window_end = end;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_format() {
        let key = ObservationKey::new("radar-test", "user-1", "source-a");
        assert_eq!(key.fingerprint(), "radar-test/user-1/source-a");
    }

    #[test]
    fn test_merge_span_widens_only() {
        let obs = ObservationKey::new("p", "u", "s");
        let mut agg = AggregateKey::windowed(&obs, 1000, 2000);
        agg.merge_span(1500, 1800);
        assert_eq!((agg.window_start, agg.window_end), (1000, 2000));
        agg.merge_span(500, 2500);
        assert_eq!((agg.window_start, agg.window_end), (500, 2500));
    }

    #[test]
    fn test_merge_span_commutative() {
        let obs = ObservationKey::new("p", "u", "s");
        let mut a = AggregateKey::windowed(&obs, 100, 200);
        a.merge_span(50, 120);
        a.merge_span(180, 400);

        let mut b = AggregateKey::windowed(&obs, 100, 200);
        b.merge_span(180, 400);
        b.merge_span(50, 120);

        assert_eq!(a, b);
    }

    #[test]
    fn test_camel_case_wire_names() {
        let key = ObservationKey::new("p", "u", "s");
        let json = serde_json::to_value(&key).unwrap();
        assert!(json.get("projectId").is_some());
        assert!(json.get("userId").is_some());
        assert!(json.get("sourceId").is_some());

        let agg = AggregateKey::windowed(&key, 0, 10);
        let json = serde_json::to_value(&agg).unwrap();
        assert_eq!(json.get("start").unwrap().as_i64(), Some(0));
        assert_eq!(json.get("end").unwrap().as_i64(), Some(10));
    }
}
