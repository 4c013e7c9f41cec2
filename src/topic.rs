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

// Topics, records, and batches flowing through the producer

use crate::error::SchemaError;
use crate::schema::{SchemaCache, SchemaMetadata, SchemaRole};
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;

/// One record heading for a topic. The offset is producer-assigned and
/// monotonically nondecreasing per topic; it never round-trips to the
/// gateway.
#[derive(Debug, Clone)]
pub struct Record {
    pub offset: i64,
    pub key: Value,
    pub value: Value,
}

impl Record {
    pub fn new(offset: i64, key: Value, value: Value) -> Self {
        Self { offset, key, value }
    }
}

/// A topic paired with its resolved key and value schemas. Built once per
/// topic on first use and shared from then on.
#[derive(Debug)]
pub struct TopicBinding {
    pub name: String,
    pub key_schema: Arc<SchemaMetadata>,
    pub value_schema: Arc<SchemaMetadata>,
}

impl TopicBinding {
    pub async fn resolve(name: &str, schemas: &SchemaCache) -> Result<Arc<Self>, SchemaError> {
        let key_schema = schemas.resolve(name, SchemaRole::Key).await?;
        let value_schema = schemas.resolve(name, SchemaRole::Value).await?;
        Ok(Arc::new(Self {
            name: name.to_string(),
            key_schema,
            value_schema,
        }))
    }
}

/// Records for one topic, submitted to the gateway atomically.
/// Insertion order is preserved end to end.
#[derive(Debug, Clone)]
pub struct RecordBatch {
    pub topic: Arc<TopicBinding>,
    pub records: Vec<Record>,
}

impl RecordBatch {
    pub fn new(topic: Arc<TopicBinding>, records: Vec<Record>) -> Self {
        Self { topic, records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Highest producer offset in the batch. Offsets are nondecreasing,
    /// so this is the last record's.
    pub fn last_offset(&self) -> Option<i64> {
        self.records.last().map(|r| r.offset)
    }
}

/// Process-wide map of topic bindings, resolved lazily through the schema
/// cache.
pub struct TopicCatalog {
    schemas: Arc<SchemaCache>,
    bindings: DashMap<String, Arc<TopicBinding>>,
}

impl TopicCatalog {
    pub fn new(schemas: Arc<SchemaCache>) -> Self {
        Self {
            schemas,
            bindings: DashMap::new(),
        }
    }

    pub async fn binding(&self, name: &str) -> Result<Arc<TopicBinding>, SchemaError> {
        if let Some(binding) = self.bindings.get(name) {
            return Ok(binding.clone());
        }
        let resolved = TopicBinding::resolve(name, &self.schemas).await?;
        // Two concurrent resolutions race harmlessly; keep the first.
        let kept = self
            .bindings
            .entry(name.to_string())
            .or_insert(resolved)
            .clone();
        Ok(kept)
    }
}
