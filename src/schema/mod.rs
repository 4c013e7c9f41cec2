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

// Schema resolution module
//
// Provides:
// - Avro `.avsc` parsing into an in-crate descriptor tree
// - A resolver trait with local-bundle and registry implementations
// - A per-process cache with shared-flight deduplication

pub mod local;
pub mod registry;

pub use local::LocalSchemaResolver;
pub use registry::RegistrySchemaResolver;

use crate::error::SchemaError;
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

/// How long a failed lookup suppresses new attempts for the same subject.
pub const NEGATIVE_CACHE_TTL: Duration = Duration::from_secs(10);

/// Which side of a record a schema describes. Subjects follow registry
/// naming: `{topic}-key` / `{topic}-value`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaRole {
    Key,
    Value,
}

impl SchemaRole {
    pub fn subject(&self, topic: &str) -> String {
        match self {
            SchemaRole::Key => format!("{}-key", topic),
            SchemaRole::Value => format!("{}-value", topic),
        }
    }
}

/// Parsed schema tree. Only the constructs used by the wearable schemas
/// are supported; anything else is a parse error.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaType {
    Null,
    Boolean,
    Int,
    Long,
    Float,
    Double,
    Bytes,
    String,
    Enum { name: String, symbols: Vec<String> },
    Array(Box<SchemaType>),
    Map(Box<SchemaType>),
    Union(Vec<SchemaType>),
    Record(Arc<RecordSchema>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordSchema {
    pub name: String,
    pub fields: Vec<SchemaField>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SchemaField {
    pub name: String,
    pub ty: SchemaType,
    pub default: Option<Value>,
}

impl SchemaType {
    /// Branch name used by the Avro JSON encoding of unions.
    pub fn branch_name(&self) -> &str {
        match self {
            SchemaType::Null => "null",
            SchemaType::Boolean => "boolean",
            SchemaType::Int => "int",
            SchemaType::Long => "long",
            SchemaType::Float => "float",
            SchemaType::Double => "double",
            SchemaType::Bytes => "bytes",
            SchemaType::String => "string",
            SchemaType::Enum { name, .. } => name,
            SchemaType::Array(_) => "array",
            SchemaType::Map(_) => "map",
            SchemaType::Union(_) => "union",
            SchemaType::Record(record) => &record.name,
        }
    }
}

/// One resolved schema: registry id/version when the registry assigned
/// them, the parsed tree, and the raw text for inline submission.
#[derive(Debug, Clone)]
pub struct SchemaMetadata {
    pub id: Option<i32>,
    pub version: Option<i32>,
    pub schema: SchemaType,
    pub raw: String,
}

impl SchemaMetadata {
    pub fn parsed(subject: &str, raw: String) -> Result<Self, SchemaError> {
        let schema = parse_schema(subject, &raw)?;
        Ok(Self {
            id: None,
            version: None,
            schema,
            raw,
        })
    }
}

/// Source of schema metadata: a local bundle directory or a remote
/// registry. Implementations are stateless; caching lives in
/// [`SchemaCache`].
#[async_trait]
pub trait SchemaResolver: Send + Sync {
    async fn fetch(&self, topic: &str, role: SchemaRole) -> Result<SchemaMetadata, SchemaError>;
}

/// Per-process schema cache.
///
/// Successful resolutions are cached for the process lifetime and repeat
/// calls return the same `Arc`. At most one lookup per `(topic, role)` is
/// in flight; concurrent callers wait on the same gate and then hit the
/// cache. Failures are cached for [`NEGATIVE_CACHE_TTL`].
pub struct SchemaCache {
    resolver: Arc<dyn SchemaResolver>,
    entries: DashMap<(String, SchemaRole), Arc<SchemaMetadata>>,
    gates: DashMap<(String, SchemaRole), Arc<Mutex<()>>>,
    failures: DashMap<(String, SchemaRole), (Instant, SchemaError)>,
    negative_ttl: Duration,
}

impl SchemaCache {
    pub fn new(resolver: Arc<dyn SchemaResolver>) -> Self {
        Self::with_negative_ttl(resolver, NEGATIVE_CACHE_TTL)
    }

    pub fn with_negative_ttl(resolver: Arc<dyn SchemaResolver>, negative_ttl: Duration) -> Self {
        Self {
            resolver,
            entries: DashMap::new(),
            gates: DashMap::new(),
            failures: DashMap::new(),
            negative_ttl,
        }
    }

    pub async fn resolve(
        &self,
        topic: &str,
        role: SchemaRole,
    ) -> Result<Arc<SchemaMetadata>, SchemaError> {
        let key = (topic.to_string(), role);

        if let Some(hit) = self.entries.get(&key) {
            return Ok(hit.clone());
        }

        let gate = self.gates.entry(key.clone()).or_default().clone();
        let _guard = gate.lock().await;

        // A concurrent caller may have resolved while we waited.
        if let Some(hit) = self.entries.get(&key) {
            return Ok(hit.clone());
        }

        if let Some(failure) = self.failures.get(&key) {
            let (at, err) = failure.value();
            if at.elapsed() < self.negative_ttl {
                return Err(err.clone());
            }
        }

        match self.resolver.fetch(topic, role).await {
            Ok(metadata) => {
                debug!(
                    "Resolved schema for subject '{}' (id: {:?}, version: {:?})",
                    role.subject(topic),
                    metadata.id,
                    metadata.version
                );
                let metadata = Arc::new(metadata);
                self.entries.insert(key.clone(), metadata.clone());
                self.failures.remove(&key);
                Ok(metadata)
            }
            Err(err) => {
                warn!(
                    "Schema lookup for subject '{}' failed: {}",
                    role.subject(topic),
                    err
                );
                self.failures.insert(key, (Instant::now(), err.clone()));
                Err(err)
            }
        }
    }
}

/// Parse Avro `.avsc` text into a [`SchemaType`].
pub fn parse_schema(subject: &str, raw: &str) -> Result<SchemaType, SchemaError> {
    let json: Value = serde_json::from_str(raw).map_err(|e| SchemaError::Parse {
        subject: subject.to_string(),
        message: e.to_string(),
    })?;
    let mut names = HashMap::new();
    parse_type(subject, &json, &mut names)
}

fn parse_error(subject: &str, message: impl Into<String>) -> SchemaError {
    SchemaError::Parse {
        subject: subject.to_string(),
        message: message.into(),
    }
}

fn parse_type(
    subject: &str,
    json: &Value,
    names: &mut HashMap<String, SchemaType>,
) -> Result<SchemaType, SchemaError> {
    match json {
        Value::String(name) => parse_name(subject, name, names),
        Value::Array(branches) => {
            let mut parsed = Vec::with_capacity(branches.len());
            for branch in branches {
                let ty = parse_type(subject, branch, names)?;
                if matches!(ty, SchemaType::Union(_)) {
                    return Err(parse_error(subject, "nested unions are not allowed"));
                }
                parsed.push(ty);
            }
            if parsed.is_empty() {
                return Err(parse_error(subject, "empty union"));
            }
            Ok(SchemaType::Union(parsed))
        }
        Value::Object(fields) => {
            let ty = fields
                .get("type")
                .and_then(Value::as_str)
                .ok_or_else(|| parse_error(subject, "missing 'type'"))?;
            match ty {
                "record" => parse_record(subject, fields, names),
                "enum" => parse_enum(subject, fields, names),
                "array" => {
                    let items = fields
                        .get("items")
                        .ok_or_else(|| parse_error(subject, "array without 'items'"))?;
                    Ok(SchemaType::Array(Box::new(parse_type(
                        subject, items, names,
                    )?)))
                }
                "map" => {
                    let values = fields
                        .get("values")
                        .ok_or_else(|| parse_error(subject, "map without 'values'"))?;
                    Ok(SchemaType::Map(Box::new(parse_type(
                        subject, values, names,
                    )?)))
                }
                other => parse_name(subject, other, names),
            }
        }
        _ => Err(parse_error(subject, "expected string, array, or object")),
    }
}

fn parse_name(
    subject: &str,
    name: &str,
    names: &HashMap<String, SchemaType>,
) -> Result<SchemaType, SchemaError> {
    match name {
        "null" => Ok(SchemaType::Null),
        "boolean" => Ok(SchemaType::Boolean),
        "int" => Ok(SchemaType::Int),
        "long" => Ok(SchemaType::Long),
        "float" => Ok(SchemaType::Float),
        "double" => Ok(SchemaType::Double),
        "bytes" => Ok(SchemaType::Bytes),
        "string" => Ok(SchemaType::String),
        other => names
            .get(other)
            .cloned()
            .ok_or_else(|| parse_error(subject, format!("unknown type '{}'", other))),
    }
}

fn parse_record(
    subject: &str,
    fields: &serde_json::Map<String, Value>,
    names: &mut HashMap<String, SchemaType>,
) -> Result<SchemaType, SchemaError> {
    let name = fields
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| parse_error(subject, "record without 'name'"))?
        .to_string();
    let namespace = fields.get("namespace").and_then(Value::as_str);

    let declared = fields
        .get("fields")
        .and_then(Value::as_array)
        .ok_or_else(|| parse_error(subject, "record without 'fields'"))?;

    let mut parsed_fields = Vec::with_capacity(declared.len());
    for field in declared {
        let field_name = field
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| parse_error(subject, "field without 'name'"))?
            .to_string();
        let field_type = field
            .get("type")
            .ok_or_else(|| parse_error(subject, format!("field '{}' without type", field_name)))?;
        parsed_fields.push(SchemaField {
            name: field_name,
            ty: parse_type(subject, field_type, names)?,
            default: field.get("default").cloned(),
        });
    }

    let record = SchemaType::Record(Arc::new(RecordSchema {
        name: name.clone(),
        fields: parsed_fields,
    }));
    if let Some(ns) = namespace {
        names.insert(format!("{}.{}", ns, name), record.clone());
    }
    names.insert(name, record.clone());
    Ok(record)
}

fn parse_enum(
    subject: &str,
    fields: &serde_json::Map<String, Value>,
    names: &mut HashMap<String, SchemaType>,
) -> Result<SchemaType, SchemaError> {
    let name = fields
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| parse_error(subject, "enum without 'name'"))?
        .to_string();
    let namespace = fields.get("namespace").and_then(Value::as_str);
    let symbols = fields
        .get("symbols")
        .and_then(Value::as_array)
        .ok_or_else(|| parse_error(subject, "enum without 'symbols'"))?
        .iter()
        .map(|s| {
            s.as_str()
                .map(str::to_string)
                .ok_or_else(|| parse_error(subject, "enum symbol must be a string"))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let parsed = SchemaType::Enum {
        name: name.clone(),
        symbols,
    };
    if let Some(ns) = namespace {
        names.insert(format!("{}.{}", ns, name), parsed.clone());
    }
    names.insert(name, parsed.clone());
    Ok(parsed)
}
