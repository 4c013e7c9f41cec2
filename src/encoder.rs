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

// Schema-directed JSON encoding for the gateway wire format
//
// Record fields are emitted in schema declaration order so the encoded
// text is deterministic. Union values use the Avro JSON branch wrapping
// ({"string": "x"}) that the gateway's Avro decoder expects.

use crate::error::PipelineError;
use crate::schema::{SchemaMetadata, SchemaType};
use serde_json::Value;
use std::fmt::Write as _;
use std::sync::Arc;

/// Factory for schema-directed writers. The factory is stateless and
/// thread-safe; each [`JsonWriter`] it returns is single-threaded and
/// reuses an internal buffer across `encode` calls.
pub struct RecordEncoder;

impl RecordEncoder {
    pub fn writer(schema: &Arc<SchemaMetadata>) -> JsonWriter {
        JsonWriter::new(Arc::clone(schema))
    }
}

/// Encodes values against one schema.
pub struct JsonWriter {
    schema: Arc<SchemaMetadata>,
    buf: String,
}

impl JsonWriter {
    pub fn new(schema: Arc<SchemaMetadata>) -> Self {
        Self {
            schema,
            buf: String::with_capacity(256),
        }
    }

    pub fn encode(&mut self, value: &Value) -> Result<String, PipelineError> {
        self.buf.clear();
        let mut path = String::new();
        write_value(&mut self.buf, &self.schema.schema, value, &mut path)?;
        Ok(self.buf.clone())
    }
}

/// Decode writer output back into the logical value. Union wrapping is
/// removed and primitives are validated against the schema.
pub fn decode(schema: &SchemaType, text: &str) -> Result<Value, PipelineError> {
    let parsed: Value = serde_json::from_str(text)
        .map_err(|e| PipelineError::encoding("", format!("invalid JSON: {}", e)))?;
    let mut path = String::new();
    decode_value(schema, &parsed, &mut path)
}

fn encoding_error(path: &str, message: impl Into<String>) -> PipelineError {
    let at = if path.is_empty() { "." } else { path };
    PipelineError::encoding(at, message)
}

fn push_segment(path: &mut String, segment: &str) -> usize {
    let mark = path.len();
    if !path.is_empty() {
        path.push('.');
    }
    path.push_str(segment);
    mark
}

fn push_index(path: &mut String, index: usize) -> usize {
    let mark = path.len();
    let _ = write!(path, "[{}]", index);
    mark
}

fn write_value(
    out: &mut String,
    schema: &SchemaType,
    value: &Value,
    path: &mut String,
) -> Result<(), PipelineError> {
    match schema {
        SchemaType::Null => match value {
            Value::Null => {
                out.push_str("null");
                Ok(())
            }
            other => Err(encoding_error(path, format!("expected null, got {}", other))),
        },
        SchemaType::Boolean => match value.as_bool() {
            Some(b) => {
                out.push_str(if b { "true" } else { "false" });
                Ok(())
            }
            None => Err(encoding_error(path, "expected boolean")),
        },
        SchemaType::Int => {
            let n = value
                .as_i64()
                .filter(|n| i32::try_from(*n).is_ok())
                .ok_or_else(|| encoding_error(path, "expected 32-bit integer"))?;
            let _ = write!(out, "{}", n);
            Ok(())
        }
        SchemaType::Long => {
            let n = value
                .as_i64()
                .ok_or_else(|| encoding_error(path, "expected integer"))?;
            let _ = write!(out, "{}", n);
            Ok(())
        }
        SchemaType::Float | SchemaType::Double => {
            let n = value
                .as_f64()
                .ok_or_else(|| encoding_error(path, "expected number"))?;
            if !n.is_finite() {
                return Err(encoding_error(path, "non-finite number"));
            }
            if n == n.trunc() && n.abs() < 1e15 {
                // Keep a trailing ".0" so the value stays a double on re-read.
                let _ = write!(out, "{:.1}", n);
            } else {
                let _ = write!(out, "{}", n);
            }
            Ok(())
        }
        SchemaType::Bytes | SchemaType::String => match value.as_str() {
            Some(s) => {
                write_string(out, s);
                Ok(())
            }
            None => Err(encoding_error(path, "expected string")),
        },
        SchemaType::Enum { name, symbols } => match value.as_str() {
            Some(s) if symbols.iter().any(|sym| sym == s) => {
                write_string(out, s);
                Ok(())
            }
            Some(s) => Err(encoding_error(
                path,
                format!("'{}' is not a symbol of enum {}", s, name),
            )),
            None => Err(encoding_error(path, "expected enum symbol")),
        },
        SchemaType::Array(items) => {
            let elements = value
                .as_array()
                .ok_or_else(|| encoding_error(path, "expected array"))?;
            out.push('[');
            for (i, element) in elements.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                let mark = push_index(path, i);
                write_value(out, items, element, path)?;
                path.truncate(mark);
            }
            out.push(']');
            Ok(())
        }
        SchemaType::Map(values) => {
            let entries = value
                .as_object()
                .ok_or_else(|| encoding_error(path, "expected object"))?;
            out.push('{');
            for (i, (key, entry)) in entries.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(out, key);
                out.push(':');
                let mark = push_segment(path, key);
                write_value(out, values, entry, path)?;
                path.truncate(mark);
            }
            out.push('}');
            Ok(())
        }
        SchemaType::Union(branches) => {
            if value.is_null() {
                if branches.iter().any(|b| matches!(b, SchemaType::Null)) {
                    out.push_str("null");
                    return Ok(());
                }
                return Err(encoding_error(path, "union has no null branch"));
            }
            let branch = branches
                .iter()
                .find(|b| !matches!(b, SchemaType::Null) && accepts(b, value))
                .ok_or_else(|| encoding_error(path, "value matches no union branch"))?;
            out.push('{');
            write_string(out, branch.branch_name());
            out.push(':');
            write_value(out, branch, value, path)?;
            out.push('}');
            Ok(())
        }
        SchemaType::Record(record) => {
            let fields = value
                .as_object()
                .ok_or_else(|| encoding_error(path, "expected object"))?;
            out.push('{');
            for (i, field) in record.fields.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(out, &field.name);
                out.push(':');
                let mark = push_segment(path, &field.name);
                match fields.get(&field.name) {
                    Some(present) => write_value(out, &field.ty, present, path)?,
                    None => match &field.default {
                        Some(default) => write_value(out, &field.ty, default, path)?,
                        None => {
                            return Err(encoding_error(path, "missing field with no default"));
                        }
                    },
                }
                path.truncate(mark);
            }
            out.push('}');
            Ok(())
        }
    }
}

/// Shallow check that `value` can encode as `schema`; used to pick a
/// union branch.
fn accepts(schema: &SchemaType, value: &Value) -> bool {
    match schema {
        SchemaType::Null => value.is_null(),
        SchemaType::Boolean => value.is_boolean(),
        SchemaType::Int | SchemaType::Long => value.is_i64(),
        SchemaType::Float | SchemaType::Double => value.is_number(),
        SchemaType::Bytes | SchemaType::String => value.is_string(),
        SchemaType::Enum { symbols, .. } => value
            .as_str()
            .map(|s| symbols.iter().any(|sym| sym == s))
            .unwrap_or(false),
        SchemaType::Array(_) => value.is_array(),
        SchemaType::Map(_) | SchemaType::Record(_) => value.is_object(),
        SchemaType::Union(_) => false,
    }
}

fn write_string(out: &mut String, s: &str) {
    // serde_json handles the escaping rules.
    match serde_json::to_string(s) {
        Ok(quoted) => out.push_str(&quoted),
        Err(_) => out.push_str("\"\""),
    }
}

fn decode_value(
    schema: &SchemaType,
    value: &Value,
    path: &mut String,
) -> Result<Value, PipelineError> {
    match schema {
        SchemaType::Null
        | SchemaType::Boolean
        | SchemaType::Int
        | SchemaType::Long
        | SchemaType::Float
        | SchemaType::Double
        | SchemaType::Bytes
        | SchemaType::String
        | SchemaType::Enum { .. } => {
            if accepts(schema, value) || (value.is_null() && matches!(schema, SchemaType::Null)) {
                Ok(value.clone())
            } else {
                Err(encoding_error(
                    path,
                    format!("value does not match {}", schema.branch_name()),
                ))
            }
        }
        SchemaType::Array(items) => {
            let elements = value
                .as_array()
                .ok_or_else(|| encoding_error(path, "expected array"))?;
            let mut decoded = Vec::with_capacity(elements.len());
            for (i, element) in elements.iter().enumerate() {
                let mark = push_index(path, i);
                decoded.push(decode_value(items, element, path)?);
                path.truncate(mark);
            }
            Ok(Value::Array(decoded))
        }
        SchemaType::Map(values) => {
            let entries = value
                .as_object()
                .ok_or_else(|| encoding_error(path, "expected object"))?;
            let mut decoded = serde_json::Map::new();
            for (key, entry) in entries {
                let mark = push_segment(path, key);
                decoded.insert(key.clone(), decode_value(values, entry, path)?);
                path.truncate(mark);
            }
            Ok(Value::Object(decoded))
        }
        SchemaType::Union(branches) => {
            if value.is_null() {
                return Ok(Value::Null);
            }
            let wrapper = value
                .as_object()
                .filter(|obj| obj.len() == 1)
                .ok_or_else(|| encoding_error(path, "expected union wrapper object"))?;
            let (branch_name, inner) = wrapper
                .iter()
                .next()
                .ok_or_else(|| encoding_error(path, "empty union wrapper"))?;
            let branch = branches
                .iter()
                .find(|b| b.branch_name() == branch_name)
                .ok_or_else(|| {
                    encoding_error(path, format!("unknown union branch '{}'", branch_name))
                })?;
            decode_value(branch, inner, path)
        }
        SchemaType::Record(record) => {
            let fields = value
                .as_object()
                .ok_or_else(|| encoding_error(path, "expected object"))?;
            let mut decoded = serde_json::Map::new();
            for field in &record.fields {
                let mark = push_segment(path, &field.name);
                let encoded = fields
                    .get(&field.name)
                    .ok_or_else(|| encoding_error(path, "missing field"))?;
                decoded.insert(field.name.clone(), decode_value(&field.ty, encoded, path)?);
                path.truncate(mark);
            }
            Ok(Value::Object(decoded))
        }
    }
}
