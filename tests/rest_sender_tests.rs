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

use serde_json::{json, Value};
use std::sync::Arc;

use vitalflow::config::GatewayConfig;
use vitalflow::error::PipelineError;
use vitalflow::schema::SchemaMetadata;
use vitalflow::sender::rest::gateway_request_body;
use vitalflow::sender::{RestSender, Sender};
use vitalflow::topic::{Record, RecordBatch, TopicBinding};

const KEY_SCHEMA: &str = r#"{
    "type": "record", "name": "ObservationKey", "namespace": "org.radarcns.kafka",
    "fields": [
        {"name": "projectId", "type": ["null", "string"], "default": null},
        {"name": "userId", "type": "string"},
        {"name": "sourceId", "type": "string"}
    ]
}"#;

const VALUE_SCHEMA: &str = r#"{
    "type": "record", "name": "Temperature", "namespace": "org.radarcns.passive.empatica",
    "fields": [
        {"name": "time", "type": "double"},
        {"name": "temperature", "type": "float"}
    ]
}"#;

fn binding(key_id: Option<i32>, value_id: Option<i32>) -> Arc<TopicBinding> {
    let mut key_schema =
        SchemaMetadata::parsed("test-key", KEY_SCHEMA.to_string()).unwrap();
    key_schema.id = key_id;
    let mut value_schema =
        SchemaMetadata::parsed("test-value", VALUE_SCHEMA.to_string()).unwrap();
    value_schema.id = value_id;
    Arc::new(TopicBinding {
        name: "android_empatica_e4_temperature".to_string(),
        key_schema: Arc::new(key_schema),
        value_schema: Arc::new(value_schema),
    })
}

fn record(offset: i64, user: &str, temperature: f64) -> Record {
    Record::new(
        offset,
        json!({"projectId": "radar-test", "userId": user, "sourceId": "e4"}),
        json!({"time": 100.25, "temperature": temperature}),
    )
}

#[test]
fn test_inline_schemas_when_registry_unassigned() {
    let batch = RecordBatch::new(binding(None, None), vec![record(0, "u1", 36.5), record(1, "u2", 36.8)]);
    let body = gateway_request_body(&batch).unwrap();
    let text = std::str::from_utf8(&body).unwrap();
    let parsed: Value = serde_json::from_str(text).unwrap();

    assert_eq!(parsed.get("key_schema").and_then(Value::as_str), Some(KEY_SCHEMA));
    assert_eq!(parsed.get("value_schema").and_then(Value::as_str), Some(VALUE_SCHEMA));
    assert!(parsed.get("key_schema_id").is_none());
    assert!(parsed.get("value_schema_id").is_none());
    assert_eq!(parsed["records"].as_array().map(Vec::len), Some(2));

    // Records are encoded in schema declaration order with union wrapping
    assert!(text.contains(
        r#""key":{"projectId":{"string":"radar-test"},"userId":"u1","sourceId":"e4"}"#
    ));
    assert!(text.contains(r#""value":{"time":100.25,"temperature":36.5}"#));
}

#[test]
fn test_schema_ids_replace_inline_text() {
    let batch = RecordBatch::new(binding(Some(12), Some(34)), vec![record(0, "u1", 36.5)]);
    let body = gateway_request_body(&batch).unwrap();
    let parsed: Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(parsed.get("key_schema_id").and_then(Value::as_i64), Some(12));
    assert_eq!(parsed.get("value_schema_id").and_then(Value::as_i64), Some(34));
    assert!(parsed.get("key_schema").is_none());
    assert!(parsed.get("value_schema").is_none());
}

#[test]
fn test_missing_optional_field_takes_schema_default() {
    let batch = RecordBatch::new(
        binding(None, None),
        vec![Record::new(
            0,
            json!({"userId": "u1", "sourceId": "e4"}),
            json!({"time": 7.0, "temperature": 36.5}),
        )],
    );
    let body = gateway_request_body(&batch).unwrap();
    let text = std::str::from_utf8(&body).unwrap();

    assert!(text.contains(r#""key":{"projectId":null,"userId":"u1","sourceId":"e4"}"#));
    // Whole doubles keep a decimal point on the wire
    assert!(text.contains(r#""time":7.0"#));
}

#[test]
fn test_missing_required_field_is_an_encoding_error() {
    let batch = RecordBatch::new(
        binding(None, None),
        vec![Record::new(
            0,
            json!({"projectId": "p", "userId": "u1", "sourceId": "e4"}),
            json!({"time": 7.0}),
        )],
    );
    let err = gateway_request_body(&batch).unwrap_err();
    match err {
        PipelineError::Encoding { path, .. } => assert!(path.contains("temperature")),
        other => panic!("expected encoding error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_base_url_trailing_slash_is_trimmed() {
    let sender = RestSender::new(GatewayConfig {
        url: "http://localhost:8090/".to_string(),
        timeout_seconds: 5,
    })
    .unwrap();
    assert_eq!(sender.base_url(), "http://localhost:8090");
    assert_eq!(sender.last_offset("android_empatica_e4_temperature"), -1);
}

#[tokio::test]
async fn test_empty_batch_is_a_no_op() {
    let sender = RestSender::new(GatewayConfig {
        url: "http://localhost:1".to_string(),
        timeout_seconds: 1,
    })
    .unwrap();
    // No request goes out for an empty batch, so an unreachable gateway is fine
    let batch = RecordBatch::new(binding(None, None), Vec::new());
    sender.send(batch).await.unwrap();
}
