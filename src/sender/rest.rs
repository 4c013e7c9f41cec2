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

// REST gateway sender

use super::Sender;
use crate::config::GatewayConfig;
use crate::encoder::RecordEncoder;
use crate::error::PipelineError;
use crate::topic::RecordBatch;
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use std::time::Duration;
use tracing::{debug, warn};

const KAFKA_AVRO_JSON: &str = "application/vnd.kafka.avro.v2+json";
const KAFKA_JSON: &str = "application/vnd.kafka.v2+json";

#[derive(Serialize)]
struct GatewayRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    key_schema_id: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    key_schema: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    value_schema_id: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    value_schema: Option<&'a str>,
    records: Vec<GatewayRecord>,
}

#[derive(Serialize)]
struct GatewayRecord {
    key: Box<RawValue>,
    value: Box<RawValue>,
}

#[derive(Debug, Deserialize)]
struct PublishResponse {
    offsets: Vec<PublishAck>,
}

#[derive(Debug, Default, Deserialize)]
struct PublishAck {
    #[serde(default)]
    error_code: Option<i32>,
    #[serde(default)]
    error: Option<String>,
}

/// Build the gateway request body for one batch.
///
/// Schema ids are preferred when the resolver assigned them; otherwise the
/// raw schema text goes inline. Records keep their submission order, each
/// encoded in schema declaration order.
pub fn gateway_request_body(batch: &RecordBatch) -> Result<Bytes, PipelineError> {
    let topic = &batch.topic;
    let mut key_writer = RecordEncoder::writer(&topic.key_schema);
    let mut value_writer = RecordEncoder::writer(&topic.value_schema);

    let mut records = Vec::with_capacity(batch.records.len());
    for record in &batch.records {
        let key = RawValue::from_string(key_writer.encode(&record.key)?)
            .map_err(|e| PipelineError::encoding("key", e.to_string()))?;
        let value = RawValue::from_string(value_writer.encode(&record.value)?)
            .map_err(|e| PipelineError::encoding("value", e.to_string()))?;
        records.push(GatewayRecord { key, value });
    }

    let request = GatewayRequest {
        key_schema_id: topic.key_schema.id,
        key_schema: topic
            .key_schema
            .id
            .is_none()
            .then_some(topic.key_schema.raw.as_str()),
        value_schema_id: topic.value_schema.id,
        value_schema: topic
            .value_schema
            .id
            .is_none()
            .then_some(topic.value_schema.raw.as_str()),
        records,
    };

    let body = serde_json::to_vec(&request)
        .map_err(|e| PipelineError::encoding("", format!("request serialization: {}", e)))?;
    Ok(Bytes::from(body))
}

/// Stateless gateway submitter: one POST per batch, plus per-topic
/// last-offset bookkeeping.
pub struct RestSender {
    client: Client,
    base_url: String,
    last_offsets: DashMap<String, i64>,
}

impl RestSender {
    pub fn new(config: GatewayConfig) -> Result<Self, PipelineError> {
        let client = reqwest::ClientBuilder::new()
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| PipelineError::transport(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            last_offsets: DashMap::new(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Sender for RestSender {
    async fn send(&self, batch: RecordBatch) -> Result<(), PipelineError> {
        if batch.is_empty() {
            return Ok(());
        }

        let body = gateway_request_body(&batch)?;
        let url = format!("{}/topics/{}", self.base_url, batch.topic.name);

        let response = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, KAFKA_AVRO_JSON)
            .header(reqwest::header::ACCEPT, KAFKA_JSON)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(PipelineError::transport(format!(
                "gateway returned {} for topic '{}': {}",
                status, batch.topic.name, text
            )));
        }

        let acks: PublishResponse = serde_json::from_str(&text).map_err(|_| {
            PipelineError::transport(format!("unexpected gateway response: {}", text))
        })?;

        // Any per-record error fails the whole batch.
        let failed = acks
            .offsets
            .iter()
            .filter(|ack| ack.error_code.is_some())
            .count();
        if failed > 0 {
            let first = acks
                .offsets
                .iter()
                .find_map(|ack| ack.error.as_deref())
                .unwrap_or("unknown error");
            return Err(PipelineError::transport(format!(
                "gateway rejected {}/{} records for topic '{}' ({}): {}",
                failed,
                batch.len(),
                batch.topic.name,
                first,
                text
            )));
        }

        if let Some(last) = batch.last_offset() {
            self.last_offsets
                .entry(batch.topic.name.clone())
                .and_modify(|prev| *prev = (*prev).max(last))
                .or_insert(last);
        }
        debug!(
            "Posted {} records to topic '{}'",
            batch.len(),
            batch.topic.name
        );
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        let url = format!("{}/", self.base_url);
        match self.client.get(&url).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                warn!("Gateway probe failed with status: {}", response.status());
                false
            }
            Err(e) => {
                warn!("Gateway probe error: {}", e);
                false
            }
        }
    }

    async fn flush(&self) -> Result<(), PipelineError> {
        // Nothing is buffered here.
        Ok(())
    }

    async fn close(&self) -> Result<(), PipelineError> {
        Ok(())
    }

    fn last_offset(&self, topic: &str) -> i64 {
        self.last_offsets.get(topic).map(|v| *v).unwrap_or(-1)
    }
}
