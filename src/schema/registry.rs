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

// Remote schema registry resolver

use super::{parse_schema, SchemaMetadata, SchemaResolver, SchemaRole};
use crate::error::SchemaError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
struct SubjectVersion {
    id: i32,
    version: i32,
    schema: String,
}

#[derive(Debug, Serialize)]
struct RegisterRequest<'a> {
    schema: &'a str,
}

#[derive(Debug, Deserialize)]
struct RegisterResponse {
    id: i32,
}

/// Client for a Confluent-style schema registry.
pub struct RegistrySchemaResolver {
    client: Client,
    base_url: String,
}

impl RegistrySchemaResolver {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, SchemaError> {
        let client = reqwest::ClientBuilder::new()
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .timeout(timeout)
            .build()
            .map_err(|e| SchemaError::Transport {
                subject: String::new(),
                message: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn transport(subject: &str, message: impl Into<String>) -> SchemaError {
        SchemaError::Transport {
            subject: subject.to_string(),
            message: message.into(),
        }
    }

    /// Register a schema under the subject for `(topic, role)` and return
    /// the id the registry assigned.
    pub async fn register(
        &self,
        topic: &str,
        role: SchemaRole,
        raw_schema: &str,
    ) -> Result<i32, SchemaError> {
        let subject = role.subject(topic);
        let url = format!("{}/subjects/{}/versions", self.base_url, subject);

        let response = self
            .client
            .post(&url)
            .json(&RegisterRequest { schema: raw_schema })
            .send()
            .await
            .map_err(|e| Self::transport(&subject, e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Self::transport(
                &subject,
                format!("registration failed with status {}: {}", status, body),
            ));
        }

        let registered: RegisterResponse = response
            .json()
            .await
            .map_err(|e| Self::transport(&subject, e.to_string()))?;
        info!(
            "Registered schema for subject '{}' as id {}",
            subject, registered.id
        );
        Ok(registered.id)
    }
}

#[async_trait]
impl SchemaResolver for RegistrySchemaResolver {
    async fn fetch(&self, topic: &str, role: SchemaRole) -> Result<SchemaMetadata, SchemaError> {
        let subject = role.subject(topic);
        let url = format!("{}/subjects/{}/versions/latest", self.base_url, subject);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Self::transport(&subject, e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(SchemaError::NotFound(subject));
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Self::transport(
                &subject,
                format!("lookup failed with status {}: {}", status, body),
            ));
        }

        let latest: SubjectVersion = response
            .json()
            .await
            .map_err(|e| Self::transport(&subject, e.to_string()))?;
        debug!(
            "Registry returned subject '{}' id {} version {}",
            subject, latest.id, latest.version
        );

        Ok(SchemaMetadata {
            id: Some(latest.id),
            version: Some(latest.version),
            schema: parse_schema(&subject, &latest.schema)?,
            raw: latest.schema,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolver_construction() {
        let resolver =
            RegistrySchemaResolver::new("http://localhost:8081/", Duration::from_secs(5));
        assert!(resolver.is_ok());
        assert_eq!(resolver.unwrap().base_url, "http://localhost:8081");
    }

    #[test]
    fn test_subject_version_parsing() {
        let body = r#"{"id": 41, "version": 2, "schema": "\"string\""}"#;
        let parsed: SubjectVersion = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.id, 41);
        assert_eq!(parsed.version, 2);
        assert_eq!(parsed.schema, "\"string\"");
    }
}
