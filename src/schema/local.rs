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

// Local schema bundle resolver

use super::{SchemaMetadata, SchemaResolver, SchemaRole};
use crate::error::SchemaError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Resolves schemas from a directory of `.avsc` files.
///
/// Files are named by subject (`{topic}-key.avsc`, `{topic}-value.avsc`);
/// the value role also accepts a bare `{topic}.avsc`. Bundled schemas carry
/// no registry id or version, so the REST sender submits them inline.
pub struct LocalSchemaResolver {
    dir: PathBuf,
}

impl LocalSchemaResolver {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn candidates(&self, topic: &str, role: SchemaRole) -> Vec<PathBuf> {
        let mut paths = vec![self.dir.join(format!("{}.avsc", role.subject(topic)))];
        if role == SchemaRole::Value {
            paths.push(self.dir.join(format!("{}.avsc", topic)));
        }
        paths
    }

    async fn read_schema(&self, subject: &str, path: &Path) -> Result<SchemaMetadata, SchemaError> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| SchemaError::Transport {
                subject: subject.to_string(),
                message: format!("failed to read {}: {}", path.display(), e),
            })?;
        debug!("Loaded schema '{}' from {}", subject, path.display());
        SchemaMetadata::parsed(subject, raw)
    }
}

#[async_trait]
impl SchemaResolver for LocalSchemaResolver {
    async fn fetch(&self, topic: &str, role: SchemaRole) -> Result<SchemaMetadata, SchemaError> {
        let subject = role.subject(topic);
        for path in self.candidates(topic, role) {
            if path.is_file() {
                return self.read_schema(&subject, &path).await;
            }
        }
        Err(SchemaError::NotFound(subject))
    }
}
