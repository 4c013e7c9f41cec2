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

// Error taxonomy for the producer pipeline

use thiserror::Error;

/// Failures of schema resolution, split by recovery strategy: `NotFound`
/// and `Parse` are permanent for a given bundle/registry content, while
/// `Transport` is transient and worth retrying after the negative-cache
/// interval.
#[derive(Debug, Clone, Error)]
pub enum SchemaError {
    #[error("schema subject '{0}' not found")]
    NotFound(String),

    #[error("schema lookup for '{subject}' failed: {message}")]
    Transport { subject: String, message: String },

    #[error("schema '{subject}' is malformed: {message}")]
    Parse { subject: String, message: String },
}

/// Errors surfaced by the pipeline components.
///
/// Encoding and schema errors reach the caller of `send` synchronously.
/// Transport errors are retried by the worker and otherwise observed
/// indirectly through `is_connected`/`reset_connection`.
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    #[error("encoding failed at '{path}': {message}")]
    Encoding { path: String, message: String },

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("gateway transport error: {0}")]
    Transport(String),

    #[error("sender is not connected")]
    NotConnected,

    #[error("operation cancelled: {0}")]
    Cancelled(String),

    #[error("state store error: {0}")]
    State(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl PipelineError {
    pub fn encoding(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Encoding {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// True for failures that the threaded worker may retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::NotConnected)
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
