// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use infra_resolver::SecretError;

/// Errors raised while calling vendor APIs or normalizing their responses.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CollectionError {
    /// The vendor answered with one of the configured rate-limit status codes.
    #[error("rate limited: status {status}")]
    RateLimited { status: u16, body: String },

    /// Any other non-2xx answer.
    #[error("request failed with status {status}: {body}")]
    Status { status: u16, body: String },

    /// The request never produced a response.
    #[error("transport error: {0}")]
    Transport(String),

    /// The response did not have the expected shape.
    #[error("unexpected response: {0}")]
    Parse(String),

    #[error("giving up after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<CollectionError>,
    },

    #[error("failed to decrypt setting {setting_id}: {source}")]
    Credential {
        setting_id: String,
        #[source]
        source: SecretError,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl CollectionError {
    /// Whether another attempt of the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CollectionError::RateLimited { .. }
                | CollectionError::Status { .. }
                | CollectionError::Transport(_)
        )
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, CollectionError::RateLimited { .. })
    }

    /// Status code of the last response, when one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            CollectionError::RateLimited { status, .. } | CollectionError::Status { status, .. } => {
                Some(*status)
            }
            CollectionError::RetriesExhausted { source, .. } => source.status(),
            _ => None,
        }
    }

    pub(crate) fn parse(message: impl Into<String>) -> Self {
        CollectionError::Parse(message.into())
    }
}

impl From<serde_json::Error> for CollectionError {
    fn from(error: serde_json::Error) -> Self {
        CollectionError::Parse(error.to_string())
    }
}
