// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Error taxonomy of the shipping pipeline.
//!
//! - [`ConfigError`]: fatal, raised while building a backend; never retried.
//! - [`TransportError`]: a single push failed; trips the writer's breaker.
//! - [`TransformError`]: user transformer code failed; the payload is dropped.
//! - [`MetadataError`]: the host could not describe the run.

use crate::indexer::IndexerKind;

/// Errors raised while validating configuration or constructing a backend.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{indexer} indexer: {field} is required")]
    Required {
        indexer: IndexerKind,
        field: &'static str,
    },

    #[error("{indexer} indexer: invalid URI '{uri}': {reason}")]
    InvalidUri {
        indexer: IndexerKind,
        uri: String,
        reason: String,
    },

    #[error("{indexer} indexer: port must be greater than 0")]
    InvalidPort { indexer: IndexerKind },

    #[error("invalid trust material: {0}")]
    TrustMaterial(String),

    #[error("unable to build client: {0}")]
    Client(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("invalid value '{value}' for {name}")]
    Env { name: &'static str, value: String },
}

/// Errors raised by a single push to a backend.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("unable to connect to {endpoint}: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("HTTP error code: {status}, response: {body}")]
    Status { status: u16, body: String },

    #[error(transparent)]
    Amqp(#[from] lapin::Error),

    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("broker error: {0}")]
    Broker(String),
}

/// A user-supplied transformer failed while handling a payload.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct TransformError {
    pub message: String,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl TransformError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }
}

/// The host could not produce the metadata of a run.
#[derive(Debug, thiserror::Error)]
#[error("unable to read job metadata: {0}")]
pub struct MetadataError(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_display_names_indexer_and_field() {
        let error = ConfigError::Required {
            indexer: IndexerKind::Http,
            field: "index key",
        };
        assert_eq!(error.to_string(), "HTTP indexer: index key is required");
    }

    #[test]
    fn test_status_display_includes_body() {
        let error = TransportError::Status {
            status: 503,
            body: "unavailable".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "HTTP error code: 503, response: unavailable"
        );
    }

    #[test]
    fn test_transform_error_keeps_source() {
        let io = std::io::Error::other("boom");
        let error = TransformError::with_source("transformer failed", io);
        assert_eq!(error.to_string(), "transformer failed");
        assert!(std::error::Error::source(&error).is_some());
    }
}
