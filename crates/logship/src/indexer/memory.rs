// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::{Mutex, PoisonError};

use serde_json::Value;

use crate::error::TransportError;
use crate::indexer::{Indexer, IndexerKind};

/// Records every pushed payload in order. Never fails.
#[derive(Debug, Default)]
pub struct MemoryIndexer {
    payloads: Mutex<Vec<Value>>,
}

impl MemoryIndexer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies of the payloads pushed so far.
    pub fn payloads(&self) -> Vec<Value> {
        self.payloads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.payloads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.payloads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl Indexer for MemoryIndexer {
    fn kind(&self) -> IndexerKind {
        IndexerKind::Memory
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }

    fn push(&self, payload: &str) -> Result<(), TransportError> {
        // Non-JSON input is kept verbatim rather than rejected.
        let value =
            serde_json::from_str(payload).unwrap_or_else(|_| Value::String(payload.to_string()));
        self.payloads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(value);
        Ok(())
    }
}
