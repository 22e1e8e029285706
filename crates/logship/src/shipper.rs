// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Composition root.
//!
//! A [`Shipper`] lives as long as the host process. It owns the indexer cache
//! and hands every run its own [`LogWriter`] or [`LineTap`]:
//!
//! ```text
//!   Shipper ──owns──> Arc<IndexerCache> <──shared── LogWriter (run 1)
//!                                        <──shared── LogWriter (run 2)
//! ```

use std::io::Write;
use std::sync::Arc;

use tracing::debug;

use crate::config::ShipperConfig;
use crate::indexer::IndexerCache;
use crate::snapshot::JobRun;
use crate::stream::LineTap;
use crate::transform::MessageFilter;
use crate::writer::{DiagnosticSink, LogWriter};

#[derive(Debug)]
pub struct Shipper {
    config: ShipperConfig,
    cache: Arc<IndexerCache>,
}

impl Shipper {
    #[must_use]
    pub fn new(config: ShipperConfig) -> Self {
        Self::with_cache(config, Arc::new(IndexerCache::new()))
    }

    #[must_use]
    pub fn with_cache(config: ShipperConfig, cache: Arc<IndexerCache>) -> Self {
        Self { config, cache }
    }

    #[must_use]
    pub fn config(&self) -> &ShipperConfig {
        &self.config
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<IndexerCache> {
        &self.cache
    }

    /// A writer for one run. Configured processing rules are attached as the
    /// run's transformer.
    pub fn writer(&self, run: Arc<dyn JobRun>, diagnostics: DiagnosticSink) -> LogWriter {
        let writer = LogWriter::new(
            self.config.clone(),
            Arc::clone(&self.cache),
            run,
            diagnostics,
        );
        let filter = MessageFilter::new(&self.config.processing_rules);
        if filter.is_empty() {
            return writer;
        }
        writer.with_transformer(Box::new(filter))
    }

    /// Wraps `inner` so every line written to it is also shipped. When
    /// shipping is disabled the tap only forwards.
    pub fn tap<W: Write>(
        &self,
        inner: W,
        run: Arc<dyn JobRun>,
        diagnostics: DiagnosticSink,
    ) -> LineTap<W> {
        if !self.config.enabled {
            debug!("LOGSHIP | Shipping disabled, forwarding output only");
            return LineTap::passthrough(inner);
        }
        LineTap::new(inner, self.writer(run, diagnostics))
    }

    /// Whether the caller should fail the job because shipping ended broken.
    pub fn fails_job(&self, writer: &mut LogWriter) -> bool {
        self.config.fail_on_broken && writer.is_connection_broken()
    }
}
