// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Per-run writer and its circuit breaker.
//!
//! ```text
//!   Uninitialized ──first send──> Ready ──push failed──> Broken
//!         │                                                 ^
//!         └──── indexer or metadata unavailable ────────────┘
//! ```
//!
//! `Broken` is terminal for the run. Every send after the transition is
//! skipped without touching the network, so one unreachable indexer costs the
//! run one diagnostic line and one failed attempt. The only push that may
//! still happen is the transformer's final payload from [`LogWriter::close`],
//! unless [`ShipperConfig::finalize_when_broken`] turns it off.

use std::io::Write;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::config::ShipperConfig;
use crate::constants::DIAGNOSTIC_PREFIX;
use crate::indexer::{Indexer, IndexerCache};
use crate::payload::{build_payload, is_empty_payload};
use crate::snapshot::{JobRun, JobSnapshot};
use crate::transform::PayloadTransformer;

/// Human readable sink of a run's own output.
pub type DiagnosticSink = Box<dyn Write + Send>;

enum State {
    Uninitialized,
    Ready {
        indexer: Arc<dyn Indexer>,
        snapshot: JobSnapshot,
    },
    /// The indexer, if one was built, stays available for finalization.
    Broken { indexer: Option<Arc<dyn Indexer>> },
}

pub struct LogWriter {
    config: ShipperConfig,
    cache: Arc<IndexerCache>,
    run: Arc<dyn JobRun>,
    diagnostics: DiagnosticSink,
    transformer: Option<Box<dyn PayloadTransformer>>,
    state: State,
    closed: bool,
}

impl LogWriter {
    pub fn new(
        config: ShipperConfig,
        cache: Arc<IndexerCache>,
        run: Arc<dyn JobRun>,
        diagnostics: DiagnosticSink,
    ) -> Self {
        Self {
            config,
            cache,
            run,
            diagnostics,
            transformer: None,
            state: State::Uninitialized,
            closed: false,
        }
    }

    #[must_use]
    pub fn with_transformer(mut self, transformer: Box<dyn PayloadTransformer>) -> Self {
        self.transformer = Some(transformer);
        self
    }

    /// Ships a single line. Blank lines are ignored.
    pub fn write_line(&mut self, line: &str) {
        if self.is_broken() || line.trim().is_empty() {
            return;
        }
        self.write_lines(vec![line.to_string()]);
    }

    /// Ships `lines` as one payload.
    pub fn write_lines(&mut self, lines: Vec<String>) {
        if self.is_broken() || lines.is_empty() {
            return;
        }
        if !self.ensure_ready() {
            return;
        }
        let State::Ready { snapshot, .. } = &self.state else {
            return;
        };

        let payload = build_payload(
            snapshot,
            &self.config.source_host,
            lines,
            self.config.timestamps,
        );
        if let Some(payload) = self.transform(payload) {
            self.push(&payload);
        }
    }

    /// Ships the trailing `max_lines` lines of the run's log, or all of them
    /// when `max_lines` is negative. A log that cannot be read is reported
    /// through the indexer instead.
    pub fn write_build_log(&mut self, max_lines: i64) {
        if self.is_broken() {
            return;
        }
        let lines = match self.run.log_tail(max_lines) {
            Ok(lines) => lines,
            Err(e) => {
                warn!("LOGSHIP | Unable to read the job log: {e}");
                vec![
                    format!("{DIAGNOSTIC_PREFIX}: Unable to read the job log."),
                    e.to_string(),
                ]
            }
        };
        self.write_lines(lines);
    }

    /// True once the breaker tripped or the indexer or snapshot could not be
    /// built.
    pub fn is_connection_broken(&mut self) -> bool {
        if !self.closed {
            self.ensure_ready();
        }
        self.is_broken()
    }

    /// Ends the run: finalizes the transformer exactly once and pushes what it
    /// returns. Later calls do nothing.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        let Some(transformer) = self.transformer.as_mut() else {
            return;
        };
        let payload = match transformer.finalize() {
            Ok(Some(payload)) if !is_empty_payload(&payload) => payload,
            Ok(_) => return,
            Err(e) => {
                self.diagnostic(&format!("Payload transformer failed to finalize: {e}"));
                return;
            }
        };

        if self.is_broken() && !self.config.finalize_when_broken {
            debug!("LOGSHIP | Dropping final payload, shipping is broken");
            return;
        }
        self.ensure_ready();
        self.push(&payload);
    }

    /// True once the writer stopped shipping. Unlike
    /// [`LogWriter::is_connection_broken`] this never builds anything.
    #[must_use]
    pub fn is_broken(&self) -> bool {
        matches!(self.state, State::Broken { .. })
    }

    /// Builds the indexer and the snapshot on first use.
    fn ensure_ready(&mut self) -> bool {
        match self.state {
            State::Ready { .. } => return true,
            State::Broken { .. } => return false,
            State::Uninitialized => {}
        }

        let indexer = match self.cache.get(&self.config.indexer) {
            Ok(indexer) => indexer,
            Err(e) => {
                self.diagnostic(&format!(
                    "Unable to create {} indexer: {e}",
                    self.config.indexer.kind()
                ));
                self.state = State::Broken { indexer: None };
                return false;
            }
        };

        let metadata = match self.run.metadata() {
            Ok(metadata) => metadata,
            Err(e) => {
                self.diagnostic(&format!("Unable to serialize build data: {e}"));
                self.state = State::Broken {
                    indexer: Some(indexer),
                };
                return false;
            }
        };

        let snapshot = JobSnapshot::capture(
            metadata,
            &self.config.sensitive_variables,
            self.config.timestamps,
        );
        self.state = State::Ready { indexer, snapshot };
        true
    }

    fn transform(&mut self, payload: Value) -> Option<Value> {
        let Some(transformer) = self.transformer.as_mut() else {
            return Some(payload);
        };
        match transformer.transform(payload) {
            Ok(Some(payload)) if !is_empty_payload(&payload) => Some(payload),
            Ok(_) => None,
            Err(e) => {
                self.diagnostic(&format!("Payload transformer failed, payload dropped: {e}"));
                None
            }
        }
    }

    /// Pushes `payload`. Only the failure that trips the breaker reaches the
    /// diagnostic sink; a failed final push on a broken run is logged.
    fn push(&mut self, payload: &Value) {
        let was_broken = self.is_broken();
        let indexer = match &self.state {
            State::Ready { indexer, .. } => Arc::clone(indexer),
            State::Broken {
                indexer: Some(indexer),
                ..
            } => Arc::clone(indexer),
            _ => return,
        };

        if let Err(e) = indexer.push(&payload.to_string()) {
            let message = format!(
                "Failed to push to {} {}: {e}",
                indexer.kind(),
                indexer.describe()
            );
            if was_broken {
                debug!("LOGSHIP | {message}");
            } else {
                self.diagnostic(&message);
            }
            self.trip();
        }
    }

    fn trip(&mut self) {
        let state = std::mem::replace(&mut self.state, State::Uninitialized);
        self.state = match state {
            State::Ready { indexer, .. } => State::Broken {
                indexer: Some(indexer),
            },
            State::Uninitialized => State::Broken { indexer: None },
            broken => broken,
        };
    }

    fn diagnostic(&mut self, message: &str) {
        warn!("LOGSHIP | {message}");
        if let Err(e) = writeln!(self.diagnostics, "{DIAGNOSTIC_PREFIX}: {message}") {
            debug!("LOGSHIP | Unable to write diagnostic: {e}");
        }
        if let Err(e) = self.diagnostics.flush() {
            debug!("LOGSHIP | Unable to flush diagnostics: {e}");
        }
    }
}

impl Drop for LogWriter {
    fn drop(&mut self) {
        self.close();
    }
}
