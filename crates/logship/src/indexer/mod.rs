// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Indexer backends.
//!
//! An indexer receives serialized payloads over one wire protocol. All of them
//! share the [`Indexer`] contract:
//!
//! ```text
//!   IndexerConfig ──> build_indexer ──> Arc<dyn Indexer>
//!                          │
//!        ┌──────────┬──────┴─────┬────────────┬──────────┐
//!        v          v            v            v          v
//!   TcpIndexer  AmqpIndexer  HttpIndexer  SyslogIndexer  MemoryIndexer
//!   (line/TCP)  (queue)      (POST doc)   (UDP frame)    (test double)
//! ```
//!
//! Construction validates the configuration and fails with a
//! [`ConfigError`]. A push either succeeds or fails with a
//! [`TransportError`]; there is no retry at this level.
//!
//! Instances are shared between concurrent runs through [`IndexerCache`], so
//! every implementation must accept concurrent `push` calls.
//!
//! Pushes are blocking. A host thread may already be driving a tokio runtime,
//! where blocking clients refuse to wait; [`outside_runtime`] moves that work
//! to a scoped thread.

pub mod amqp;
pub mod cache;
pub mod http;
pub mod memory;
pub mod syslog;
pub mod tcp;

use std::io::Write;
use std::sync::Arc;
use std::thread;

use tracing::debug;

use crate::config::IndexerConfig;
use crate::constants::DIAGNOSTIC_PREFIX;
use crate::error::{ConfigError, TransportError};

pub use amqp::AmqpIndexer;
pub use cache::IndexerCache;
pub use http::HttpIndexer;
pub use memory::MemoryIndexer;
pub use syslog::SyslogIndexer;
pub use tcp::TcpIndexer;

/// Wire protocol of an indexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum IndexerKind {
    #[display("TCP")]
    Tcp,
    #[display("AMQP")]
    Amqp,
    #[display("HTTP")]
    Http,
    #[display("SYSLOG")]
    Syslog,
    #[display("MEMORY")]
    Memory,
}

/// Capability shared by every backend.
pub trait Indexer: Send + Sync {
    fn kind(&self) -> IndexerKind;

    /// Human readable endpoint label used in diagnostics.
    fn describe(&self) -> String;

    /// Delivers one serialized payload.
    fn push(&self, payload: &str) -> Result<(), TransportError>;

    /// Like [`Indexer::push`] but reports failures to `sink` instead of
    /// returning them. Returns the number of payloads delivered, or `-1`.
    fn push_logged(&self, payload: &str, sink: &mut dyn Write) -> i64 {
        match self.push(payload) {
            Ok(()) => 1,
            Err(e) => {
                if let Err(write_error) = writeln!(
                    sink,
                    "{DIAGNOSTIC_PREFIX}: Failed to push to {} {}: {e}",
                    self.kind(),
                    self.describe()
                ) {
                    debug!("LOGSHIP | Unable to write diagnostic: {write_error}");
                }
                -1
            }
        }
    }
}

/// Runs `f` on the calling thread, or on a scoped thread when the caller is
/// inside a tokio runtime context.
pub(crate) fn outside_runtime<T, F>(f: F) -> T
where
    F: FnOnce() -> T + Send,
    T: Send,
{
    if tokio::runtime::Handle::try_current().is_err() {
        return f();
    }
    thread::scope(|scope| match scope.spawn(f).join() {
        Ok(value) => value,
        Err(payload) => std::panic::resume_unwind(payload),
    })
}

/// Constructs the backend selected by `config`.
pub fn build_indexer(config: &IndexerConfig) -> Result<Arc<dyn Indexer>, ConfigError> {
    let indexer: Arc<dyn Indexer> = match config {
        IndexerConfig::Tcp(config) => Arc::new(TcpIndexer::new(config.clone())?),
        IndexerConfig::Amqp(config) => Arc::new(AmqpIndexer::new(config.clone())?),
        IndexerConfig::Http(config) => Arc::new(HttpIndexer::new(config.clone())?),
        IndexerConfig::Syslog(config) => Arc::new(SyslogIndexer::new(config.clone())?),
        IndexerConfig::Memory => Arc::new(MemoryIndexer::new()),
    };
    Ok(indexer)
}
