// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! # logship
//!
//! Ships a running job's console output and metadata to an external log
//! indexer while the job runs or once it has finished.
//!
//! ```text
//!   job output ──> LineTap ──(bytes, unchanged)──> real destination
//!                     │
//!                   line
//!                     v
//!                 LogWriter ──> build_payload ──> PayloadTransformer? ──> Indexer
//!                     │                                                   (TCP, AMQP, HTTP,
//!                  breaker                                                 syslog, memory)
//! ```
//!
//! Shipping is best effort: every payload is attempted once, and the first
//! transport failure of a run stops shipping for the rest of that run. Nothing
//! here fails the job unless the caller asks for it through
//! [`config::ShipperConfig::fail_on_broken`].

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod config;
pub mod console;
pub mod constants;
pub mod error;
pub mod indexer;
pub mod payload;
pub mod shipper;
pub mod snapshot;
pub mod stream;
pub mod transform;
pub mod writer;

pub use config::{IndexerConfig, ShipperConfig};
pub use error::{ConfigError, MetadataError, TransformError, TransportError};
pub use indexer::{Indexer, IndexerCache, IndexerKind};
pub use shipper::Shipper;
pub use snapshot::{JobRun, JobSnapshot, RunMetadata};
pub use stream::LineTap;
pub use writer::LogWriter;
