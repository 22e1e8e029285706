// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Wire constants shared by the payload builder and the indexer backends.
//!
//! Downstream indexers key their mappings on these values, so changing any of
//! them is a schema change for every consumer of the shipped documents.

/// Value of the `source` field of every payload.
pub const PAYLOAD_SOURCE: &str = "logship";

/// Value of the `@version` field of every payload.
pub const PAYLOAD_VERSION: u64 = 1;

/// Marker prepended to the JSON body of a syslog message (CEE structured data).
pub const SYSLOG_STRUCTURED_DATA_MARKER: &str = "@cee:";

/// Syslog APP-NAME / TAG written into every frame.
pub const SYSLOG_APP_NAME: &str = "logship";

/// `user-level messages`
pub const SYSLOG_FACILITY_USER: u8 = 1;

/// `informational messages`
pub const SYSLOG_SEVERITY_INFORMATIONAL: u8 = 6;

/// Failed test entries kept in a snapshot's test summary.
pub const MAX_FAILED_TESTS: usize = 100;

/// Prefix of every diagnostic line written to a run's own output.
pub const DIAGNOSTIC_PREFIX: &str = "[logship]";

pub const DEFAULT_AMQP_PORT: u16 = 5672;
pub const DEFAULT_AMQP_VIRTUAL_HOST: &str = "/";
pub const DEFAULT_AMQP_CONNECTION_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_SYSLOG_PORT: u16 = 514;
pub const DEFAULT_HTTP_MIME_TYPE: &str = "application/json";
pub const DEFAULT_HTTP_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_HTTP_REQUEST_TIMEOUT_SECS: u64 = 30;
