// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Payload builder.
//!
//! Every payload shipped to an indexer has the same top-level shape:
//!
//! ```text
//! {
//!   "data":            <job snapshot>,
//!   "message":         ["line", ...],
//!   "source":          "logship",
//!   "source_host":     "<base URL of the orchestrating host>",
//!   "@buildTimestamp": "<snapshot timestamp>",
//!   "@timestamp":      "<send time>",
//!   "@version":        1
//! }
//! ```

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::TimestampPrecision;
use crate::constants::{PAYLOAD_SOURCE, PAYLOAD_VERSION};
use crate::snapshot::JobSnapshot;

/// Formats `time` as an ISO-8601 UTC timestamp.
#[must_use]
pub fn format_timestamp(time: DateTime<Utc>, precision: TimestampPrecision) -> String {
    let format = match precision {
        TimestampPrecision::Milliseconds => SecondsFormat::Millis,
        TimestampPrecision::Seconds => SecondsFormat::Secs,
    };
    time.to_rfc3339_opts(format, true)
}

/// Builds the payload for `lines` stamped with the current time.
#[must_use]
pub fn build_payload(
    snapshot: &JobSnapshot,
    source_host: &str,
    lines: Vec<String>,
    precision: TimestampPrecision,
) -> Value {
    build_payload_at(
        snapshot,
        &snapshot.timestamp,
        source_host,
        lines,
        precision,
        Utc::now(),
    )
}

/// Builds a payload around any serializable `data`.
///
/// Data that fails to serialize ships as `null`; building never fails.
#[must_use]
pub fn build_payload_at<D: Serialize>(
    data: &D,
    build_timestamp: &str,
    source_host: &str,
    lines: Vec<String>,
    precision: TimestampPrecision,
    now: DateTime<Utc>,
) -> Value {
    let data = serde_json::to_value(data).unwrap_or_else(|e| {
        debug!("LOGSHIP | Unable to serialize job snapshot: {e}");
        Value::Null
    });

    json!({
        "data": data,
        "message": lines,
        "source": PAYLOAD_SOURCE,
        "source_host": source_host,
        "@buildTimestamp": build_timestamp,
        "@timestamp": format_timestamp(now, precision),
        "@version": PAYLOAD_VERSION,
    })
}

/// A payload worth pushing: anything but `null` or an empty object/array.
#[must_use]
pub fn is_empty_payload(payload: &Value) -> bool {
    match payload {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}
