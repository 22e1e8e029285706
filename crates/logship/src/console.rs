// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Inline console markers.
//!
//! Console lines can carry hidden annotations (`ESC[8m ha:<base64> ESC[0m`)
//! and ANSI styling. Neither belongs in a shipped document.

use std::sync::OnceLock;

use regex::Regex;

#[allow(clippy::unwrap_used)]
fn hidden_note() -> &'static Regex {
    static HIDDEN_NOTE: OnceLock<Regex> = OnceLock::new();
    HIDDEN_NOTE.get_or_init(|| Regex::new(r"\x1b\[8mha:[^\x1b]*\x1b\[0m").unwrap())
}

/// Removes hidden annotations and ANSI escape sequences from `line`.
#[must_use]
pub fn strip_markers(line: &str) -> String {
    let without_notes = hidden_note().replace_all(line, "");
    strip_ansi_escapes::strip_str(without_notes)
}
