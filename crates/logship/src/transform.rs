// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Payload transformers.
//!
//! A transformer sits between the payload builder and the indexer for the
//! whole of one run. The writer talks to it with two messages:
//!
//! - [`PayloadTransformer::transform`] once per candidate payload. Returning
//!   `None` drops the payload.
//! - [`PayloadTransformer::finalize`] exactly once when the run ends, to flush
//!   anything the transformer held back.
//!
//! Errors from either call drop the payload. They never trip the writer's
//! breaker.
//!
//! # Built-in transformers
//!
//! - [`FnTransformer`]: closures.
//! - [`MessageFilter`]: processing rules applied to every line of `message`.
//! - [`LineBatcher`]: merges consecutive payloads into fewer, larger ones.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::TransformError;

/// Stateful filter owned by a single run.
pub trait PayloadTransformer: Send {
    fn transform(&mut self, payload: Value) -> Result<Option<Value>, TransformError>;

    /// Called once at the end of the run. Nothing is held back by default.
    fn finalize(&mut self) -> Result<Option<Value>, TransformError> {
        Ok(None)
    }
}

type TransformFn = Box<dyn FnMut(Value) -> Result<Option<Value>, TransformError> + Send>;
type FinalizeFn = Box<dyn FnMut() -> Result<Option<Value>, TransformError> + Send>;

/// Transformer built from closures.
pub struct FnTransformer {
    transform: TransformFn,
    finalize: Option<FinalizeFn>,
}

impl FnTransformer {
    pub fn new<F>(transform: F) -> Self
    where
        F: FnMut(Value) -> Result<Option<Value>, TransformError> + Send + 'static,
    {
        Self {
            transform: Box::new(transform),
            finalize: None,
        }
    }

    #[must_use]
    pub fn with_finalize<F>(mut self, finalize: F) -> Self
    where
        F: FnMut() -> Result<Option<Value>, TransformError> + Send + 'static,
    {
        self.finalize = Some(Box::new(finalize));
        self
    }
}

impl PayloadTransformer for FnTransformer {
    fn transform(&mut self, payload: Value) -> Result<Option<Value>, TransformError> {
        (self.transform)(payload)
    }

    fn finalize(&mut self) -> Result<Option<Value>, TransformError> {
        match self.finalize.as_mut() {
            Some(finalize) => finalize(),
            None => Ok(None),
        }
    }
}

/// What a processing rule does with a matching line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    /// Drop lines that match.
    ExcludeAtMatch,
    /// Drop lines that do not match.
    IncludeAtMatch,
    /// Replace every match with the placeholder.
    MaskSequences,
}

/// A processing rule as configured, before its pattern is compiled.
///
/// ```json
/// {"type": "mask_sequences", "name": "tokens", "pattern": "ghp_[A-Za-z0-9]+", "replace_placeholder": "[TOKEN]"}
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingRule {
    #[serde(rename = "type")]
    pub kind: RuleKind,
    pub name: String,
    pub pattern: String,
    #[serde(default)]
    pub replace_placeholder: Option<String>,
}

#[derive(Clone, Debug)]
struct Rule {
    kind: RuleKind,
    regex: Regex,
    placeholder: String,
}

/// Applies processing rules to each line of a payload's `message`.
///
/// Rules run in order: the first exclude match or include miss drops the
/// line, masks rewrite it. A payload left without lines is dropped.
#[derive(Clone, Debug)]
pub struct MessageFilter {
    rules: Vec<Rule>,
}

impl MessageFilter {
    /// Compiles `rules`. Rules whose pattern does not compile are skipped.
    #[must_use]
    pub fn new(rules: &[ProcessingRule]) -> Self {
        let rules = rules
            .iter()
            .filter_map(|rule| match Regex::new(&rule.pattern) {
                Ok(regex) => Some(Rule {
                    kind: rule.kind,
                    regex,
                    placeholder: rule.replace_placeholder.clone().unwrap_or_default(),
                }),
                Err(e) => {
                    debug!("LOGSHIP | Failed to compile rule '{}': {e}", rule.name);
                    None
                }
            })
            .collect();
        Self { rules }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Returns the processed line, or `None` when a rule drops it.
    #[must_use]
    pub fn apply(&self, line: &str) -> Option<String> {
        let mut line = line.to_string();
        for rule in &self.rules {
            match rule.kind {
                RuleKind::ExcludeAtMatch => {
                    if rule.regex.is_match(&line) {
                        return None;
                    }
                }
                RuleKind::IncludeAtMatch => {
                    if !rule.regex.is_match(&line) {
                        return None;
                    }
                }
                RuleKind::MaskSequences => {
                    line = rule
                        .regex
                        .replace_all(&line, rule.placeholder.as_str())
                        .into_owned();
                }
            }
        }
        Some(line)
    }
}

impl PayloadTransformer for MessageFilter {
    fn transform(&mut self, mut payload: Value) -> Result<Option<Value>, TransformError> {
        let Some(lines) = payload.get_mut("message").and_then(Value::as_array_mut) else {
            return Err(TransformError::new("payload has no message array"));
        };

        let kept: Vec<Value> = lines
            .drain(..)
            .filter_map(|line| match line {
                Value::String(text) => self.apply(&text).map(Value::String),
                other => Some(other),
            })
            .collect();

        if kept.is_empty() {
            return Ok(None);
        }
        *lines = kept;
        Ok(Some(payload))
    }
}

/// Holds lines back until at least `batch_size` are pending, then ships them
/// in one payload. The most recent payload provides every other field.
#[derive(Debug)]
pub struct LineBatcher {
    batch_size: usize,
    pending: Vec<Value>,
    template: Option<Value>,
}

impl LineBatcher {
    #[must_use]
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            pending: Vec::new(),
            template: None,
        }
    }

    fn emit(&mut self) -> Option<Value> {
        if self.pending.is_empty() {
            return None;
        }
        let mut payload = self.template.clone()?;
        payload["message"] = Value::Array(std::mem::take(&mut self.pending));
        Some(payload)
    }
}

impl PayloadTransformer for LineBatcher {
    fn transform(&mut self, mut payload: Value) -> Result<Option<Value>, TransformError> {
        match payload.get_mut("message").map(Value::take) {
            Some(Value::Array(lines)) => self.pending.extend(lines),
            _ => return Err(TransformError::new("payload has no message array")),
        }
        self.template = Some(payload);

        if self.pending.len() < self.batch_size {
            return Ok(None);
        }
        Ok(self.emit())
    }

    fn finalize(&mut self) -> Result<Option<Value>, TransformError> {
        Ok(self.emit())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(lines: &[&str]) -> Value {
        json!({"data": {"id": "7"}, "message": lines, "source": "logship"})
    }

    fn rule(kind: RuleKind, pattern: &str, placeholder: Option<&str>) -> ProcessingRule {
        ProcessingRule {
            kind,
            name: format!("{kind:?}"),
            pattern: pattern.to_string(),
            replace_placeholder: placeholder.map(str::to_string),
        }
    }

    #[test]
    fn test_fn_transformer_keeps_state_across_calls() {
        let mut seen = 0;
        let mut transformer = FnTransformer::new(move |mut payload| {
            seen += 1;
            payload["seq"] = json!(seen);
            Ok(Some(payload))
        })
        .with_finalize(|| Ok(Some(json!({"message": ["done"]}))));

        transformer.transform(payload(&["a"])).unwrap();
        let second = transformer.transform(payload(&["b"])).unwrap().unwrap();
        assert_eq!(second["seq"], 2);
        assert_eq!(
            transformer.finalize().unwrap(),
            Some(json!({"message": ["done"]}))
        );
    }

    #[test]
    fn test_fn_transformer_without_finalize() {
        let mut transformer = FnTransformer::new(|_| Ok(None));
        assert_eq!(transformer.transform(payload(&["a"])).unwrap(), None);
        assert_eq!(transformer.finalize().unwrap(), None);
    }

    #[test]
    fn test_rules_deserialize() {
        let rules: Vec<ProcessingRule> = serde_json::from_str(
            r#"[{"type":"exclude_at_match","name":"health","pattern":"GET /health"},
                {"type":"mask_sequences","name":"token","pattern":"tok_\\w+","replace_placeholder":"[T]"}]"#,
        )
        .unwrap();
        assert_eq!(rules[0].kind, RuleKind::ExcludeAtMatch);
        assert_eq!(rules[1].replace_placeholder.as_deref(), Some("[T]"));
    }

    #[test]
    fn test_message_filter_excludes_and_masks() {
        let mut filter = MessageFilter::new(&[
            rule(RuleKind::ExcludeAtMatch, "^DEBUG", None),
            rule(RuleKind::MaskSequences, r"password=\S+", Some("password=[REDACTED]")),
        ]);

        let out = filter
            .transform(payload(&["DEBUG noise", "login password=hunter2 ok", "done"]))
            .unwrap()
            .unwrap();
        assert_eq!(
            out["message"],
            json!(["login password=[REDACTED] ok", "done"])
        );
        assert_eq!(out["data"]["id"], "7");
    }

    #[test]
    fn test_message_filter_include_drops_empty_payload() {
        let mut filter = MessageFilter::new(&[rule(RuleKind::IncludeAtMatch, "ERROR", None)]);

        assert_eq!(filter.transform(payload(&["all good"])).unwrap(), None);
        let out = filter
            .transform(payload(&["ERROR disk full", "fine"]))
            .unwrap()
            .unwrap();
        assert_eq!(out["message"], json!(["ERROR disk full"]));
    }

    #[test]
    fn test_message_filter_skips_invalid_pattern() {
        let filter = MessageFilter::new(&[rule(RuleKind::ExcludeAtMatch, "(", None)]);
        assert!(filter.is_empty());
        assert_eq!(filter.apply("anything").as_deref(), Some("anything"));
    }

    #[test]
    fn test_message_filter_rejects_malformed_payload() {
        let mut filter = MessageFilter::new(&[]);
        let error = filter.transform(json!({"data": {}})).unwrap_err();
        assert_eq!(error.to_string(), "payload has no message array");
    }

    #[test]
    fn test_line_batcher_batches_and_flushes_remainder() {
        let mut batcher = LineBatcher::new(3);

        assert_eq!(batcher.transform(payload(&["1"])).unwrap(), None);
        assert_eq!(batcher.transform(payload(&["2"])).unwrap(), None);
        let batch = batcher.transform(payload(&["3", "4"])).unwrap().unwrap();
        assert_eq!(batch["message"], json!(["1", "2", "3", "4"]));
        assert_eq!(batch["source"], "logship");

        assert_eq!(batcher.transform(payload(&["5"])).unwrap(), None);
        let rest = batcher.finalize().unwrap().unwrap();
        assert_eq!(rest["message"], json!(["5"]));
        assert_eq!(batcher.finalize().unwrap(), None);
    }
}
