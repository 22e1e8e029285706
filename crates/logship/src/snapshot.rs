// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Job metadata snapshot.
//!
//! The host describes a run through [`JobRun`]. The writer captures that
//! description once, redacts it, and keeps the resulting [`JobSnapshot`] for
//! every payload of the run.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::io;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::TimestampPrecision;
use crate::constants::MAX_FAILED_TESTS;
use crate::error::MetadataError;
use crate::payload::format_timestamp;

/// Boundary to the host orchestration runtime for one run.
pub trait JobRun: Send + Sync {
    /// Current metadata of the run.
    fn metadata(&self) -> Result<RunMetadata, MetadataError>;

    /// Trailing `max_lines` lines of the run's accumulated output, all of them
    /// when `max_lines` is negative.
    fn log_tail(&self, max_lines: i64) -> io::Result<Vec<String>>;
}

/// Raw description of a run as handed over by the host.
#[derive(Debug, Clone, Default)]
pub struct RunMetadata {
    pub id: String,
    /// `None` while the run is still going.
    pub result: Option<String>,
    pub project_name: String,
    pub full_project_name: String,
    pub display_name: String,
    pub full_display_name: String,
    pub description: Option<String>,
    pub url: String,
    pub build_host: String,
    pub build_label: String,
    pub build_number: u64,
    pub started_at: DateTime<Utc>,
    /// Known once the run completed; otherwise derived from `started_at`.
    pub duration_ms: Option<u64>,
    /// Top-level run, when this run is nested in another one.
    pub root: Option<RootRun>,
    pub environment: HashMap<String, String>,
    /// Variable names the host flags as sensitive.
    pub sensitive_variables: HashSet<String>,
    pub tests: Option<TestReport>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RootRun {
    pub project_name: String,
    pub full_project_name: String,
    pub display_name: String,
    pub build_number: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestReport {
    pub total: u64,
    pub skipped: u64,
    pub failed: u64,
    pub failures: Vec<FailedTest>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FailedTest {
    pub full_name: String,
    pub error_details: Option<String>,
}

/// Immutable metadata of a run as serialized into the `data` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    pub id: String,
    pub result: Option<String>,
    pub project_name: String,
    pub full_project_name: String,
    pub display_name: String,
    pub full_display_name: String,
    pub description: Option<String>,
    pub url: String,
    pub build_host: String,
    pub build_label: String,
    #[serde(rename = "buildNum")]
    pub build_number: u64,
    #[serde(rename = "buildDuration")]
    pub duration_ms: u64,
    pub timestamp: String,
    pub root_project_name: String,
    pub root_full_project_name: String,
    pub root_project_display_name: String,
    #[serde(rename = "rootBuildNum")]
    pub root_build_number: u64,
    pub build_variables: BTreeMap<String, String>,
    pub sensitive_build_variables: Vec<String>,
    pub test_results: Option<TestSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestSummary {
    pub total_count: u64,
    pub skip_count: u64,
    pub fail_count: u64,
    pub pass_count: u64,
    pub failed_tests: Vec<String>,
    pub failed_tests_with_error_detail: Vec<FailedTestDetail>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedTestDetail {
    pub full_name: String,
    pub error_details: Option<String>,
}

impl JobSnapshot {
    pub fn capture(
        metadata: RunMetadata,
        deny_list: &[String],
        precision: TimestampPrecision,
    ) -> Self {
        Self::capture_at(metadata, deny_list, precision, Utc::now())
    }

    /// Captures `metadata` as seen at `now`.
    ///
    /// Variables flagged by the host and variables named in `deny_list` are
    /// removed from `buildVariables` and listed by name only.
    pub fn capture_at(
        metadata: RunMetadata,
        deny_list: &[String],
        precision: TimestampPrecision,
        now: DateTime<Utc>,
    ) -> Self {
        let RunMetadata {
            id,
            result,
            project_name,
            full_project_name,
            display_name,
            full_display_name,
            description,
            url,
            build_host,
            build_label,
            build_number,
            started_at,
            duration_ms,
            root,
            environment,
            mut sensitive_variables,
            tests,
        } = metadata;

        sensitive_variables.extend(deny_list.iter().cloned());

        let mut redacted = Vec::new();
        let mut build_variables = BTreeMap::new();
        for (name, value) in environment {
            if sensitive_variables.contains(&name) {
                redacted.push(name);
            } else {
                build_variables.insert(name, value);
            }
        }
        redacted.sort();

        let duration_ms = duration_ms.unwrap_or_else(|| {
            u64::try_from((now - started_at).num_milliseconds()).unwrap_or_default()
        });

        let root = root.unwrap_or_else(|| RootRun {
            project_name: project_name.clone(),
            full_project_name: full_project_name.clone(),
            display_name: display_name.clone(),
            build_number,
        });

        Self {
            id,
            result,
            project_name,
            full_project_name,
            display_name,
            full_display_name,
            description,
            url,
            build_host,
            build_label,
            build_number,
            duration_ms,
            timestamp: format_timestamp(started_at, precision),
            root_project_name: root.project_name,
            root_full_project_name: root.full_project_name,
            root_project_display_name: root.display_name,
            root_build_number: root.build_number,
            build_variables,
            sensitive_build_variables: redacted,
            test_results: tests.map(TestSummary::from),
        }
    }
}

impl From<TestReport> for TestSummary {
    fn from(report: TestReport) -> Self {
        let failures: Vec<FailedTest> = report
            .failures
            .into_iter()
            .take(MAX_FAILED_TESTS)
            .collect();

        Self {
            total_count: report.total,
            skip_count: report.skipped,
            fail_count: report.failed,
            pass_count: report
                .total
                .saturating_sub(report.skipped)
                .saturating_sub(report.failed),
            failed_tests: failures.iter().map(|t| t.full_name.clone()).collect(),
            failed_tests_with_error_detail: failures
                .into_iter()
                .map(|t| FailedTestDetail {
                    full_name: t.full_name,
                    error_details: t.error_details,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn started() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn metadata() -> RunMetadata {
        RunMetadata {
            id: "42".to_string(),
            project_name: "api".to_string(),
            full_project_name: "team/api".to_string(),
            display_name: "#42".to_string(),
            full_display_name: "team » api #42".to_string(),
            url: "job/api/42/".to_string(),
            build_host: "agent-1".to_string(),
            build_label: "linux".to_string(),
            build_number: 42,
            started_at: started(),
            environment: HashMap::from([
                ("PATH".to_string(), "/usr/bin".to_string()),
                ("API_TOKEN".to_string(), "hunter2".to_string()),
                ("DB_PASSWORD".to_string(), "swordfish".to_string()),
            ]),
            sensitive_variables: HashSet::from(["API_TOKEN".to_string()]),
            ..Default::default()
        }
    }

    #[test]
    fn test_capture_redacts_sensitive_variables() {
        let snapshot = JobSnapshot::capture_at(
            metadata(),
            &["DB_PASSWORD".to_string()],
            TimestampPrecision::Milliseconds,
            started(),
        );

        assert_eq!(
            snapshot.build_variables,
            BTreeMap::from([("PATH".to_string(), "/usr/bin".to_string())])
        );
        assert_eq!(
            snapshot.sensitive_build_variables,
            vec!["API_TOKEN", "DB_PASSWORD"]
        );
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(!json.contains("hunter2"));
        assert!(!json.contains("swordfish"));
    }

    #[test]
    fn test_capture_defaults_root_to_self() {
        let snapshot = JobSnapshot::capture_at(
            metadata(),
            &[],
            TimestampPrecision::Milliseconds,
            started(),
        );
        assert_eq!(snapshot.root_project_name, "api");
        assert_eq!(snapshot.root_full_project_name, "team/api");
        assert_eq!(snapshot.root_build_number, 42);
    }

    #[test]
    fn test_capture_keeps_nested_root() {
        let metadata = RunMetadata {
            root: Some(RootRun {
                project_name: "monorepo".to_string(),
                full_project_name: "org/monorepo".to_string(),
                display_name: "#7".to_string(),
                build_number: 7,
            }),
            ..metadata()
        };
        let snapshot =
            JobSnapshot::capture_at(metadata, &[], TimestampPrecision::Seconds, started());
        assert_eq!(snapshot.root_project_name, "monorepo");
        assert_eq!(snapshot.root_build_number, 7);
    }

    #[test]
    fn test_duration_running_and_completed() {
        let now = started() + chrono::Duration::milliseconds(1_500);
        let running =
            JobSnapshot::capture_at(metadata(), &[], TimestampPrecision::Milliseconds, now);
        assert_eq!(running.duration_ms, 1_500);
        assert_eq!(running.result, None);

        let completed = RunMetadata {
            result: Some("SUCCESS".to_string()),
            duration_ms: Some(90_000),
            ..metadata()
        };
        let completed =
            JobSnapshot::capture_at(completed, &[], TimestampPrecision::Milliseconds, now);
        assert_eq!(completed.duration_ms, 90_000);
        assert_eq!(completed.result.as_deref(), Some("SUCCESS"));
    }

    #[test]
    fn test_wire_field_names() {
        let snapshot = JobSnapshot::capture_at(
            metadata(),
            &[],
            TimestampPrecision::Milliseconds,
            started(),
        );
        let value = serde_json::to_value(&snapshot).unwrap();
        for field in [
            "id",
            "result",
            "projectName",
            "fullProjectName",
            "displayName",
            "fullDisplayName",
            "description",
            "url",
            "buildHost",
            "buildLabel",
            "buildNum",
            "buildDuration",
            "timestamp",
            "rootProjectName",
            "rootFullProjectName",
            "rootProjectDisplayName",
            "rootBuildNum",
            "buildVariables",
            "sensitiveBuildVariables",
            "testResults",
        ] {
            assert!(value.get(field).is_some(), "missing field {field}");
        }
        assert_eq!(value["timestamp"], "2024-03-01T12:00:00.000Z");
        assert!(value["result"].is_null());
    }

    #[test]
    fn test_test_summary_caps_failures() {
        let report = TestReport {
            total: 500,
            skipped: 10,
            failed: 150,
            failures: (0..150)
                .map(|i| FailedTest {
                    full_name: format!("suite.test_{i}"),
                    error_details: Some("assertion failed".to_string()),
                })
                .collect(),
        };
        let summary = TestSummary::from(report);

        assert_eq!(summary.pass_count, 340);
        assert_eq!(summary.failed_tests.len(), MAX_FAILED_TESTS);
        assert_eq!(summary.failed_tests_with_error_detail.len(), MAX_FAILED_TESTS);
        assert_eq!(summary.failed_tests[0], "suite.test_0");
        assert_eq!(summary.fail_count, 150);
    }
}
