// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use chrono::{TimeZone, Utc};
use logship::snapshot::{FailedTest, TestReport};
use logship::{JobRun, MetadataError, RunMetadata};

/// A finished run with a fixed log.
pub struct FixedRun {
    pub log: Vec<String>,
}

impl FixedRun {
    pub fn new(log: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            log: log.iter().map(|line| line.to_string()).collect(),
        })
    }
}

impl JobRun for FixedRun {
    fn metadata(&self) -> Result<RunMetadata, MetadataError> {
        Ok(RunMetadata {
            id: "2024-05-17_08-30-15".to_string(),
            result: Some("SUCCESS".to_string()),
            project_name: "api".to_string(),
            full_project_name: "team/api".to_string(),
            display_name: "#17".to_string(),
            full_display_name: "team » api #17".to_string(),
            description: Some("nightly".to_string()),
            url: "job/team/job/api/17/".to_string(),
            build_host: "agent-3".to_string(),
            build_label: "linux".to_string(),
            build_number: 17,
            started_at: Utc.with_ymd_and_hms(2024, 5, 17, 8, 30, 15).unwrap(),
            duration_ms: Some(61_000),
            root: None,
            environment: HashMap::from([
                ("BRANCH".to_string(), "main".to_string()),
                ("DEPLOY_TOKEN".to_string(), "s3cr3t".to_string()),
                ("NPM_TOKEN".to_string(), "n0pe".to_string()),
            ]),
            sensitive_variables: HashSet::from(["NPM_TOKEN".to_string()]),
            tests: Some(TestReport {
                total: 10,
                skipped: 1,
                failed: 1,
                failures: vec![FailedTest {
                    full_name: "api.HealthTest.ready".to_string(),
                    error_details: Some("expected 200".to_string()),
                }],
            }),
        })
    }

    fn log_tail(&self, max_lines: i64) -> io::Result<Vec<String>> {
        let skip = usize::try_from(max_lines)
            .map(|max| self.log.len().saturating_sub(max))
            .unwrap_or(0);
        Ok(self.log[skip..].to_vec())
    }
}

/// Cloneable in-memory sink for diagnostics.
#[derive(Clone, Default)]
pub struct SharedOutput(Arc<Mutex<Vec<u8>>>);

impl SharedOutput {
    pub fn text(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for SharedOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
