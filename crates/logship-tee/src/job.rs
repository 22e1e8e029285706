// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Run description taken from the process environment.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use logship::console::strip_markers;
use logship::{JobRun, MetadataError, RunMetadata};

/// Fragments that flag an environment variable as sensitive.
const SENSITIVE_FRAGMENTS: [&str; 5] = ["PASSWORD", "SECRET", "TOKEN", "API_KEY", "CREDENTIAL"];

/// A run described by `LOGSHIP_JOB_*` / `LOGSHIP_BUILD_*` variables, whose log
/// lives in a file.
#[derive(Debug, Clone)]
pub struct FileJobRun {
    vars: HashMap<String, String>,
    log_file: Option<PathBuf>,
    started_at: DateTime<Utc>,
}

impl FileJobRun {
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars().collect(), Utc::now())
    }

    pub fn from_vars(vars: HashMap<String, String>, started_at: DateTime<Utc>) -> Self {
        let log_file = vars
            .get("LOGSHIP_LOG_FILE")
            .filter(|path| !path.trim().is_empty())
            .map(PathBuf::from);
        Self {
            vars,
            log_file,
            started_at,
        }
    }

    fn var(&self, name: &str) -> Option<String> {
        self.vars
            .get(name)
            .map(|val| val.trim().to_string())
            .filter(|val| !val.is_empty())
    }
}

fn is_sensitive(name: &str) -> bool {
    let upper = name.to_uppercase();
    SENSITIVE_FRAGMENTS
        .iter()
        .any(|fragment| upper.contains(fragment))
}

fn hostname() -> String {
    nix::unistd::gethostname()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_default()
}

impl JobRun for FileJobRun {
    fn metadata(&self) -> Result<RunMetadata, MetadataError> {
        let project_name = self.var("LOGSHIP_JOB_NAME").unwrap_or_else(|| "logship-tee".to_string());
        let build_number = match self.var("LOGSHIP_BUILD_NUMBER") {
            Some(val) => val
                .parse::<u64>()
                .map_err(|_| MetadataError(format!("invalid build number '{val}'")))?,
            None => 0,
        };
        let display_name = format!("#{build_number}");

        let environment: HashMap<String, String> = self
            .vars
            .iter()
            .filter(|(name, _)| !name.starts_with("LOGSHIP_"))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        let sensitive_variables: HashSet<String> = environment
            .keys()
            .filter(|name| is_sensitive(name))
            .cloned()
            .collect();

        Ok(RunMetadata {
            id: self
                .var("LOGSHIP_BUILD_ID")
                .unwrap_or_else(|| build_number.to_string()),
            result: self.var("LOGSHIP_BUILD_RESULT"),
            full_project_name: self
                .var("LOGSHIP_JOB_FULL_NAME")
                .unwrap_or_else(|| project_name.clone()),
            full_display_name: format!("{project_name} {display_name}"),
            project_name,
            display_name,
            description: self.var("LOGSHIP_BUILD_DESCRIPTION"),
            url: self.var("LOGSHIP_BUILD_URL").unwrap_or_default(),
            build_host: self.var("LOGSHIP_BUILD_HOST").unwrap_or_else(hostname),
            build_label: self.var("LOGSHIP_BUILD_LABEL").unwrap_or_default(),
            build_number,
            started_at: self.started_at,
            duration_ms: None,
            root: None,
            environment,
            sensitive_variables,
            tests: None,
        })
    }

    fn log_tail(&self, max_lines: i64) -> io::Result<Vec<String>> {
        let Some(path) = &self.log_file else {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                "LOGSHIP_LOG_FILE is not set",
            ));
        };
        let bytes = fs::read(path)?;
        let text = String::from_utf8_lossy(&bytes);
        let lines: Vec<String> = text.lines().map(strip_markers).collect();

        let skip = usize::try_from(max_lines)
            .map(|max| lines.len().saturating_sub(max))
            .unwrap_or(0);
        Ok(lines.into_iter().skip(skip).collect())
    }
}
