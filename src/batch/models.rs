use std::time::Duration;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{
    api::{ExecutionRule, ServerResult, ServerTest},
    mobile::UploadPollOptions,
    overrides::UserConfigOverride,
    retry::RetryPolicy,
};

static PUBLIC_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b([a-z0-9]{3}-[a-z0-9]{3}-[a-z0-9]{3})\b").expect("valid regex")
});

/// Extracts the public id from either a bare id or a test URL.
pub fn parse_public_id(id: &str) -> String {
    let trimmed = id.trim();
    let candidate = match url::Url::parse(trimmed) {
        Ok(url) => url
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
            .map(str::to_string)
            .unwrap_or_else(|| trimmed.to_string()),
        Err(_) => trimmed.to_string(),
    };

    PUBLIC_ID
        .captures(&candidate)
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or(candidate)
}

/// One test to run, as written in a test file or given on the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerConfig {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suite: Option<String>,
    #[serde(default)]
    pub config: UserConfigOverride,
}

impl TriggerConfig {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestFile {
    #[serde(default)]
    pub tests: Vec<TriggerConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub test: ServerTest,
    pub location: String,
    pub execution_rule: ExecutionRule,
    pub result_id: Option<String>,
    pub result: Option<ServerResult>,
    pub timed_out: bool,
    /// Server verdict adjusted by the run's fail-on policy.
    pub passed: bool,
    pub timestamp: DateTime<Utc>,
}

impl TestResult {
    pub fn is_critical(&self) -> bool {
        self.result.as_ref().is_some_and(ServerResult::is_critical)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub batch_id: Option<String>,
    pub passed: usize,
    pub failed: usize,
    pub failed_non_blocking: usize,
    pub skipped: usize,
    pub timed_out: usize,
    pub critical_errors: usize,
    /// Public ids in the order they were found missing.
    pub tests_not_found: Vec<String>,
}

impl Summary {
    pub fn record(&mut self, result: &TestResult) {
        if result.timed_out {
            self.timed_out += 1;
        }
        if result.is_critical() {
            self.critical_errors += 1;
        }
        if result.passed {
            if !result.timed_out {
                self.passed += 1;
            }
        } else if result.execution_rule == ExecutionRule::Blocking {
            self.failed += 1;
        } else {
            self.failed_non_blocking += 1;
        }
    }

    pub fn record_skipped(&mut self) {
        self.skipped += 1;
    }

    pub fn add_test_not_found(&mut self, public_id: &str) {
        if !self.tests_not_found.iter().any(|id| id == public_id) {
            self.tests_not_found.push(public_id.to_string());
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Pending,
    Uploading,
    Submitting,
    Polling,
    Completed,
    TimedOut,
    Failed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::TimedOut | Self::Failed)
    }
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub global: UserConfigOverride,
    pub fail_on_timeout: bool,
    pub fail_on_critical_errors: bool,
    pub fail_on_missing_tests: bool,
    pub polling_timeout: Duration,
    pub poll_interval: Duration,
    pub max_concurrent_test_fetches: usize,
    pub max_concurrent_uploads: usize,
    pub max_concurrent_result_fetches: usize,
    pub upload_poll: UploadPollOptions,
    pub retry: RetryPolicy,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            global: UserConfigOverride::default(),
            fail_on_timeout: true,
            fail_on_critical_errors: false,
            fail_on_missing_tests: false,
            polling_timeout: Duration::from_secs(30 * 60),
            poll_interval: Duration::from_secs(5),
            max_concurrent_test_fetches: 10,
            max_concurrent_uploads: 4,
            max_concurrent_result_fetches: 10,
            upload_poll: UploadPollOptions::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl RunConfig {
    /// Final verdict of one result under this run's policy.
    pub fn result_passed(&self, server_passed: bool, timed_out: bool, critical: bool) -> bool {
        if timed_out {
            return !self.fail_on_timeout;
        }
        if critical {
            return !self.fail_on_critical_errors;
        }
        server_passed
    }
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub state: RunState,
    pub summary: Summary,
    pub results: Vec<TestResult>,
}

impl RunOutcome {
    pub fn exit_code(&self, config: &RunConfig) -> i32 {
        let missing = config.fail_on_missing_tests && !self.summary.tests_not_found.is_empty();
        if self.summary.failed > 0 || missing {
            1
        } else {
            0
        }
    }
}
