use std::time::Duration;

use colored::{Color, Colorize};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::{
    api::ExecutionRule,
    batch::{RunOutcome, RunState, Summary, TestResult},
    mobile::{AppUploadKey, AppUploadReporter},
};

/// Upload progress on stderr.
pub struct ConsoleUploadReporter {
    bar: ProgressBar,
}

impl ConsoleUploadReporter {
    pub fn new() -> Self {
        Self::with_target(ProgressDrawTarget::stderr())
    }

    pub fn hidden() -> Self {
        Self::with_target(ProgressDrawTarget::hidden())
    }

    fn with_target(target: ProgressDrawTarget) -> Self {
        let bar = ProgressBar::with_draw_target(Some(0), target);
        if let Ok(style) = ProgressStyle::with_template("{spinner} [{pos}/{len}] {msg}") {
            bar.set_style(style);
        }
        Self { bar }
    }
}

impl Default for ConsoleUploadReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl AppUploadReporter for ConsoleUploadReporter {
    fn start(&self, apps: &[AppUploadKey]) {
        self.bar.set_length(apps.len() as u64);
        self.bar.enable_steady_tick(Duration::from_millis(120));
        self.bar.println(format!(
            "{} {}",
            "Uploading".bold(),
            format!("{} mobile application(s)", apps.len()).cyan()
        ));
        for app in apps {
            self.bar.println(format!(
                "  {} {}",
                app.app_path,
                format!("({})", app.app_id).dimmed()
            ));
        }
    }

    fn render_progress(&self, index: usize) {
        self.bar.set_position(index as u64);
        self.bar.set_message(format!(
            "uploading application {}/{}",
            index + 1,
            self.bar.length().unwrap_or_default()
        ));
    }

    fn report_success(&self) {
        if let Some(length) = self.bar.length() {
            self.bar.set_position(length);
        }
        self.bar
            .finish_with_message(format!("{}", "upload complete".green()));
    }

    fn report_failure(&self) {
        self.bar
            .abandon_with_message(format!("{}", "upload failed".red()));
    }
}

fn result_color(result: &TestResult) -> Color {
    if result.passed {
        Color::Green
    } else if result.execution_rule == ExecutionRule::Blocking {
        Color::Red
    } else {
        Color::Yellow
    }
}

pub fn format_result(result: &TestResult) -> String {
    let verdict = if result.timed_out {
        "TIMED OUT"
    } else if result.passed {
        "PASSED"
    } else {
        "FAILED"
    };
    let mut line = format!(
        "{} {} {}",
        verdict.color(result_color(result)).bold(),
        result.test.public_id.cyan(),
        format!("[{}]", result.location).dimmed()
    );
    if !result.test.name.is_empty() {
        line.push_str(&format!(" {}", result.test.name));
    }
    if result.execution_rule != ExecutionRule::Blocking {
        line.push_str(&format!(" {}", format!("({})", result.execution_rule.as_str()).dimmed()));
    }
    if let Some(failure) = result.result.as_ref().and_then(|r| r.failure.as_ref()) {
        line.push_str(&format!("\n  {} {}", failure.code.red(), failure.message));
    }
    line
}

pub fn format_summary(summary: &Summary, state: RunState) -> String {
    let mut lines = Vec::new();
    if let Some(batch_id) = &summary.batch_id {
        lines.push(format!("{} {}", "Batch:".bold(), batch_id.cyan()));
    }
    let counts = [
        ("passed", summary.passed, Color::Green),
        ("failed", summary.failed, Color::Red),
        ("failed (non-blocking)", summary.failed_non_blocking, Color::Yellow),
        ("skipped", summary.skipped, Color::White),
        ("timed out", summary.timed_out, Color::Yellow),
        ("critical errors", summary.critical_errors, Color::Red),
    ]
    .iter()
    .filter(|(_, count, _)| *count > 0)
    .map(|(label, count, color)| format!("{count} {label}").color(*color).to_string())
    .collect::<Vec<_>>();
    let counts = if counts.is_empty() {
        "no results".dimmed().to_string()
    } else {
        counts.join(", ")
    };
    lines.push(format!("{} {}", "Results:".bold(), counts));

    if !summary.tests_not_found.is_empty() {
        lines.push(format!(
            "{} {}",
            "Not found:".bold(),
            summary.tests_not_found.join(", ").yellow()
        ));
    }
    if state == RunState::TimedOut {
        lines.push(format!("{}", "Polling timed out before every result finished".yellow()));
    }
    lines.join("\n")
}

pub fn print_outcome(outcome: &RunOutcome) {
    for result in &outcome.results {
        println!("{}", format_result(result));
    }
    println!("{}", format_summary(&outcome.summary, outcome.state));
}
