use std::{fs, path::Path};

use anyhow::{bail, Context, Result};

use crate::batch::TestResult;

pub const CSV_HEADER: &[&str] = &[
    "test_public_id",
    "test_name",
    "location",
    "execution_rule",
    "result_id",
    "passed",
    "timed_out",
    "critical",
    "failure_code",
    "failure_message",
    "timestamp",
];

fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

fn row(result: &TestResult) -> Vec<String> {
    let failure = result.result.as_ref().and_then(|r| r.failure.as_ref());
    vec![
        result.test.public_id.clone(),
        result.test.name.clone(),
        result.location.clone(),
        result.execution_rule.as_str().to_string(),
        result.result_id.clone().unwrap_or_default(),
        result.passed.to_string(),
        result.timed_out.to_string(),
        result.is_critical().to_string(),
        failure.map(|f| f.code.clone()).unwrap_or_default(),
        failure.map(|f| f.message.clone()).unwrap_or_default(),
        result.timestamp.to_rfc3339(),
    ]
}

/// Header row as is, every value quoted, rows separated by `\n`.
pub fn results_to_csv(results: &[TestResult]) -> String {
    let mut lines = vec![CSV_HEADER.join(",")];
    lines.extend(results.iter().map(|result| {
        row(result)
            .iter()
            .map(|value| quote(value))
            .collect::<Vec<_>>()
            .join(",")
    }));
    lines.join("\n")
}

pub fn parse_csv(input: &str) -> Result<Vec<Vec<String>>> {
    let mut rows = Vec::new();
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if quoted {
            match ch {
                '"' if chars.peek() == Some(&'"') => {
                    field.push('"');
                    chars.next();
                }
                '"' => quoted = false,
                _ => field.push(ch),
            }
            continue;
        }
        match ch {
            '"' if field.is_empty() => quoted = true,
            ',' => fields.push(std::mem::take(&mut field)),
            '\n' => {
                fields.push(std::mem::take(&mut field));
                rows.push(std::mem::take(&mut fields));
            }
            '\r' if chars.peek() == Some(&'\n') => {}
            _ => field.push(ch),
        }
    }

    if quoted {
        bail!("unterminated quoted field");
    }
    if !field.is_empty() || !fields.is_empty() {
        fields.push(field);
        rows.push(fields);
    }
    Ok(rows)
}

pub fn save_results_file(path: &Path, results: &[TestResult]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating report directory {}", parent.display()))?;
    }
    fs::write(path, results_to_csv(results))
        .with_context(|| format!("writing results to {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ExecutionRule, Failure, ServerResult, ServerTest};
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn result() -> TestResult {
        TestResult {
            test: ServerTest {
                public_id: "abc-def-ghi".to_string(),
                name: "Checkout, \"happy\" path".to_string(),
                ..Default::default()
            },
            location: "aws:eu-central-1".to_string(),
            execution_rule: ExecutionRule::NonBlocking,
            result_id: Some("123".to_string()),
            result: Some(ServerResult {
                passed: false,
                failure: Some(Failure {
                    code: "ASSERTION_FAILURE".to_string(),
                    message: "expected 200,\ngot 500".to_string(),
                }),
                unhealthy: None,
                extras: Default::default(),
            }),
            timed_out: false,
            passed: false,
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn quotes_values_and_keeps_header_plain() {
        let csv = results_to_csv(&[result()]);
        let header = csv.lines().next().unwrap();
        assert_eq!(header, CSV_HEADER.join(","));
        assert!(csv.contains(r#""Checkout, ""happy"" path""#));
    }

    #[test]
    fn parse_recovers_fields() -> Result<()> {
        let results = vec![result(), result()];
        let rows = parse_csv(&results_to_csv(&results))?;

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], CSV_HEADER.iter().map(|h| h.to_string()).collect::<Vec<_>>());
        assert_eq!(
            rows[1],
            vec![
                "abc-def-ghi",
                "Checkout, \"happy\" path",
                "aws:eu-central-1",
                "non_blocking",
                "123",
                "false",
                "false",
                "false",
                "ASSERTION_FAILURE",
                "expected 200,\ngot 500",
                "2024-05-01T12:00:00+00:00",
            ]
        );
        assert_eq!(rows[1], rows[2]);
        Ok(())
    }

    #[test]
    fn parse_rejects_unterminated_quotes() {
        assert!(parse_csv("a,b\n\"open").is_err());
    }

    #[test]
    fn save_results_creates_parent_directories() -> Result<()> {
        let temp = tempdir()?;
        let path = temp.path().join("reports/results.csv");
        save_results_file(&path, &[result()])?;

        let written = fs::read_to_string(&path)?;
        assert_eq!(written, results_to_csv(&[result()]));
        Ok(())
    }
}
