use std::collections::{HashMap, HashSet};

use chrono::Utc;
use futures_util::{stream, StreamExt, TryStreamExt};
use tracing::{debug, info, warn};

use crate::{
    api::{ResultInBatch, ResultStatus, ServerBatch, ServerResult, ServerTest, SyntheticsApi},
    clock::Clock,
    error::{CriticalError, CriticalErrorCode, EndpointError, SyntheticsError, SyntheticsResult},
    retry::retry_request,
};

use super::{
    abort::AbortSignal,
    models::{RunConfig, RunOutcome, RunState, Summary, TestResult},
};

/// Waits for a triggered batch to finish and folds its results.
pub(crate) struct BatchPoller<'a> {
    pub api: &'a dyn SyntheticsApi,
    pub clock: &'a dyn Clock,
    pub config: &'a RunConfig,
    pub abort: &'a AbortSignal,
}

fn poll_failed(err: EndpointError) -> SyntheticsError {
    CriticalError::new(
        CriticalErrorCode::PollResultsFailed,
        format!("Failed to poll results: {err}"),
    )
    .into()
}

/// Identity of an entry across polls. Entries without a result id are keyed by
/// test and location, numbered by occurrence so the response order is irrelevant.
fn entry_key(entry: &ResultInBatch, occurrences: &mut HashMap<(String, String), usize>) -> String {
    if let Some(id) = &entry.result_id {
        return id.clone();
    }
    let occurrence = occurrences
        .entry((entry.test_public_id.clone(), entry.location.clone()))
        .or_insert(0);
    *occurrence += 1;
    format!("{}@{}#{}", entry.test_public_id, entry.location, occurrence)
}

impl<'a> BatchPoller<'a> {
    pub async fn poll(&self, batch_id: &str, tests: &[ServerTest]) -> SyntheticsResult<RunOutcome> {
        let tests_by_id: HashMap<&str, &ServerTest> =
            tests.iter().map(|t| (t.public_id.as_str(), t)).collect();
        let deadline = self.clock.now() + self.config.polling_timeout;

        let mut seen = HashSet::new();
        let mut summary = Summary::default();
        let mut results = Vec::new();

        loop {
            let batch = self.fetch_batch(batch_id).await?;

            let mut unresolved = Vec::new();
            let mut to_fetch = Vec::new();
            let mut occurrences = HashMap::new();
            for entry in &batch.results {
                let key = entry_key(entry, &mut occurrences);
                if seen.contains(&key) {
                    continue;
                }
                match entry.status {
                    ResultStatus::Skipped => {
                        seen.insert(key);
                        summary.record_skipped();
                    }
                    status if status.is_terminal() => to_fetch.push((key, entry)),
                    _ => unresolved.push(entry),
                }
            }

            let fetched: Vec<(String, &ResultInBatch, Option<ServerResult>)> = stream::iter(to_fetch)
                .map(|(key, entry)| async move {
                    let result = match entry.result_id.as_deref() {
                        Some(id) => Some(self.fetch_result(id).await?),
                        None => None,
                    };
                    Ok::<_, SyntheticsError>((key, entry, result))
                })
                .buffered(self.config.max_concurrent_result_fetches.max(1))
                .try_collect()
                .await?;

            for (key, entry, result) in fetched {
                let test_result = self.to_test_result(&tests_by_id, entry, result);
                debug!(
                    test = %entry.test_public_id,
                    location = %entry.location,
                    passed = test_result.passed,
                    "received result"
                );
                seen.insert(key);
                summary.record(&test_result);
                results.push(test_result);
            }

            let batch_running = batch.status == ResultStatus::InProgress;
            if unresolved.is_empty() && !batch_running {
                info!(batch_id, results = results.len(), "batch finished");
                return Ok(RunOutcome {
                    state: RunState::Completed,
                    summary,
                    results,
                });
            }

            if self.clock.now() >= deadline {
                warn!(
                    batch_id,
                    unresolved = unresolved.len(),
                    batch_running,
                    "polling timeout reached, marking remaining results as timed out"
                );
                for entry in unresolved {
                    let test_result = self.timed_out_result(&tests_by_id, entry);
                    summary.record(&test_result);
                    results.push(test_result);
                }
                return Ok(RunOutcome {
                    state: RunState::TimedOut,
                    summary,
                    results,
                });
            }

            debug!(
                batch_id,
                unresolved = unresolved.len(),
                batch_running,
                "waiting for results"
            );
            self.abort.sleep(self.clock, self.config.poll_interval).await?;
        }
    }

    async fn fetch_batch(&self, batch_id: &str) -> SyntheticsResult<ServerBatch> {
        self.abort
            .guard(async {
                retry_request(self.clock, &self.config.retry, "batch poll", || {
                    self.api.get_batch(batch_id)
                })
                .await
                .map_err(poll_failed)
            })
            .await
    }

    async fn fetch_result(&self, result_id: &str) -> SyntheticsResult<ServerResult> {
        self.abort
            .guard(async {
                retry_request(self.clock, &self.config.retry, "result fetch", || {
                    self.api.get_result(result_id)
                })
                .await
                .map_err(poll_failed)
            })
            .await
    }

    fn to_test_result(
        &self,
        tests: &HashMap<&str, &ServerTest>,
        entry: &ResultInBatch,
        result: Option<ServerResult>,
    ) -> TestResult {
        let timed_out = entry.timed_out.unwrap_or(false);
        let server_passed = result
            .as_ref()
            .map(|r| r.passed)
            .unwrap_or(entry.status == ResultStatus::Passed);
        let critical = result.as_ref().is_some_and(ServerResult::is_critical);

        TestResult {
            test: test_for(tests, entry),
            location: entry.location.clone(),
            execution_rule: entry.execution_rule,
            result_id: entry.result_id.clone(),
            passed: self.config.result_passed(server_passed, timed_out, critical),
            result,
            timed_out,
            timestamp: Utc::now(),
        }
    }

    fn timed_out_result(&self, tests: &HashMap<&str, &ServerTest>, entry: &ResultInBatch) -> TestResult {
        TestResult {
            test: test_for(tests, entry),
            location: entry.location.clone(),
            execution_rule: entry.execution_rule,
            result_id: entry.result_id.clone(),
            result: None,
            timed_out: true,
            passed: self.config.result_passed(false, true, false),
            timestamp: Utc::now(),
        }
    }
}

fn test_for(tests: &HashMap<&str, &ServerTest>, entry: &ResultInBatch) -> ServerTest {
    tests
        .get(entry.test_public_id.as_str())
        .map(|test| (*test).clone())
        .unwrap_or_else(|| ServerTest {
            public_id: entry.test_public_id.clone(),
            ..Default::default()
        })
}
