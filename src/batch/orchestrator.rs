use std::path::Path;

use futures_util::{stream, StreamExt, TryStreamExt};
use tracing::{debug, info, warn};

use crate::{
    api::{Payload, ServerTest, SyntheticsApi},
    clock::Clock,
    error::{
        CiError, CiErrorCode, CriticalError, CriticalErrorCode, SyntheticsError, SyntheticsResult,
    },
    metadata::Metadata,
    mobile::{AppUploadCache, AppUploadKey, AppUploadReporter, AppUploader, SilentReporter},
    overrides::{build_test_payload, MobileBinding, TestPayload, UserConfigOverride},
};

use super::{
    abort::AbortSignal,
    models::{parse_public_id, RunConfig, RunOutcome, RunState, TriggerConfig},
    poller::BatchPoller,
};

/// A trigger whose test definition was found, with its effective overrides.
#[derive(Debug, Clone)]
struct ResolvedTest {
    test: ServerTest,
    config: UserConfigOverride,
}

/// Runs one batch: resolve tests, upload binaries, trigger, then poll.
///
/// The upload cache lives as long as the orchestrator, so artifacts uploaded
/// before a failure or an abort stay visible through [`Self::cache`].
pub struct BatchOrchestrator<'a> {
    api: &'a dyn SyntheticsApi,
    clock: &'a dyn Clock,
    reporter: &'a dyn AppUploadReporter,
    config: RunConfig,
    metadata: Option<Metadata>,
    abort: AbortSignal,
    cache: AppUploadCache,
    state: RunState,
}

impl<'a> BatchOrchestrator<'a> {
    pub fn new(api: &'a dyn SyntheticsApi, clock: &'a dyn Clock, config: RunConfig) -> Self {
        Self {
            api,
            clock,
            reporter: &SilentReporter,
            config,
            metadata: None,
            abort: AbortSignal::never(),
            cache: AppUploadCache::new(),
            state: RunState::Pending,
        }
    }

    pub fn with_reporter(mut self, reporter: &'a dyn AppUploadReporter) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = (!metadata.is_empty()).then_some(metadata);
        self
    }

    pub fn with_abort_signal(mut self, abort: AbortSignal) -> Self {
        self.abort = abort;
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn cache(&self) -> &AppUploadCache {
        &self.cache
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub async fn run(&mut self, triggers: &[TriggerConfig]) -> SyntheticsResult<RunOutcome> {
        match self.execute(triggers).await {
            Ok(outcome) => {
                self.transition(outcome.state);
                Ok(outcome)
            }
            Err(err) => {
                self.transition(RunState::Failed);
                Err(err)
            }
        }
    }

    fn transition(&mut self, next: RunState) {
        debug!(from = ?self.state, to = ?next, "run state");
        self.state = next;
    }

    async fn execute(&mut self, triggers: &[TriggerConfig]) -> SyntheticsResult<RunOutcome> {
        self.transition(RunState::Pending);
        let (resolved, tests_not_found) = self.resolve_tests(triggers).await?;
        if self.config.fail_on_missing_tests && !tests_not_found.is_empty() {
            return Err(CiError::new(
                CiErrorCode::MissingTests,
                format!("Cannot find tests: {}", tests_not_found.join(", ")),
            )
            .into());
        }

        self.transition(RunState::Uploading);
        self.cache
            .register_keys(resolved.iter().map(|r| (&r.config, &r.test)));
        self.upload_applications().await?;

        self.transition(RunState::Submitting);
        let payloads: Vec<TestPayload> = resolved.iter().map(|r| self.payload_for(r)).collect();
        if payloads.is_empty() {
            return Err(CiError::new(CiErrorCode::NoTestsToRun, "No tests to run").into());
        }
        let batch_id = self.trigger(&payloads).await?;

        self.transition(RunState::Polling);
        let tests: Vec<ServerTest> = resolved.into_iter().map(|r| r.test).collect();
        let poller = BatchPoller {
            api: self.api,
            clock: self.clock,
            config: &self.config,
            abort: &self.abort,
        };
        let mut outcome = poller.poll(&batch_id, &tests).await?;
        outcome.summary.batch_id = Some(batch_id);
        for public_id in &tests_not_found {
            outcome.summary.add_test_not_found(public_id);
        }
        Ok(outcome)
    }

    /// Fetches every trigger's test definition, in trigger order.
    async fn resolve_tests(
        &self,
        triggers: &[TriggerConfig],
    ) -> SyntheticsResult<(Vec<ResolvedTest>, Vec<String>)> {
        let api = self.api;
        let abort = &self.abort;
        let lookups: Vec<_> = stream::iter(triggers)
            .map(|trigger| async move {
                let public_id = parse_public_id(&trigger.id);
                abort.check()?;
                let lookup = api.get_test(&public_id).await;
                Ok::<_, SyntheticsError>((trigger, public_id, lookup))
            })
            .buffered(self.config.max_concurrent_test_fetches.max(1))
            .try_collect()
            .await?;

        let mut resolved = Vec::new();
        let mut not_found: Vec<String> = Vec::new();
        for (trigger, public_id, lookup) in lookups {
            match lookup {
                Ok(mut test) => {
                    test.suite = trigger.suite.clone();
                    resolved.push(ResolvedTest {
                        config: self.config.global.merged_with(&trigger.config),
                        test,
                    });
                }
                Err(err) if err.is_not_found() => {
                    warn!(public_id = %public_id, "test not found");
                    if !not_found.contains(&public_id) {
                        not_found.push(public_id);
                    }
                }
                Err(err) => {
                    return Err(CriticalError::new(
                        CriticalErrorCode::UnavailableTestConfig,
                        format!("Failed to get test {public_id}: {err}"),
                    )
                    .into())
                }
            }
        }
        Ok((resolved, not_found))
    }

    async fn upload_applications(&self) -> SyntheticsResult<()> {
        let apps = self.cache.apps_to_upload();
        if apps.is_empty() {
            return Ok(());
        }

        self.reporter.start(apps);
        let uploader = AppUploader::new(self.api, self.clock)
            .with_poll_options(self.config.upload_poll)
            .with_retry_policy(self.config.retry);
        let uploader = &uploader;
        let cache = &self.cache;
        let reporter = self.reporter;
        let abort = &self.abort;

        let uploads: SyntheticsResult<Vec<()>> = stream::iter(apps.iter().enumerate())
            .map(|(index, key)| async move {
                abort
                    .guard(cache.get_or_upload(key, || async move {
                        reporter.render_progress(index);
                        uploader
                            .upload(Path::new(&key.app_path), &key.app_id, None)
                            .await
                    }))
                    .await
                    .map(|_| ())
            })
            .buffer_unordered(self.config.max_concurrent_uploads.max(1))
            .try_collect()
            .await;

        match uploads {
            Ok(_) => {
                info!(count = apps.len(), "uploaded mobile applications");
                self.reporter.report_success();
                Ok(())
            }
            Err(err) => {
                self.reporter.report_failure();
                Err(err)
            }
        }
    }

    fn payload_for(&self, resolved: &ResolvedTest) -> TestPayload {
        let uploaded_reference = AppUploadKey::for_test(&resolved.config, &resolved.test)
            .and_then(|key| self.cache.lookup(&key))
            .map(|artifact| artifact.file_name.as_str());
        let binding = resolved
            .test
            .mobile_application_id()
            .map(|application_id| MobileBinding {
                application_id,
                uploaded_reference,
                version_id: resolved.config.mobile_application_version.as_deref(),
            });

        build_test_payload(&resolved.test, &resolved.config, binding.as_ref())
    }

    async fn trigger(&self, payloads: &[TestPayload]) -> SyntheticsResult<String> {
        let payload = Payload {
            metadata: self.metadata.as_ref(),
            tests: payloads,
        };
        let trigger = self
            .abort
            .guard(async {
                self.api.trigger_tests(&payload).await.map_err(|err| {
                    CriticalError::new(
                        CriticalErrorCode::TriggerTestsFailed,
                        format!("Failed to trigger tests: {err}"),
                    )
                    .into()
                })
            })
            .await?;
        info!(batch_id = %trigger.batch_id, tests = payloads.len(), "triggered tests");
        Ok(trigger.batch_id)
    }
}
