use std::{path::Path, time::Duration};

use tracing::{debug, info};

use crate::{
    api::{NewVersionParams, SyntheticsApi, UploadJobState, UploadJobStatus},
    clock::Clock,
    error::{CiError, CiErrorCode, CriticalError, CriticalErrorCode, SyntheticsResult},
    retry::{retry_request, RetryPolicy},
};

use super::{
    cache::{AppUploadKey, UploadedArtifact},
    chunker::get_size_and_parts,
};

const INVALID_APP_PREFIX: &str = "Mobile application failed validation for reason: ";

/// Observer of the upload phase of a run. Never affects control flow.
pub trait AppUploadReporter: Send + Sync {
    fn start(&self, apps: &[AppUploadKey]);
    /// Called before upload number `index` (0-based) starts.
    fn render_progress(&self, index: usize);
    fn report_success(&self);
    fn report_failure(&self);
}

/// Reporter that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentReporter;

impl AppUploadReporter for SilentReporter {
    fn start(&self, _apps: &[AppUploadKey]) {}
    fn render_progress(&self, _index: usize) {}
    fn report_success(&self) {}
    fn report_failure(&self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadPollOptions {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for UploadPollOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_attempts: 300,
        }
    }
}

/// Drives the multi-part upload protocol for one binary.
pub struct AppUploader<'a> {
    api: &'a dyn SyntheticsApi,
    clock: &'a dyn Clock,
    poll: UploadPollOptions,
    retry: RetryPolicy,
}

impl<'a> AppUploader<'a> {
    pub fn new(api: &'a dyn SyntheticsApi, clock: &'a dyn Clock) -> Self {
        Self {
            api,
            clock,
            poll: UploadPollOptions::default(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_poll_options(mut self, poll: UploadPollOptions) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub async fn upload(
        &self,
        app_path: &Path,
        app_id: &str,
        new_version: Option<&NewVersionParams>,
    ) -> SyntheticsResult<UploadedArtifact> {
        let size_and_parts = get_size_and_parts(app_path).await?;
        info!(
            app_id,
            path = %app_path.display(),
            size = size_and_parts.app_size,
            parts = size_and_parts.parts.len(),
            "uploading mobile application"
        );

        let presigned = self
            .api
            .get_presigned_upload_urls(app_id, size_and_parts.app_size, &size_and_parts.parts)
            .await?;
        let params = &presigned.multipart_presigned_urls_params;

        let part_responses = self
            .api
            .upload_parts(&size_and_parts.parts, params)
            .await?;

        let job_id = self
            .api
            .complete_multipart_upload(
                app_id,
                &params.upload_id,
                &params.key,
                &part_responses,
                new_version,
            )
            .await?;
        debug!(app_id, job_id = %job_id, "upload complete, waiting for validation");

        let status = self.wait_for_validation(&job_id).await?;
        validate_upload_job(presigned.file_name, status)
    }

    async fn wait_for_validation(&self, job_id: &str) -> SyntheticsResult<UploadJobStatus> {
        for attempt in 1..=self.poll.max_attempts {
            let status = retry_request(self.clock, &self.retry, "upload validation poll", || {
                self.api.get_upload_job(job_id)
            })
            .await?;

            if status.status.is_terminal() {
                return Ok(status);
            }
            debug!(job_id, attempt, "mobile application still being validated");
            self.clock.sleep(self.poll.interval).await;
        }

        Err(CriticalError::new(
            CriticalErrorCode::MobileAppUploadTimeout,
            format!(
                "Mobile application validation did not finish after {} attempts.",
                self.poll.max_attempts
            ),
        )
        .into())
    }
}

/// Maps the terminal state of a validation job to the upload outcome.
pub fn validate_upload_job(
    file_name: String,
    status: UploadJobStatus,
) -> SyntheticsResult<UploadedArtifact> {
    match status.status {
        UploadJobState::Complete if status.is_valid == Some(true) => Ok(UploadedArtifact {
            file_name,
            validation: status,
        }),
        UploadJobState::Complete => {
            let reason = status
                .invalid_app_result
                .map(|r| r.invalid_message)
                .unwrap_or_default();
            Err(CiError::new(
                CiErrorCode::InvalidMobileApp,
                format!("{INVALID_APP_PREFIX}{reason}"),
            )
            .into())
        }
        UploadJobState::UserError => {
            let reason = status
                .user_error_result
                .map(|r| r.user_error_message)
                .unwrap_or_default();
            Err(CiError::new(
                CiErrorCode::InvalidMobileAppUploadParameters,
                format!("{INVALID_APP_PREFIX}{reason}"),
            )
            .into())
        }
        _ => Err(CriticalError::new(
            CriticalErrorCode::UnknownMobileAppUploadFailure,
            "Unknown mobile application upload error.",
        )
        .into()),
    }
}

/// Settings of the `upload-application` command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadApplicationConfig {
    pub mobile_application_id: Option<String>,
    pub mobile_application_version_file_path: Option<String>,
    pub version_name: Option<String>,
    pub latest: bool,
}

fn required<'c>(value: Option<&'c str>, code: CiErrorCode, what: &str) -> SyntheticsResult<&'c str> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(CiError::new(code, format!("Missing {what}")).into()),
    }
}

/// Uploads a new version of an application, outside of any test run.
pub async fn upload_application_version(
    uploader: &AppUploader<'_>,
    config: &UploadApplicationConfig,
) -> SyntheticsResult<UploadedArtifact> {
    let app_id = required(
        config.mobile_application_id.as_deref(),
        CiErrorCode::MissingMobileApplicationId,
        "mobile application ID",
    )?;
    let file_path = required(
        config.mobile_application_version_file_path.as_deref(),
        CiErrorCode::MissingMobileApplicationPath,
        "mobile application file path",
    )?;
    let version_name = required(
        config.version_name.as_deref(),
        CiErrorCode::MissingMobileVersionName,
        "version name",
    )?;

    let new_version = NewVersionParams {
        original_file_name: file_path.to_string(),
        version_name: version_name.to_string(),
        is_latest: config.latest,
    };
    let artifact = uploader
        .upload(Path::new(file_path), app_id, Some(&new_version))
        .await?;
    info!(
        app_id,
        version_name,
        file_name = %artifact.file_name,
        "created new mobile application version"
    );
    Ok(artifact)
}
