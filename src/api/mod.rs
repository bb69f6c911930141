mod client;
mod models;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{ApiClient, ApiCredentials};
pub use models::{
    CiOptions, ExecutionRule, Failure, InvalidAppResult, Location, MobileApplication,
    MultipartPresignedUrlsParams, MultipartPresignedUrlsResponse, NewVersionParams, PartDigest,
    PartResponse, Payload, ReferenceType, ResultInBatch, ResultStatus, SearchedTest, ServerBatch,
    ServerResult, ServerTest, TestOptions, TestSearchResult, Trigger, UploadJobState,
    UploadJobStatus, UserErrorResult, ValidAppResult,
};

use async_trait::async_trait;

use crate::{error::EndpointError, mobile::FilePart};

pub type EndpointResult<T> = Result<T, EndpointError>;

/// Backend calls the upload and batch engine depends on.
#[async_trait]
pub trait SyntheticsApi: Send + Sync {
    async fn get_test(&self, public_id: &str) -> EndpointResult<ServerTest>;

    /// Full-text search over the tests of the organization.
    async fn search_tests(&self, query: &str) -> EndpointResult<TestSearchResult>;

    /// Lets the backend short-circuit when an identical binary already exists.
    async fn get_presigned_upload_urls(
        &self,
        app_id: &str,
        app_size: u64,
        parts: &[FilePart],
    ) -> EndpointResult<MultipartPresignedUrlsResponse>;

    async fn upload_parts(
        &self,
        parts: &[FilePart],
        params: &MultipartPresignedUrlsParams,
    ) -> EndpointResult<Vec<PartResponse>>;

    /// Returns the id of the validation job.
    async fn complete_multipart_upload(
        &self,
        app_id: &str,
        upload_id: &str,
        key: &str,
        parts: &[PartResponse],
        new_version: Option<&NewVersionParams>,
    ) -> EndpointResult<String>;

    async fn get_upload_job(&self, job_id: &str) -> EndpointResult<UploadJobStatus>;

    async fn trigger_tests(&self, payload: &Payload<'_>) -> EndpointResult<Trigger>;

    async fn get_batch(&self, batch_id: &str) -> EndpointResult<ServerBatch>;

    async fn get_result(&self, result_id: &str) -> EndpointResult<ServerResult>;
}
