use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{metadata::Metadata, overrides::TestPayload};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionRule {
    #[default]
    Blocking,
    NonBlocking,
    Skipped,
}

impl ExecutionRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionRule::Blocking => "blocking",
            ExecutionRule::NonBlocking => "non_blocking",
            ExecutionRule::Skipped => "skipped",
        }
    }

    fn strictness(&self) -> u8 {
        match self {
            ExecutionRule::Blocking => 0,
            ExecutionRule::NonBlocking => 1,
            ExecutionRule::Skipped => 2,
        }
    }

    /// `skipped` beats `non_blocking`, which beats `blocking`.
    pub fn strictest(self, other: ExecutionRule) -> ExecutionRule {
        if other.strictness() > self.strictness() {
            other
        } else {
            self
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceType {
    Latest,
    Version,
    Temporary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MobileApplication {
    pub application_id: String,
    pub reference_id: String,
    pub reference_type: ReferenceType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CiOptions {
    pub execution_rule: ExecutionRule,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TestOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ci: Option<CiOptions>,
    #[serde(rename = "mobileApplication", skip_serializing_if = "Option::is_none")]
    pub mobile_application: Option<MobileApplication>,
    #[serde(flatten)]
    pub extras: BTreeMap<String, Value>,
}

/// Test definition as stored on the backend, plus the client-side suite label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ServerTest {
    pub public_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub test_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    pub locations: Vec<String>,
    pub options: TestOptions,
    pub config: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suite: Option<String>,
}

impl ServerTest {
    pub fn mobile_application_id(&self) -> Option<&str> {
        self.options
            .mobile_application
            .as_ref()
            .map(|app| app.application_id.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
pub struct SearchedTest {
    pub public_id: String,
}

/// Tests matching a search query.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
#[serde(default)]
pub struct TestSearchResult {
    pub tests: Vec<SearchedTest>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartDigest<'a> {
    pub md5: &'a str,
    pub part_number: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultipartPresignedUrlsParams {
    pub key: String,
    pub upload_id: String,
    /// Presigned target per part number.
    pub urls: BTreeMap<u32, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultipartPresignedUrlsResponse {
    pub file_name: String,
    pub multipart_presigned_urls_params: MultipartPresignedUrlsParams,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartResponse {
    #[serde(rename = "ETag")]
    pub etag: String,
    #[serde(rename = "PartNumber")]
    pub part_number: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewVersionParams {
    pub original_file_name: String,
    pub version_name: String,
    pub is_latest: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadJobState {
    Pending,
    InProgress,
    Complete,
    UserError,
    Error,
    #[serde(other)]
    Unknown,
}

impl UploadJobState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, UploadJobState::Pending | UploadJobState::InProgress)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidAppResult {
    pub invalid_message: String,
    pub invalid_reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserErrorResult {
    pub user_error_message: String,
    pub user_error_reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidAppResult {
    #[serde(default)]
    pub app_version_uuid: Option<String>,
}

/// State of the asynchronous validation job started by a completed upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadJobStatus {
    pub status: UploadJobState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_valid: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_app_result: Option<ValidAppResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invalid_app_result: Option<InvalidAppResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_error_result: Option<UserErrorResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Payload<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<&'a Metadata>,
    pub tests: &'a [TestPayload],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Location {
    pub id: u64,
    pub name: String,
    pub display_name: String,
    pub region: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    pub batch_id: String,
    #[serde(default)]
    pub locations: Vec<Location>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Passed,
    Failed,
    InProgress,
    Skipped,
}

impl ResultStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ResultStatus::Passed | ResultStatus::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultInBatch {
    pub test_public_id: String,
    pub location: String,
    pub execution_rule: ExecutionRule,
    pub status: ResultStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timed_out: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerBatch {
    pub status: ResultStatus,
    pub results: Vec<ResultInBatch>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub code: String,
    pub message: String,
}

/// Raw result payload; fields beyond the verdict are kept opaque.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerResult {
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<Failure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unhealthy: Option<bool>,
    #[serde(flatten)]
    pub extras: BTreeMap<String, Value>,
}

impl ServerResult {
    pub fn is_critical(&self) -> bool {
        self.unhealthy.unwrap_or(false)
    }
}
