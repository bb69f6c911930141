use std::{
    collections::{BTreeMap, HashMap, VecDeque},
    sync::Mutex,
};

use async_trait::async_trait;

use crate::{error::EndpointError, mobile::FilePart, overrides::TestPayload};

use super::{
    EndpointResult, MultipartPresignedUrlsParams, MultipartPresignedUrlsResponse, NewVersionParams,
    PartResponse, Payload, SearchedTest, ServerBatch, ServerResult, ServerTest, SyntheticsApi,
    TestSearchResult, Trigger, UploadJobState, UploadJobStatus, ValidAppResult,
};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    GetTest(String),
    Search(String),
    Presign {
        app_id: String,
        app_size: u64,
        digests: Vec<String>,
    },
    UploadParts(Vec<u32>),
    Complete {
        app_id: String,
        upload_id: String,
        key: String,
        parts: Vec<PartResponse>,
        new_version: Option<NewVersionParams>,
    },
    UploadJob(String),
    Trigger(Vec<TestPayload>),
    GetBatch(String),
    GetResult(String),
}

/// Scripted in-memory backend. Queued responses are consumed in order and the
/// last one repeats.
#[derive(Default)]
pub(crate) struct FakeApi {
    tests: Mutex<HashMap<String, ServerTest>>,
    test_error: Mutex<Option<EndpointError>>,
    search_error: Mutex<Option<EndpointError>>,
    upload_jobs: Mutex<VecDeque<EndpointResult<UploadJobStatus>>>,
    presign_error: Mutex<Option<EndpointError>>,
    batches: Mutex<VecDeque<EndpointResult<ServerBatch>>>,
    results: Mutex<HashMap<String, ServerResult>>,
    calls: Mutex<Vec<Call>>,
}

pub(crate) fn valid_job() -> UploadJobStatus {
    UploadJobStatus {
        status: UploadJobState::Complete,
        is_valid: Some(true),
        valid_app_result: Some(ValidAppResult {
            app_version_uuid: Some("version-uuid".to_string()),
        }),
        invalid_app_result: None,
        user_error_result: None,
    }
}

fn next<T: Clone>(queue: &Mutex<VecDeque<T>>) -> Option<T> {
    let mut queue = queue.lock().unwrap();
    if queue.len() > 1 {
        queue.pop_front()
    } else {
        queue.front().cloned()
    }
}

impl FakeApi {
    pub fn new() -> Self {
        let api = Self::default();
        api.push_upload_job(Ok(valid_job()));
        api
    }

    pub fn with_test(self, test: ServerTest) -> Self {
        self.tests
            .lock()
            .unwrap()
            .insert(test.public_id.clone(), test);
        self
    }

    pub fn with_result(self, result_id: &str, result: ServerResult) -> Self {
        self.results
            .lock()
            .unwrap()
            .insert(result_id.to_string(), result);
        self
    }

    pub fn set_upload_jobs(&self, jobs: Vec<EndpointResult<UploadJobStatus>>) {
        *self.upload_jobs.lock().unwrap() = jobs.into();
    }

    pub fn push_upload_job(&self, job: EndpointResult<UploadJobStatus>) {
        self.upload_jobs.lock().unwrap().push_back(job);
    }

    pub fn fail_get_test(&self, err: EndpointError) {
        *self.test_error.lock().unwrap() = Some(err);
    }

    pub fn fail_search(&self, err: EndpointError) {
        *self.search_error.lock().unwrap() = Some(err);
    }

    pub fn fail_presign(&self, err: EndpointError) {
        *self.presign_error.lock().unwrap() = Some(err);
    }

    pub fn push_batch(&self, batch: EndpointResult<ServerBatch>) {
        self.batches.lock().unwrap().push_back(batch);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, matches: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| matches(c)).count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl SyntheticsApi for FakeApi {
    async fn get_test(&self, public_id: &str) -> EndpointResult<ServerTest> {
        self.record(Call::GetTest(public_id.to_string()));
        if let Some(err) = self.test_error.lock().unwrap().clone() {
            return Err(err);
        }
        self.tests
            .lock()
            .unwrap()
            .get(public_id)
            .cloned()
            .ok_or_else(|| EndpointError::new("test not found", Some(404)))
    }

    /// Matches every known test whose name or public id contains `query`.
    async fn search_tests(&self, query: &str) -> EndpointResult<TestSearchResult> {
        self.record(Call::Search(query.to_string()));
        if let Some(err) = self.search_error.lock().unwrap().clone() {
            return Err(err);
        }
        let mut tests: Vec<SearchedTest> = self
            .tests
            .lock()
            .unwrap()
            .values()
            .filter(|t| t.name.contains(query) || t.public_id.contains(query))
            .map(|t| SearchedTest {
                public_id: t.public_id.clone(),
            })
            .collect();
        tests.sort_by(|a, b| a.public_id.cmp(&b.public_id));
        Ok(TestSearchResult { tests })
    }

    async fn get_presigned_upload_urls(
        &self,
        app_id: &str,
        app_size: u64,
        parts: &[FilePart],
    ) -> EndpointResult<MultipartPresignedUrlsResponse> {
        self.record(Call::Presign {
            app_id: app_id.to_string(),
            app_size,
            digests: parts.iter().map(|p| p.md5.clone()).collect(),
        });
        if let Some(err) = self.presign_error.lock().unwrap().clone() {
            return Err(err);
        }
        Ok(MultipartPresignedUrlsResponse {
            file_name: format!("fileName-{app_id}"),
            multipart_presigned_urls_params: MultipartPresignedUrlsParams {
                key: format!("key-{app_id}"),
                upload_id: format!("upload-{app_id}"),
                urls: parts
                    .iter()
                    .map(|p| (p.part_number, format!("https://storage.test/{}", p.part_number)))
                    .collect::<BTreeMap<_, _>>(),
            },
        })
    }

    async fn upload_parts(
        &self,
        parts: &[FilePart],
        _params: &MultipartPresignedUrlsParams,
    ) -> EndpointResult<Vec<PartResponse>> {
        self.record(Call::UploadParts(
            parts.iter().map(|p| p.part_number).collect(),
        ));
        Ok(parts
            .iter()
            .map(|p| PartResponse {
                etag: format!("etag-{}", p.part_number),
                part_number: p.part_number,
            })
            .collect())
    }

    async fn complete_multipart_upload(
        &self,
        app_id: &str,
        upload_id: &str,
        key: &str,
        parts: &[PartResponse],
        new_version: Option<&NewVersionParams>,
    ) -> EndpointResult<String> {
        self.record(Call::Complete {
            app_id: app_id.to_string(),
            upload_id: upload_id.to_string(),
            key: key.to_string(),
            parts: parts.to_vec(),
            new_version: new_version.cloned(),
        });
        Ok(format!("job-{app_id}"))
    }

    async fn get_upload_job(&self, job_id: &str) -> EndpointResult<UploadJobStatus> {
        self.record(Call::UploadJob(job_id.to_string()));
        next(&self.upload_jobs).unwrap_or_else(|| Ok(valid_job()))
    }

    async fn trigger_tests(&self, payload: &Payload<'_>) -> EndpointResult<Trigger> {
        self.record(Call::Trigger(payload.tests.to_vec()));
        Ok(Trigger {
            batch_id: "batch-id".to_string(),
            locations: Vec::new(),
        })
    }

    async fn get_batch(&self, batch_id: &str) -> EndpointResult<ServerBatch> {
        self.record(Call::GetBatch(batch_id.to_string()));
        next(&self.batches).unwrap_or_else(|| Err(EndpointError::new("no batch scripted", Some(404))))
    }

    async fn get_result(&self, result_id: &str) -> EndpointResult<ServerResult> {
        self.record(Call::GetResult(result_id.to_string()));
        self.results
            .lock()
            .unwrap()
            .get(result_id)
            .cloned()
            .ok_or_else(|| EndpointError::new("result not found", Some(404)))
    }
}
