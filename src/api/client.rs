use async_trait::async_trait;
use futures_util::{stream, StreamExt, TryStreamExt};
use reqwest::{header::ETAG, Client, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::{error::EndpointError, mobile::FilePart};

use super::{
    models::{
        MultipartPresignedUrlsParams, MultipartPresignedUrlsResponse, NewVersionParams, PartDigest,
        PartResponse, Payload, ServerBatch, ServerResult, ServerTest, TestSearchResult, Trigger,
        UploadJobStatus,
    },
    EndpointResult, SyntheticsApi,
};

const API_KEY_HEADER: &str = "X-Api-Key";
const APP_KEY_HEADER: &str = "X-Application-Key";
const MAX_CONCURRENT_PART_UPLOADS: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiCredentials {
    pub api_key: String,
    pub app_key: String,
}

/// HTTP implementation of [`SyntheticsApi`].
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: Url,
    credentials: ApiCredentials,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PresignedUrlsRequest<'a> {
    app_size: u64,
    parts: Vec<PartDigest<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CompleteUploadRequest<'a> {
    upload_id: &'a str,
    key: &'a str,
    parts: &'a [PartResponse],
    #[serde(flatten)]
    new_version: Option<&'a NewVersionParams>,
}

#[derive(Deserialize)]
struct CompleteUploadResponse {
    job_id: String,
}

#[derive(Deserialize)]
struct BatchEnvelope {
    data: ServerBatch,
}

impl ApiClient {
    pub fn new(base_url: &str, credentials: ApiCredentials) -> EndpointResult<Self> {
        let mut base_url = Url::parse(base_url)
            .map_err(|err| EndpointError::local(format!("invalid base URL {base_url}: {err}")))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let http = Client::builder()
            .user_agent(concat!("synthetics-ci/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url,
            credentials,
        })
    }

    /// Site such as `example.com` maps to `https://api.example.com/`.
    pub fn base_url_for_site(site: &str) -> String {
        format!("https://api.{}/", site.trim_end_matches('/'))
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> EndpointResult<Url> {
        self.base_url
            .join(path)
            .map_err(|err| EndpointError::local(format!("invalid endpoint {path}: {err}")))
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header(API_KEY_HEADER, &self.credentials.api_key)
            .header(APP_KEY_HEADER, &self.credentials.app_key)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> EndpointResult<T> {
        let url = self.endpoint(path)?;
        debug!(%url, "GET");
        let response = self.authorized(self.http.get(url)).send().await?;
        read_json(response).await
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> EndpointResult<T> {
        let url = self.endpoint(path)?;
        debug!(%url, "POST");
        let response = self.authorized(self.http.post(url)).json(body).send().await?;
        read_json(response).await
    }

    async fn upload_part(&self, part: &FilePart, target: &str) -> EndpointResult<PartResponse> {
        let response = self
            .http
            .put(target)
            .header("Content-MD5", &part.md5)
            .body(part.blob.clone())
            .send()
            .await?;
        let response = check_status(response).await?;

        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
            .ok_or_else(|| {
                EndpointError::new(
                    format!("missing ETag in response for part {}", part.part_number),
                    Some(response.status().as_u16()),
                )
            })?;

        Ok(PartResponse {
            etag,
            part_number: part.part_number,
        })
    }
}

async fn check_status(response: Response) -> EndpointResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let url = response.url().clone();
    let body = response.text().await.unwrap_or_default();
    Err(EndpointError::new(
        format!("{} returned {}: {}", url.path(), status, body.trim()),
        Some(status.as_u16()),
    ))
}

async fn read_json<T: DeserializeOwned>(response: Response) -> EndpointResult<T> {
    let response = check_status(response).await?;
    Ok(response.json::<T>().await?)
}

#[async_trait]
impl SyntheticsApi for ApiClient {
    async fn get_test(&self, public_id: &str) -> EndpointResult<ServerTest> {
        self.get_json(&format!("api/v1/synthetics/tests/{public_id}"))
            .await
    }

    async fn search_tests(&self, query: &str) -> EndpointResult<TestSearchResult> {
        let mut url = self.endpoint("api/v1/synthetics/tests/search")?;
        url.query_pairs_mut().append_pair("text", query);
        debug!(%url, "GET");
        let response = self.authorized(self.http.get(url)).send().await?;
        read_json(response).await
    }

    async fn get_presigned_upload_urls(
        &self,
        app_id: &str,
        app_size: u64,
        parts: &[FilePart],
    ) -> EndpointResult<MultipartPresignedUrlsResponse> {
        let body = PresignedUrlsRequest {
            app_size,
            parts: parts
                .iter()
                .map(|part| PartDigest {
                    md5: &part.md5,
                    part_number: part.part_number,
                })
                .collect(),
        };
        self.post_json(
            &format!("api/unstable/synthetics/mobile/applications/{app_id}/multipart-presigned-urls"),
            &body,
        )
        .await
    }

    async fn upload_parts(
        &self,
        parts: &[FilePart],
        params: &MultipartPresignedUrlsParams,
    ) -> EndpointResult<Vec<PartResponse>> {
        let uploads = parts.iter().map(|part| async move {
            let target = params.urls.get(&part.part_number).ok_or_else(|| {
                EndpointError::local(format!("no presigned URL for part {}", part.part_number))
            })?;
            self.upload_part(part, target).await
        }).collect::<Vec<_>>();

        let mut responses: Vec<PartResponse> = stream::iter(uploads)
            .buffer_unordered(MAX_CONCURRENT_PART_UPLOADS)
            .try_collect()
            .await?;
        responses.sort_by_key(|r| r.part_number);
        Ok(responses)
    }

    async fn complete_multipart_upload(
        &self,
        app_id: &str,
        upload_id: &str,
        key: &str,
        parts: &[PartResponse],
        new_version: Option<&NewVersionParams>,
    ) -> EndpointResult<String> {
        let body = CompleteUploadRequest {
            upload_id,
            key,
            parts,
            new_version,
        };
        let response: CompleteUploadResponse = self
            .post_json(
                &format!(
                    "api/unstable/synthetics/mobile/applications/{app_id}/multipart-upload-complete"
                ),
                &body,
            )
            .await?;
        Ok(response.job_id)
    }

    async fn get_upload_job(&self, job_id: &str) -> EndpointResult<UploadJobStatus> {
        self.get_json(&format!(
            "api/unstable/synthetics/mobile/applications/validation-job/{job_id}"
        ))
        .await
    }

    async fn trigger_tests(&self, payload: &Payload<'_>) -> EndpointResult<Trigger> {
        self.post_json("api/v1/synthetics/tests/trigger/ci", payload)
            .await
    }

    async fn get_batch(&self, batch_id: &str) -> EndpointResult<ServerBatch> {
        let envelope: BatchEnvelope = self
            .get_json(&format!("api/v1/synthetics/ci/batch/{batch_id}"))
            .await?;
        Ok(envelope.data)
    }

    async fn get_result(&self, result_id: &str) -> EndpointResult<ServerResult> {
        self.get_json(&format!("api/v1/synthetics/tests/results/{result_id}"))
            .await
    }
}
