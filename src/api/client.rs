//! HTTP client for the rendering service.

use super::RenderService;
use crate::error::{ServiceError, ServiceResult};
use crate::model::{JobId, JobRecord, JobStatusSnapshot, PreviewImage, RenderConfiguration};
use async_trait::async_trait;
use base64::Engine as _;
use futures::{Stream, StreamExt};
use reqwest::{Client, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::debug;

#[derive(Debug, Clone)]
pub(crate) struct ClientConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5000".to_string(),
            timeout: Duration::from_secs(30),
            user_agent: format!("chronoscope-cli/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

pub(crate) struct ServiceClient {
    http: Client,
    base_url: Url,
}

#[derive(Deserialize)]
struct BranchesBody {
    branches: Vec<String>,
}

#[derive(Deserialize)]
struct SubmitBody {
    job_id: JobId,
}

#[derive(Deserialize)]
struct PreviewBody {
    image: String,
}

#[derive(Deserialize)]
struct JobsBody {
    jobs: Vec<JobRecord>,
}

impl ServiceClient {
    pub fn new(cfg: &ClientConfig) -> ServiceResult<Self> {
        let http = Client::builder()
            .timeout(cfg.timeout)
            .user_agent(cfg.user_agent.clone())
            .build()?;
        let base_url = Url::parse(&cfg.base_url).map_err(|e| {
            ServiceError::Request(format!("invalid base URL {:?}: {e}", cfg.base_url))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ServiceError::Request(format!(
                "invalid base URL {:?}",
                cfg.base_url
            )));
        }
        Ok(Self { http, base_url })
    }

    /// `segments` are appended to the base path one by one, each percent-encoded.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}

/// How a JSON body's `error` field is read.
#[derive(Clone, Copy, PartialEq, Eq)]
enum ErrorField {
    /// Any non-null `error` fails the request.
    Failure,
    /// `error` belongs to the payload; only its presence without the payload fails.
    Payload,
}

/// Read a JSON body and apply the service's error convention.
///
/// `payload_key` names the field a successful response must carry. An `error` string is
/// a server-reported failure even on HTTP 200, except on the status endpoint where it
/// is the job's own failure text and sits next to the payload.
async fn decode_body<T: DeserializeOwned>(
    resp: Response,
    payload_key: &str,
    error_field: ErrorField,
) -> ServiceResult<T> {
    let status = resp.status();
    let bytes = resp.bytes().await?;
    let value: Option<Value> = serde_json::from_slice(&bytes).ok();
    let reported = value
        .as_ref()
        .and_then(|v| v.get("error"))
        .and_then(Value::as_str)
        .map(str::to_string);

    if !status.is_success() {
        return Err(ServiceError::Request(
            reported.unwrap_or_else(|| format!("service returned {status}")),
        ));
    }

    let Some(value) = value else {
        return Err(ServiceError::Decode("response body is not JSON".into()));
    };
    if error_field == ErrorField::Failure {
        if let Some(msg) = reported {
            return Err(ServiceError::Server(msg));
        }
    }
    let has_payload = value.get(payload_key).is_some_and(|v| !v.is_null());
    if !has_payload {
        return Err(match reported {
            Some(msg) => ServiceError::Server(msg),
            None => ServiceError::Decode(format!("missing `{payload_key}` in response")),
        });
    }
    Ok(serde_json::from_value(value)?)
}

fn decode_preview(encoded: &str) -> ServiceResult<PreviewImage> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| ServiceError::Decode(format!("preview is not base64: {e}")))?;
    let format = image::guess_format(&bytes)
        .map_err(|e| ServiceError::Decode(format!("unrecognised preview image: {e}")))?;
    let (width, height) = image::ImageReader::with_format(Cursor::new(&bytes), format)
        .into_dimensions()
        .map_err(|e| ServiceError::Decode(format!("unreadable preview image: {e}")))?;
    Ok(PreviewImage {
        bytes,
        format,
        width,
        height,
    })
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".part");
    dest.with_file_name(name)
}

/// Stream `body` into a `.part` file next to `dest` and move it into place only once
/// every chunk has arrived. On error the partial file is removed and `dest` is untouched.
async fn write_atomically<S, B, E>(body: S, dest: &Path) -> ServiceResult<u64>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Into<ServiceError>,
{
    let partial = partial_path(dest);
    let result = async {
        let mut file = tokio::fs::File::create(&partial).await?;
        let mut written = 0u64;
        futures::pin_mut!(body);
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(Into::into)?;
            file.write_all(chunk.as_ref()).await?;
            written += chunk.as_ref().len() as u64;
        }
        file.flush().await?;
        Ok::<_, ServiceError>(written)
    }
    .await;

    match result {
        Ok(written) => {
            tokio::fs::rename(&partial, dest).await?;
            Ok(written)
        }
        Err(e) => {
            let _ = tokio::fs::remove_file(&partial).await;
            Err(e)
        }
    }
}

#[async_trait]
impl RenderService for ServiceClient {
    async fn list_branches(&self, repo_path: &str) -> ServiceResult<Vec<String>> {
        let url = self.url(&["api", "branches"]);
        debug!(%url, repo_path, "listing branches");
        let resp = self
            .http
            .post(url)
            .json(&serde_json::json!({ "repo_path": repo_path }))
            .send()
            .await?;
        let body: BranchesBody = decode_body(resp, "branches", ErrorField::Failure).await?;
        Ok(body.branches)
    }

    async fn submit_job(&self, config: &RenderConfiguration) -> ServiceResult<JobId> {
        let url = self.url(&["api", "generate"]);
        debug!(%url, repo_path = %config.repo_path, "submitting render job");
        let resp = self.http.post(url).json(config).send().await?;
        let body: SubmitBody = decode_body(resp, "job_id", ErrorField::Failure).await?;
        Ok(body.job_id)
    }

    async fn job_status(&self, job_id: &JobId) -> ServiceResult<JobStatusSnapshot> {
        let url = self.url(&["api", "status", job_id.as_str()]);
        let resp = self.http.get(url).send().await?;
        decode_body(resp, "status", ErrorField::Payload).await
    }

    async fn download(&self, job_id: &JobId, dest: &Path) -> ServiceResult<u64> {
        let url = self.url(&["api", "download", job_id.as_str()]);
        debug!(%url, dest = %dest.display(), "downloading output");
        let resp = self.http.get(url).send().await?;

        let is_json = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/json"));
        if !resp.status().is_success() || is_json {
            // Error bodies are JSON; `decode_body` maps them. A JSON body without an
            // `error` field on 200 is still not a file.
            let status = resp.status();
            return match decode_body::<Value>(resp, "error", ErrorField::Failure).await {
                Ok(_) => Err(ServiceError::Server("download failed".into())),
                Err(ServiceError::Decode(_)) if status == StatusCode::OK => Err(
                    ServiceError::Decode("expected a file, got a JSON document".into()),
                ),
                Err(e) => Err(e),
            };
        }

        write_atomically(resp.bytes_stream(), dest).await
    }

    async fn preview(&self, config: &RenderConfiguration) -> ServiceResult<PreviewImage> {
        let url = self.url(&["api", "preview"]);
        debug!(%url, repo_path = %config.repo_path, "requesting preview frame");
        let resp = self.http.post(url).json(config).send().await?;
        let body: PreviewBody = decode_body(resp, "image", ErrorField::Failure).await?;
        decode_preview(&body.image)
    }

    async fn list_jobs(&self) -> ServiceResult<Vec<JobRecord>> {
        let url = self.url(&["api", "jobs"]);
        let resp = self.http.get(url).send().await?;
        let body: JobsBody = decode_body(resp, "jobs", ErrorField::Failure).await?;
        Ok(body.jobs)
    }
}
