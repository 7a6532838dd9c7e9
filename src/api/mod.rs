//! Rendering service contract and its HTTP implementation.

mod client;
#[cfg(test)]
pub(crate) mod fake;

use crate::error::ServiceResult;
use crate::model::{JobId, JobRecord, JobStatusSnapshot, PreviewImage, RenderConfiguration};
use async_trait::async_trait;
use std::path::Path;

pub(crate) use client::{ClientConfig, ServiceClient};

/// The six actions the rendering service exposes.
///
/// Every failure (transport, non-success status, or an explicit `error` field in the
/// body) comes back as a `ServiceError`.
#[async_trait]
pub(crate) trait RenderService: Send + Sync {
    async fn list_branches(&self, repo_path: &str) -> ServiceResult<Vec<String>>;

    async fn submit_job(&self, config: &RenderConfiguration) -> ServiceResult<JobId>;

    async fn job_status(&self, job_id: &JobId) -> ServiceResult<JobStatusSnapshot>;

    /// Stream the job's output into `dest`, returning the number of bytes written.
    async fn download(&self, job_id: &JobId, dest: &Path) -> ServiceResult<u64>;

    async fn preview(&self, config: &RenderConfiguration) -> ServiceResult<PreviewImage>;

    async fn list_jobs(&self) -> ServiceResult<Vec<JobRecord>>;
}
