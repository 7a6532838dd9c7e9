//! Scriptable in-memory `RenderService` for controller tests.

use super::RenderService;
use crate::error::{ServiceError, ServiceResult};
use crate::model::{
    JobId, JobRecord, JobStatus, JobStatusSnapshot, PreviewImage, RenderConfiguration,
};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// One scripted status response, delivered after `delay`.
#[derive(Clone)]
pub(crate) struct StatusStep {
    pub delay: Duration,
    pub result: Result<JobStatusSnapshot, String>,
}

pub(crate) fn snapshot(status: JobStatus, progress: u32) -> JobStatusSnapshot {
    JobStatusSnapshot {
        message: format!("{status} {progress}%"),
        status,
        progress,
        error: None,
        has_output: false,
    }
}

pub(crate) fn step(status: JobStatus, progress: u32) -> StatusStep {
    StatusStep {
        delay: Duration::ZERO,
        result: Ok(snapshot(status, progress)),
    }
}

#[derive(Default)]
pub(crate) struct FakeService {
    pub branches: Mutex<VecDeque<Result<Vec<String>, String>>>,
    pub submissions: Mutex<VecDeque<Result<JobId, String>>>,
    /// Per job; the last step repeats once the script runs out.
    pub statuses: Mutex<HashMap<JobId, VecDeque<StatusStep>>>,
    pub previews: Mutex<VecDeque<Result<PreviewImage, String>>>,
    pub jobs: Mutex<Vec<JobRecord>>,
    pub submitted: Mutex<Vec<RenderConfiguration>>,
    pub status_calls: Mutex<Vec<JobId>>,
    pub branch_calls: AtomicUsize,
    pub preview_calls: AtomicUsize,
    pub list_calls: AtomicUsize,
}

impl FakeService {
    pub fn script_status(&self, job_id: &str, steps: Vec<StatusStep>) {
        self.statuses
            .lock()
            .unwrap()
            .insert(JobId::new(job_id), steps.into());
    }

    pub fn status_calls_for(&self, job_id: &str) -> usize {
        self.status_calls
            .lock()
            .unwrap()
            .iter()
            .filter(|id| id.as_str() == job_id)
            .count()
    }

    pub fn submit_count(&self) -> usize {
        self.submitted.lock().unwrap().len()
    }

    pub fn list_count(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RenderService for FakeService {
    async fn list_branches(&self, _repo_path: &str) -> ServiceResult<Vec<String>> {
        self.branch_calls.fetch_add(1, Ordering::SeqCst);
        self.branches
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
            .map_err(ServiceError::Request)
    }

    async fn submit_job(&self, config: &RenderConfiguration) -> ServiceResult<JobId> {
        self.submitted.lock().unwrap().push(config.clone());
        self.submissions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err("no submission scripted".into()))
            .map_err(ServiceError::Server)
    }

    async fn job_status(&self, job_id: &JobId) -> ServiceResult<JobStatusSnapshot> {
        self.status_calls.lock().unwrap().push(job_id.clone());
        let step = {
            let mut statuses = self.statuses.lock().unwrap();
            let queue = statuses.entry(job_id.clone()).or_default();
            if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().cloned()
            }
        };
        let Some(step) = step else {
            return Err(ServiceError::Request("Job not found".into()));
        };
        tokio::time::sleep(step.delay).await;
        step.result.map_err(ServiceError::Request)
    }

    async fn download(&self, job_id: &JobId, dest: &Path) -> ServiceResult<u64> {
        let body = format!("video for {job_id}");
        tokio::fs::write(dest, body.as_bytes()).await?;
        Ok(body.len() as u64)
    }

    async fn preview(&self, _config: &RenderConfiguration) -> ServiceResult<PreviewImage> {
        self.preview_calls.fetch_add(1, Ordering::SeqCst);
        self.previews
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err("no preview scripted".into()))
            .map_err(ServiceError::Request)
    }

    async fn list_jobs(&self) -> ServiceResult<Vec<JobRecord>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.jobs.lock().unwrap().clone())
    }
}
