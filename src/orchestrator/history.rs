//! Job history: fetch the full list and re-render it wholesale.

use crate::api::RenderService;
use crate::error::ServiceResult;
use crate::model::{HistoryEntry, HistoryRow, JobRecord, StatusBucket, UiEvent};
use std::sync::Arc;
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Render job records into display rows. An empty list yields exactly one placeholder.
pub(crate) fn render_history(jobs: &[JobRecord], offset: UtcOffset) -> Vec<HistoryRow> {
    if jobs.is_empty() {
        return vec![HistoryRow::Placeholder];
    }
    jobs.iter()
        .map(|job| {
            HistoryRow::Entry(HistoryEntry {
                job_id: job.id.clone(),
                created: format_created(job.created_at, offset),
                repo_path: job.repo_path.clone(),
                format: job.format.clone(),
                status: job.status.to_string(),
                bucket: StatusBucket::for_status(&job.status),
                progress: job.progress,
                message: job.message.clone(),
                error: job.error.clone(),
                downloadable: job.has_output,
            })
        })
        .collect()
}

pub(crate) fn format_created(epoch_secs: i64, offset: UtcOffset) -> String {
    let fmt = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    OffsetDateTime::from_unix_timestamp(epoch_secs)
        .ok()
        .and_then(|t| t.to_offset(offset).format(fmt).ok())
        .unwrap_or_else(|| epoch_secs.to_string())
}

/// Refreshes the history list and publishes the rendering as a `UiEvent`.
#[derive(Clone)]
pub(crate) struct HistoryView {
    service: Arc<dyn RenderService>,
    events: UnboundedSender<UiEvent>,
    offset: UtcOffset,
}

impl HistoryView {
    pub fn new(
        service: Arc<dyn RenderService>,
        events: UnboundedSender<UiEvent>,
        offset: UtcOffset,
    ) -> Self {
        Self {
            service,
            events,
            offset,
        }
    }

    pub async fn refresh(&self) -> ServiceResult<Vec<HistoryRow>> {
        let jobs = self.service.list_jobs().await?;
        debug!(count = jobs.len(), "job history fetched");
        let rows = render_history(&jobs, self.offset);
        let _ = self.events.send(UiEvent::HistoryRendered(rows.clone()));
        Ok(rows)
    }

    /// Fire-and-forget refresh. Failures keep the previous rendering and are only logged.
    pub fn refresh_in_background(&self) -> JoinHandle<()> {
        let view = self.clone();
        tokio::spawn(async move {
            if let Err(e) = view.refresh().await {
                warn!(error = %e, "history refresh failed");
            }
        })
    }
}
