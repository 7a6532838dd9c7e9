//! Job submission and the single active-job session.

use super::history::HistoryView;
use super::poller::{PollerState, StatusPoller};
use crate::api::RenderService;
use crate::error::{ActionError, ValidationError};
use crate::form::FormState;
use crate::model::{ControlState, JobId, JobStatusSnapshot, OutputFormat, UiEvent};
use crate::storage::PreferenceStore;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ActiveJob {
    pub id: JobId,
    pub format: OutputFormat,
}

/// The one job this client currently follows, plus the loop polling it.
struct JobSession {
    active: Option<ActiveJob>,
    poller: StatusPoller,
}

impl JobSession {
    /// Stop following the current job. Once this returns its loop sends nothing more.
    fn release(&mut self) {
        if self.poller.state() == PollerState::Polling {
            if let Some(previous) = &self.active {
                debug!(previous = %previous.id, "superseding active job");
            }
        }
        self.poller.stop();
    }

    /// Replace the active job and bind polling to it.
    fn activate(&mut self, job: ActiveJob) {
        self.release();
        self.poller.start(job.id.clone());
        self.active = Some(job);
    }
}

/// Default download destination: `timelapse_<id>.<ext>` in the working directory.
pub(crate) fn default_download_path(job_id: &JobId, extension: &str) -> PathBuf {
    PathBuf::from(format!("timelapse_{job_id}.{extension}"))
}

pub(crate) struct JobController {
    service: Arc<dyn RenderService>,
    prefs: PreferenceStore,
    history: HistoryView,
    events: UnboundedSender<UiEvent>,
    session: JobSession,
}

impl JobController {
    pub fn new(
        service: Arc<dyn RenderService>,
        prefs: PreferenceStore,
        history: HistoryView,
        events: UnboundedSender<UiEvent>,
        poll_interval: Duration,
    ) -> Self {
        let poller = StatusPoller::new(
            service.clone(),
            history.clone(),
            events.clone(),
            poll_interval,
        );
        Self {
            service,
            prefs,
            history,
            events,
            session: JobSession {
                active: None,
                poller,
            },
        }
    }

    #[cfg(test)]
    pub fn active_job(&self) -> Option<&ActiveJob> {
        self.session.active.as_ref()
    }

    #[cfg(test)]
    pub fn poller_state(&self) -> PollerState {
        self.session.poller.state()
    }

    /// Validate the form, create a job, and start following it.
    ///
    /// The repository path is remembered before anything else, so a later validation or
    /// service failure still leaves it stored.
    pub async fn submit(&mut self, form: &FormState) -> Result<JobId, ActionError> {
        if let Err(e) = self.prefs.remember_repo_path(&form.repo_path) {
            warn!(error = %format!("{e:#}"), "could not store repository path");
        }

        let config = match form.build() {
            Ok(config) => config,
            Err(e) => {
                self.alert_invalid(&e);
                return Err(e.into());
            }
        };

        self.send(UiEvent::SubmitControl(ControlState::busy("Starting...")));
        let job_id = match self.service.submit_job(&config).await {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, repo = %config.repo_path, "job submission failed");
                self.send(UiEvent::SubmitControl(ControlState::Ready));
                self.send(UiEvent::alert(
                    "Error starting generation",
                    e.to_string(),
                ));
                return Err(e.into());
            }
        };

        info!(
            job_id = %job_id,
            repo = %config.repo_path,
            format = %config.format,
            resolution = %config.resolution,
            "job submitted"
        );
        self.session.release();
        self.send(UiEvent::JobStarted {
            job_id: job_id.clone(),
        });
        self.send(UiEvent::SubmitControl(ControlState::busy("Generating...")));
        self.session.activate(ActiveJob {
            id: job_id.clone(),
            format: config.format,
        });
        self.history.refresh_in_background();
        Ok(job_id)
    }

    /// Download the active job's output to `dest` (or the default file name).
    pub async fn download_active(&self, dest: Option<PathBuf>) -> Result<PathBuf, ActionError> {
        let Some(job) = self.session.active.clone() else {
            self.send(UiEvent::alert("Download", "No job has been started yet."));
            return Err(ActionError::Unavailable("no active job".into()));
        };
        self.download_job(&job.id, job.format.as_str(), dest).await
    }

    /// Download any job's output by identifier, e.g. a completed history entry.
    pub async fn download_job(
        &self,
        job_id: &JobId,
        extension: &str,
        dest: Option<PathBuf>,
    ) -> Result<PathBuf, ActionError> {
        let dest = dest.unwrap_or_else(|| default_download_path(job_id, extension));
        match self.service.download(job_id, &dest).await {
            Ok(bytes) => {
                info!(job_id = %job_id, path = %dest.display(), bytes, "output downloaded");
                self.send(UiEvent::Downloaded {
                    job_id: job_id.clone(),
                    path: dest.clone(),
                    bytes,
                });
                Ok(dest)
            }
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "download failed");
                self.send(UiEvent::alert("Error downloading output", e.to_string()));
                Err(e.into())
            }
        }
    }

    /// Wait until the active job's polling loop sees a terminal status.
    pub async fn wait_for_terminal(&mut self) -> Option<JobStatusSnapshot> {
        self.session.poller.finished().await
    }

    pub fn shutdown(&mut self) {
        self.session.poller.stop();
    }

    fn alert_invalid(&self, e: &ValidationError) {
        self.send(UiEvent::alert("Invalid configuration", e.to_string()));
    }

    fn send(&self, event: UiEvent) {
        let _ = self.events.send(event);
    }
}
