//! Presentation state shared by the TUI and text modes.
//!
//! Controllers never touch this directly; they emit `UiEvent`s which are folded in
//! with `apply_event`.

use crate::model::{BranchList, ControlState, HistoryRow, JobId, StatusDetail, UiEvent};
use std::collections::VecDeque;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) enum PreviewPanel {
    #[default]
    Hidden,
    Loading,
    Shown {
        path: PathBuf,
        format: image::ImageFormat,
        width: u32,
        height: u32,
        bytes: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Alert {
    pub title: String,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct ViewState {
    pub submit: ControlState,
    pub branch_control: ControlState,
    pub branches: BranchList,
    pub status_visible: bool,
    pub active_job: Option<JobId>,
    /// Raw progress as reported; not clamped.
    pub progress: u32,
    pub message: String,
    pub detail: Option<StatusDetail>,
    pub download_visible: bool,
    pub preview: PreviewPanel,
    /// `None` until the first history load lands.
    pub history: Option<Vec<HistoryRow>>,
    pub alerts: VecDeque<Alert>,
    pub info: Option<String>,
    pub last_download: Option<PathBuf>,
}

impl ViewState {
    pub fn apply_event(&mut self, event: UiEvent) {
        match event {
            UiEvent::Alert { title, message } => self.alerts.push_back(Alert { title, message }),
            UiEvent::Info(msg) => self.info = Some(msg),
            UiEvent::SubmitControl(state) => self.submit = state,
            UiEvent::BranchControl(state) => self.branch_control = state,
            UiEvent::BranchesLoaded(list) => self.branches = list,
            UiEvent::JobStarted { job_id } => {
                self.active_job = Some(job_id);
                self.status_visible = true;
                self.download_visible = false;
                self.progress = 0;
                self.message = "Starting...".into();
                self.detail = None;
            }
            UiEvent::JobProgress {
                job_id,
                progress,
                message,
            } => {
                if self.is_active(&job_id) {
                    self.progress = progress;
                    self.message = message;
                }
            }
            UiEvent::JobProcessing { job_id } => {
                if self.is_active(&job_id) {
                    self.detail = Some(StatusDetail::Processing);
                }
            }
            UiEvent::JobCompleted { job_id } => {
                if self.is_active(&job_id) {
                    self.detail = Some(StatusDetail::Ready);
                    self.download_visible = true;
                    self.submit = ControlState::Ready;
                }
            }
            UiEvent::JobFailed { job_id, error } => {
                if self.is_active(&job_id) {
                    self.detail = Some(StatusDetail::Failed(error));
                    self.download_visible = false;
                    self.submit = ControlState::Ready;
                }
            }
            UiEvent::PreviewLoading => self.preview = PreviewPanel::Loading,
            UiEvent::PreviewReady {
                path,
                format,
                width,
                height,
                bytes,
            } => {
                self.preview = PreviewPanel::Shown {
                    path,
                    format,
                    width,
                    height,
                    bytes,
                }
            }
            UiEvent::PreviewHidden => self.preview = PreviewPanel::Hidden,
            UiEvent::HistoryRendered(rows) => self.history = Some(rows),
            UiEvent::Downloaded {
                job_id,
                path,
                bytes,
            } => {
                self.info = Some(format!(
                    "Saved {job_id} ({bytes} bytes) to {}",
                    path.display()
                ));
                self.last_download = Some(path);
            }
        }
    }

    fn is_active(&self, job_id: &JobId) -> bool {
        self.active_job.as_ref() == Some(job_id)
    }

    /// Progress as a 0..=1 ratio for gauge widgets, which reject values outside that range.
    pub fn progress_ratio(&self) -> f64 {
        f64::from(self.progress.min(100)) / 100.0
    }

    pub fn current_alert(&self) -> Option<&Alert> {
        self.alerts.front()
    }

    pub fn dismiss_alert(&mut self) {
        self.alerts.pop_front();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started(id: &str) -> ViewState {
        let mut view = ViewState::default();
        view.apply_event(UiEvent::JobStarted {
            job_id: JobId::new(id),
        });
        view
    }

    #[test]
    fn starting_a_job_resets_the_status_area() {
        let mut view = started("a");
        view.apply_event(UiEvent::JobCompleted {
            job_id: JobId::new("a"),
        });
        assert!(view.download_visible);

        view.apply_event(UiEvent::JobStarted {
            job_id: JobId::new("b"),
        });
        assert!(view.status_visible);
        assert!(!view.download_visible);
        assert_eq!(view.progress, 0);
        assert_eq!(view.detail, None);
    }

    #[test]
    fn events_for_other_jobs_are_ignored() {
        let mut view = started("b");
        view.apply_event(UiEvent::JobProgress {
            job_id: JobId::new("a"),
            progress: 99,
            message: "old".into(),
        });
        view.apply_event(UiEvent::JobCompleted {
            job_id: JobId::new("a"),
        });
        assert_eq!(view.progress, 0);
        assert!(!view.download_visible);
    }

    #[test]
    fn progress_is_stored_raw_and_clamped_only_for_gauges() {
        let mut view = started("a");
        view.apply_event(UiEvent::JobProgress {
            job_id: JobId::new("a"),
            progress: 140,
            message: "overshoot".into(),
        });
        assert_eq!(view.progress, 140);
        assert_eq!(view.progress_ratio(), 1.0);
    }

    #[test]
    fn failure_replaces_detail_with_error_text() {
        let mut view = started("a");
        view.apply_event(UiEvent::SubmitControl(ControlState::busy("Generating...")));
        view.apply_event(UiEvent::JobProcessing {
            job_id: JobId::new("a"),
        });
        view.apply_event(UiEvent::JobFailed {
            job_id: JobId::new("a"),
            error: "disk full".into(),
        });
        assert_eq!(view.detail, Some(StatusDetail::Failed("disk full".into())));
        assert!(view.submit.is_ready());
        assert!(!view.download_visible);
    }

    #[test]
    fn late_terminal_events_for_an_old_job_leave_submission_busy() {
        let mut view = started("a");
        view.apply_event(UiEvent::JobStarted {
            job_id: JobId::new("b"),
        });
        view.apply_event(UiEvent::SubmitControl(ControlState::busy("Generating...")));
        view.apply_event(UiEvent::JobCompleted {
            job_id: JobId::new("a"),
        });
        view.apply_event(UiEvent::JobFailed {
            job_id: JobId::new("a"),
            error: "late".into(),
        });
        assert_eq!(view.submit, ControlState::busy("Generating..."));
        assert!(view.detail.is_none());
        assert!(!view.download_visible);
    }

    #[test]
    fn alerts_queue_until_dismissed() {
        let mut view = ViewState::default();
        view.apply_event(UiEvent::alert("one", "first"));
        view.apply_event(UiEvent::alert("two", "second"));
        assert_eq!(view.current_alert().unwrap().title, "one");
        view.dismiss_alert();
        assert_eq!(view.current_alert().unwrap().message, "second");
        view.dismiss_alert();
        assert!(view.current_alert().is_none());
    }

    #[test]
    fn preview_panel_follows_loading_and_hiding() {
        let mut view = ViewState::default();
        view.apply_event(UiEvent::PreviewLoading);
        assert_eq!(view.preview, PreviewPanel::Loading);
        view.apply_event(UiEvent::PreviewHidden);
        assert_eq!(view.preview, PreviewPanel::Hidden);
    }
}
