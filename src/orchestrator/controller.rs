//! Session controller.
//!
//! Owns the branch cache, the job session, preview and history, and runs UI commands
//! against them one at a time. Presentation layers only see the resulting events.

use super::branches::BranchCache;
use super::history::HistoryView;
use super::jobs::JobController;
use super::preview::PreviewController;
use crate::api::RenderService;
use crate::form::FormState;
use crate::model::{JobId, UiEvent};
use crate::storage::PreferenceStore;
use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use time::UtcOffset;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

/// Commands emitted by UI layers.
#[derive(Debug, Clone)]
pub(crate) enum UiCommand {
    LoadBranches(String),
    Submit(FormState),
    Preview(FormState),
    RefreshHistory,
    DownloadActive,
    DownloadJob { job_id: JobId, format: String },
    Quit,
}

/// Settings shared by the controllers.
#[derive(Debug, Clone)]
pub(crate) struct SessionSettings {
    pub poll_interval: Duration,
    pub offset: UtcOffset,
    pub preview_dest: Option<PathBuf>,
}

pub(crate) struct Controllers {
    pub branches: BranchCache,
    pub jobs: JobController,
    pub preview: PreviewController,
    pub history: HistoryView,
}

impl Controllers {
    pub fn new(
        service: Arc<dyn RenderService>,
        prefs: PreferenceStore,
        events: UnboundedSender<UiEvent>,
        settings: SessionSettings,
    ) -> Self {
        let history = HistoryView::new(service.clone(), events.clone(), settings.offset);
        Self {
            branches: BranchCache::new(service.clone(), events.clone()),
            jobs: JobController::new(
                service.clone(),
                prefs,
                history.clone(),
                events.clone(),
                settings.poll_interval,
            ),
            preview: PreviewController::new(service, events, settings.preview_dest),
            history,
        }
    }
}

/// Run commands until `Quit` (or the UI drops its sender), then stop polling.
pub(crate) async fn run_controller(
    mut controllers: Controllers,
    mut cmd_rx: UnboundedReceiver<UiCommand>,
) -> Result<()> {
    controllers.history.refresh_in_background();

    while let Some(cmd) = cmd_rx.recv().await {
        debug!(?cmd, "ui command");
        // Failures have already been surfaced as events by the controllers.
        match cmd {
            UiCommand::LoadBranches(repo_path) => {
                let _ = controllers.branches.load(&repo_path).await;
            }
            UiCommand::Submit(form) => {
                let _ = controllers.jobs.submit(&form).await;
            }
            UiCommand::Preview(form) => {
                let _ = controllers.preview.generate(&form).await;
            }
            UiCommand::RefreshHistory => {
                if let Err(e) = controllers.history.refresh().await {
                    warn!(error = %e, "history refresh failed");
                }
            }
            UiCommand::DownloadActive => {
                let _ = controllers.jobs.download_active(None).await;
            }
            UiCommand::DownloadJob { job_id, format } => {
                let _ = controllers.jobs.download_job(&job_id, &format, None).await;
            }
            UiCommand::Quit => break,
        }
    }

    controllers.jobs.shutdown();
    info!("session closed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fake::{step, FakeService};
    use crate::model::{HistoryRow, JobStatus};
    use crate::orchestrator::poller::PollerState;
    use tokio::sync::mpsc;

    #[tokio::test(start_paused = true)]
    async fn commands_run_in_order_and_quit_stops_polling() {
        let dir = tempfile::tempdir().unwrap();
        let service = Arc::new(FakeService::default());
        service
            .branches
            .lock()
            .unwrap()
            .push_back(Ok(vec!["main".into()]));
        service
            .submissions
            .lock()
            .unwrap()
            .push_back(Ok(JobId::new("j")));
        service.script_status("j", vec![step(JobStatus::Running, 10)]);

        let (ev_tx, mut ev_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let controllers = Controllers::new(
            service.clone(),
            PreferenceStore::new(dir.path().join("prefs.json")),
            ev_tx,
            SessionSettings {
                poll_interval: Duration::from_secs(2),
                offset: UtcOffset::UTC,
                preview_dest: None,
            },
        );
        let form = FormState {
            repo_path: "/repo".into(),
            ..Default::default()
        };
        cmd_tx.send(UiCommand::LoadBranches("/repo".into())).unwrap();
        cmd_tx.send(UiCommand::Submit(form)).unwrap();

        let handle = tokio::spawn(run_controller(controllers, cmd_rx));
        tokio::time::sleep(Duration::from_secs(5)).await;
        let polled = service.status_calls_for("j");
        assert_eq!(polled, 3);

        cmd_tx.send(UiCommand::Quit).unwrap();
        handle.await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(service.status_calls_for("j"), polled);

        let mut saw_branches = false;
        let mut saw_history = false;
        while let Ok(ev) = ev_rx.try_recv() {
            match ev {
                UiEvent::BranchesLoaded(list) => saw_branches = list.branch_count() == 1,
                UiEvent::HistoryRendered(rows) => {
                    saw_history = rows == vec![HistoryRow::Placeholder]
                }
                _ => {}
            }
        }
        assert!(saw_branches);
        assert!(saw_history);
    }

    #[tokio::test]
    async fn closed_command_channel_ends_the_session() {
        let dir = tempfile::tempdir().unwrap();
        let service = Arc::new(FakeService::default());
        let (ev_tx, _ev_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();
        let controllers = Controllers::new(
            service,
            PreferenceStore::new(dir.path().join("prefs.json")),
            ev_tx,
            SessionSettings {
                poll_interval: Duration::from_secs(2),
                offset: UtcOffset::UTC,
                preview_dest: None,
            },
        );
        assert_eq!(controllers.jobs.poller_state(), PollerState::Idle);
        drop(cmd_tx);
        run_controller(controllers, cmd_rx).await.unwrap();
    }
}
