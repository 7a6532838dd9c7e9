//! Periodic status polling bound to one job.
//!
//! A loop fetches the job's status immediately and then on every tick of a fixed-period
//! timer. Each fetch runs as its own task so a slow response never delays the cadence.
//! Results are applied only while the loop's token is valid and only if no newer tick
//! has already been applied.

use super::history::HistoryView;
use crate::api::RenderService;
use crate::error::ServiceResult;
use crate::model::{JobId, JobStatus, JobStatusSnapshot, UiEvent};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

pub(crate) const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PollerState {
    Idle,
    Polling,
}

/// Validity token for one loop. Cancellation takes the same lock that guards applying
/// a result, so once `cancel` returns the loop can no longer touch the display.
#[derive(Clone, Default)]
struct PollToken {
    cancelled: Arc<Mutex<bool>>,
}

impl PollToken {
    fn cancel(&self) {
        *self.cancelled.lock().unwrap_or_else(PoisonError::into_inner) = true;
    }

    fn apply_if_valid<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        let cancelled = self.cancelled.lock().unwrap_or_else(PoisonError::into_inner);
        if *cancelled {
            None
        } else {
            Some(f())
        }
    }
}

enum Flow {
    Continue,
    Finished,
}

struct PollTask {
    job_id: JobId,
    token: PollToken,
    handle: JoinHandle<Option<JobStatusSnapshot>>,
}

pub(crate) struct StatusPoller {
    service: Arc<dyn RenderService>,
    history: HistoryView,
    events: UnboundedSender<UiEvent>,
    interval: Duration,
    task: Option<PollTask>,
}

impl StatusPoller {
    pub fn new(
        service: Arc<dyn RenderService>,
        history: HistoryView,
        events: UnboundedSender<UiEvent>,
        interval: Duration,
    ) -> Self {
        Self {
            service,
            history,
            events,
            interval,
            task: None,
        }
    }

    pub fn state(&self) -> PollerState {
        match &self.task {
            Some(task) if !task.handle.is_finished() => PollerState::Polling,
            _ => PollerState::Idle,
        }
    }

    /// Job the running loop is bound to, if any.
    #[cfg(test)]
    pub fn polling_job(&self) -> Option<&JobId> {
        match self.state() {
            PollerState::Polling => self.task.as_ref().map(|t| &t.job_id),
            PollerState::Idle => None,
        }
    }

    /// Start polling `job_id`, replacing any loop that is already running.
    pub fn start(&mut self, job_id: JobId) {
        self.stop();
        let token = PollToken::default();
        let poll_loop = PollLoop {
            service: self.service.clone(),
            history: self.history.clone(),
            events: self.events.clone(),
            job_id: job_id.clone(),
            interval: self.interval,
            token: token.clone(),
        };
        info!(job_id = %job_id, interval_ms = self.interval.as_millis() as u64, "status polling started");
        let handle = tokio::spawn(poll_loop.run());
        self.task = Some(PollTask {
            job_id,
            token,
            handle,
        });
    }

    /// Stop the loop. Safe to call when already idle.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.token.cancel();
            task.handle.abort();
            debug!(job_id = %task.job_id, "status polling stopped");
        }
    }

    /// Wait for the running loop to reach a terminal status and return that snapshot.
    /// Returns `None` when idle or when the loop was superseded.
    pub async fn finished(&mut self) -> Option<JobStatusSnapshot> {
        let task = self.task.as_mut()?;
        let outcome = (&mut task.handle).await;
        self.task = None;
        outcome.ok().flatten()
    }
}

impl Drop for StatusPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

struct PollLoop {
    service: Arc<dyn RenderService>,
    history: HistoryView,
    events: UnboundedSender<UiEvent>,
    job_id: JobId,
    interval: Duration,
    token: PollToken,
}

impl PollLoop {
    async fn run(self) -> Option<JobStatusSnapshot> {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut in_flight: JoinSet<(u64, ServiceResult<JobStatusSnapshot>)> = JoinSet::new();
        let mut next_seq = 0u64;
        let mut newest_applied: Option<u64> = None;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let seq = next_seq;
                    next_seq += 1;
                    let service = self.service.clone();
                    let job_id = self.job_id.clone();
                    in_flight.spawn(async move { (seq, service.job_status(&job_id).await) });
                }
                Some(joined) = in_flight.join_next() => {
                    let (seq, result) = match joined {
                        Ok(r) => r,
                        Err(e) => {
                            warn!(job_id = %self.job_id, error = %e, "status fetch task failed");
                            continue;
                        }
                    };
                    let snapshot = match result {
                        Ok(s) => s,
                        Err(e) => {
                            warn!(job_id = %self.job_id, error = %e, "status check failed; still polling");
                            continue;
                        }
                    };
                    if newest_applied.is_some_and(|newest| seq < newest) {
                        debug!(job_id = %self.job_id, seq, "discarding out-of-order status");
                        continue;
                    }
                    newest_applied = Some(seq);
                    match self.token.apply_if_valid(|| self.apply(&snapshot)) {
                        None => return None,
                        Some(Flow::Finished) => return Some(snapshot),
                        Some(Flow::Continue) => {}
                    }
                }
            }
        }
    }

    /// Every event sent here names the job, so a superseded loop can never flip shared
    /// controls. The view re-enables submission on the active job's terminal event.
    fn apply(&self, snapshot: &JobStatusSnapshot) -> Flow {
        let job_id = self.job_id.clone();
        let _ = self.events.send(UiEvent::JobProgress {
            job_id: job_id.clone(),
            progress: snapshot.progress,
            message: snapshot.message.clone(),
        });

        match &snapshot.status {
            JobStatus::Completed => {
                info!(job_id = %job_id, "job completed");
                let _ = self.events.send(UiEvent::JobCompleted { job_id });
                self.history.refresh_in_background();
                Flow::Finished
            }
            JobStatus::Failed => {
                let error = snapshot
                    .error
                    .clone()
                    .filter(|e| !e.trim().is_empty())
                    .unwrap_or_else(|| "Unknown error occurred".to_string());
                warn!(job_id = %job_id, error = %error, "job failed");
                let _ = self.events.send(UiEvent::JobFailed { job_id, error });
                self.history.refresh_in_background();
                Flow::Finished
            }
            _ => {
                let _ = self.events.send(UiEvent::JobProcessing { job_id });
                Flow::Continue
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fake::{snapshot, step, FakeService, StatusStep};
    use time::UtcOffset;
    use tokio::sync::mpsc::{self, UnboundedReceiver};
    use tokio::time::sleep;

    fn poller(service: &Arc<FakeService>) -> (StatusPoller, UnboundedReceiver<UiEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let history = HistoryView::new(service.clone(), tx.clone(), UtcOffset::UTC);
        (
            StatusPoller::new(service.clone(), history, tx, DEFAULT_POLL_INTERVAL),
            rx,
        )
    }

    fn drain(rx: &mut UnboundedReceiver<UiEvent>) -> Vec<UiEvent> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            out.push(ev);
        }
        out
    }

    fn progress_values(events: &[UiEvent]) -> Vec<u32> {
        events
            .iter()
            .filter_map(|e| match e {
                UiEvent::JobProgress { progress, .. } => Some(*progress),
                _ => None,
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn fetches_immediately_then_every_two_seconds() {
        let service = Arc::new(FakeService::default());
        service.script_status("j", vec![step(JobStatus::Running, 5)]);
        let (mut poller, _rx) = poller(&service);

        poller.start(JobId::new("j"));
        sleep(Duration::from_millis(10)).await;
        assert_eq!(service.status_calls_for("j"), 1);
        sleep(Duration::from_millis(1980)).await;
        assert_eq!(service.status_calls_for("j"), 1);
        sleep(Duration::from_millis(20)).await;
        assert_eq!(service.status_calls_for("j"), 2);
        sleep(Duration::from_millis(4000)).await;
        assert_eq!(service.status_calls_for("j"), 4);
        assert_eq!(poller.state(), PollerState::Polling);
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_do_not_wait_for_slow_fetches() {
        let service = Arc::new(FakeService::default());
        service.script_status(
            "j",
            vec![StatusStep {
                delay: Duration::from_secs(7),
                result: Ok(snapshot(JobStatus::Running, 1)),
            }],
        );
        let (mut poller, _rx) = poller(&service);

        poller.start(JobId::new("j"));
        sleep(Duration::from_millis(6100)).await;
        assert_eq!(service.status_calls_for("j"), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn starting_a_new_job_supersedes_the_old_loop() {
        let service = Arc::new(FakeService::default());
        service.script_status("a", vec![step(JobStatus::Running, 10)]);
        service.script_status("b", vec![step(JobStatus::Running, 20)]);
        let (mut poller, mut rx) = poller(&service);

        poller.start(JobId::new("a"));
        sleep(Duration::from_millis(2500)).await;
        let a_calls = service.status_calls_for("a");
        assert_eq!(a_calls, 2);
        drain(&mut rx);

        poller.start(JobId::new("b"));
        sleep(Duration::from_secs(10)).await;

        assert_eq!(service.status_calls_for("a"), a_calls);
        assert!(service.status_calls_for("b") >= 5);
        assert_eq!(poller.polling_job(), Some(&JobId::new("b")));
        let events = drain(&mut rx);
        assert!(!events.is_empty());
        for ev in events {
            match ev {
                UiEvent::JobProgress { job_id, .. } | UiEvent::JobProcessing { job_id } => {
                    assert_eq!(job_id.as_str(), "b")
                }
                other => panic!("unexpected event {other:?}"),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn superseded_in_flight_response_is_dropped() {
        let service = Arc::new(FakeService::default());
        service.script_status(
            "a",
            vec![StatusStep {
                delay: Duration::from_secs(3),
                result: Ok(snapshot(JobStatus::Completed, 100)),
            }],
        );
        service.script_status("b", vec![step(JobStatus::Running, 20)]);
        let (mut poller, mut rx) = poller(&service);

        poller.start(JobId::new("a"));
        sleep(Duration::from_millis(100)).await;
        poller.start(JobId::new("b"));
        sleep(Duration::from_secs(5)).await;

        let events = drain(&mut rx);
        assert!(events.iter().all(|e| !matches!(e, UiEvent::JobCompleted { .. })));
        assert_eq!(service.list_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_idempotent() {
        let service = Arc::new(FakeService::default());
        service.script_status("j", vec![step(JobStatus::Running, 5)]);
        let (mut poller, _rx) = poller(&service);

        poller.stop();
        assert_eq!(poller.state(), PollerState::Idle);

        poller.start(JobId::new("j"));
        sleep(Duration::from_millis(10)).await;
        assert_eq!(poller.state(), PollerState::Polling);
        poller.stop();
        assert_eq!(poller.state(), PollerState::Idle);
        poller.stop();
        assert_eq!(poller.state(), PollerState::Idle);

        let calls = service.status_calls_for("j");
        sleep(Duration::from_secs(10)).await;
        assert_eq!(service.status_calls_for("j"), calls);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_fetch_errors_keep_the_loop_alive() {
        let service = Arc::new(FakeService::default());
        service.script_status(
            "j",
            vec![
                StatusStep {
                    delay: Duration::ZERO,
                    result: Err("connection reset".into()),
                },
                StatusStep {
                    delay: Duration::ZERO,
                    result: Err("502".into()),
                },
                step(JobStatus::Running, 70),
                step(JobStatus::Completed, 100),
            ],
        );
        let (mut poller, mut rx) = poller(&service);

        poller.start(JobId::new("j"));
        let last = poller.finished().await.expect("terminal snapshot");
        assert_eq!(last.status, JobStatus::Completed);
        assert_eq!(poller.state(), PollerState::Idle);

        let events = drain(&mut rx);
        assert_eq!(progress_values(&events), [70, 100]);
        assert!(events
            .iter()
            .any(|e| matches!(e, UiEvent::JobCompleted { job_id } if job_id.as_str() == "j")));
    }

    #[tokio::test(start_paused = true)]
    async fn older_tick_overtaken_by_newer_one_is_discarded() {
        let service = Arc::new(FakeService::default());
        service.script_status(
            "j",
            vec![
                StatusStep {
                    delay: Duration::from_secs(5),
                    result: Ok(snapshot(JobStatus::Running, 10)),
                },
                step(JobStatus::Running, 50),
                step(JobStatus::Running, 60),
                step(JobStatus::Completed, 100),
            ],
        );
        let (mut poller, mut rx) = poller(&service);

        poller.start(JobId::new("j"));
        poller.finished().await.expect("terminal snapshot");

        assert_eq!(progress_values(&drain(&mut rx)), [50, 60, 100]);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_without_error_text_uses_a_fallback() {
        let service = Arc::new(FakeService::default());
        service.script_status("j", vec![step(JobStatus::Failed, 30)]);
        let (mut poller, mut rx) = poller(&service);

        poller.start(JobId::new("j"));
        poller.finished().await.expect("terminal snapshot");
        sleep(Duration::from_millis(10)).await;

        let events = drain(&mut rx);
        assert!(events.iter().any(|e| matches!(
            e,
            UiEvent::JobFailed { error, .. } if error == "Unknown error occurred"
        )));
        assert!(!events
            .iter()
            .any(|e| matches!(e, UiEvent::SubmitControl(_))));
        assert_eq!(service.list_count(), 1);
    }
}
