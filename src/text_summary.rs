//! Line builders for text mode.
//!
//! Formats branch lists, history rows and job progress as plain lines; the CLI decides
//! whether they go to stdout or stderr.

use crate::model::{BranchList, HistoryRow, JobStatusSnapshot, StatusBucket, UiEvent};

pub(crate) const NO_JOBS: &str = "No jobs yet.";

pub(crate) fn branch_lines(list: &BranchList) -> Vec<String> {
    list.options()
        .iter()
        .map(|opt| match &opt.value {
            None => format!("* {} (server default)", opt.label),
            Some(name) => format!("  {name}"),
        })
        .collect()
}

pub(crate) fn history_lines(rows: &[HistoryRow]) -> Vec<String> {
    rows.iter()
        .map(|row| match row {
            HistoryRow::Placeholder => NO_JOBS.to_string(),
            HistoryRow::Entry(e) => {
                let marker = match e.bucket {
                    StatusBucket::Success => "ok",
                    StatusBucket::Failure => "!!",
                    StatusBucket::Running => "..",
                };
                let mut line = format!(
                    "{marker} {}  {:<10} {:>3}%  {:<4} {}  [{}]",
                    e.created, e.status, e.progress, e.format, e.repo_path, e.job_id
                );
                if e.downloadable {
                    line.push_str("  downloadable");
                }
                if let Some(err) = e.error.as_deref().filter(|s| !s.is_empty()) {
                    line.push_str(&format!("  error: {err}"));
                }
                line
            }
        })
        .collect()
}

pub(crate) fn progress_line(progress: u32, message: &str) -> String {
    format!("[{progress:>3}%] {message}")
}

pub(crate) fn outcome_line(snapshot: &JobStatusSnapshot) -> String {
    match snapshot.error.as_deref() {
        Some(err) if !err.is_empty() => format!("{}: {err}", snapshot.status),
        _ => format!("{}: {}", snapshot.status, snapshot.message),
    }
}

/// Text-mode rendering of an event, or `None` for events with no line of their own.
/// The flag marks lines that belong on stderr.
pub(crate) fn event_line(event: &UiEvent) -> Option<(String, bool)> {
    match event {
        UiEvent::Alert { title, message } => Some((format!("{title}: {message}"), true)),
        UiEvent::Info(msg) => Some((msg.clone(), true)),
        UiEvent::JobStarted { job_id } => Some((format!("Started job {job_id}"), true)),
        UiEvent::JobProgress {
            progress, message, ..
        } => Some((progress_line(*progress, message), true)),
        UiEvent::JobCompleted { .. } => Some(("Your time-lapse is ready!".into(), true)),
        UiEvent::JobFailed { error, .. } => Some((format!("Error: {error}"), true)),
        UiEvent::PreviewReady {
            path,
            format,
            width,
            height,
            ..
        } => Some((
            format!(
                "Preview ({format:?}, {width}x{height}) saved to {}",
                path.display()
            ),
            false,
        )),
        UiEvent::Downloaded { path, bytes, .. } => {
            Some((format!("Saved {} ({bytes} bytes)", path.display()), false))
        }
        _ => None,
    }
}
