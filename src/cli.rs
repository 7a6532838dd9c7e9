use crate::api::{ClientConfig, RenderService, ServiceClient};
use crate::form::FormState;
use crate::logging::{self, LogTarget};
use crate::model::{JobStatus, OutputFormat, Resolution, UiEvent};
use crate::orchestrator::poller::DEFAULT_POLL_INTERVAL;
use crate::orchestrator::{Controllers, SessionSettings};
use crate::storage::PreferenceStore;
use crate::text_summary;
use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use time::UtcOffset;
use tokio::sync::mpsc;
use tracing::warn;

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

fn parse_format(s: &str) -> Result<OutputFormat, String> {
    OutputFormat::ALL
        .into_iter()
        .find(|f| f.as_str().eq_ignore_ascii_case(s))
        .ok_or_else(|| format!("expected one of: mp4, gif (got {s:?})"))
}

fn parse_resolution(s: &str) -> Result<Resolution, String> {
    Resolution::ALL
        .into_iter()
        .find(|r| r.as_str().eq_ignore_ascii_case(s))
        .ok_or_else(|| format!("expected one of: 720p, 1080p, 4k, custom (got {s:?})"))
}

fn parse_poll_interval(s: &str) -> Result<humantime::Duration, String> {
    let interval: humantime::Duration = s.parse().map_err(|e| format!("{e}"))?;
    if interval.is_zero() {
        return Err("poll interval must be greater than zero".into());
    }
    Ok(interval)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "chronoscope",
    version,
    about = "Client for the git-chronoscope time-lapse renderer, with optional TUI"
)]
pub struct Cli {
    /// Base URL of the rendering service
    #[arg(long, env = "CHRONOSCOPE_URL", default_value = "http://127.0.0.1:5000")]
    pub base_url: String,

    /// Repository path (defaults to the last one used)
    #[arg(long)]
    pub repo: Option<String>,

    /// Branch to render (defaults to the repository's current branch)
    #[arg(long)]
    pub branch: Option<String>,

    /// Output format: mp4 or gif
    #[arg(long, default_value = "mp4", value_parser = parse_format)]
    pub format: OutputFormat,

    /// Output resolution: 720p, 1080p, 4k or custom
    #[arg(long, default_value = "1080p", value_parser = parse_resolution)]
    pub resolution: Resolution,

    /// Width in pixels for --resolution custom (at least 100)
    #[arg(long)]
    pub width: Option<u32>,

    /// Height in pixels for --resolution custom (at least 100)
    #[arg(long)]
    pub height: Option<u32>,

    /// Frames per second
    #[arg(long, default_value_t = 2)]
    pub fps: u32,

    /// Background color (#RRGGBB)
    #[arg(long, default_value = "#141618")]
    pub bg_color: String,

    /// Text color (#RRGGBB)
    #[arg(long, default_value = "#FFFFFF")]
    pub text_color: String,

    /// Font size
    #[arg(long, default_value_t = 15)]
    pub font_size: u32,

    /// Leave author emails out of the rendered frames
    #[arg(long)]
    pub no_email: bool,

    /// Submit a job, print progress, and exit (no TUI)
    #[arg(long)]
    pub text: bool,

    /// Like --text, but print a JSON report on stdout
    #[arg(long)]
    pub json: bool,

    /// List the repository's branches and exit
    #[arg(long)]
    pub list_branches: bool,

    /// Print the service's job history and exit
    #[arg(long)]
    pub history: bool,

    /// Render a single preview frame to this file and exit
    #[arg(long, value_name = "PATH")]
    pub preview: Option<PathBuf>,

    /// In text/JSON mode, save the finished output to this file
    #[arg(long, value_name = "PATH")]
    pub download: Option<PathBuf>,

    /// Status polling interval
    #[arg(long, value_parser = parse_poll_interval)]
    pub poll_interval: Option<humantime::Duration>,

    /// Per-request timeout
    #[arg(long, default_value = "30s")]
    pub timeout: humantime::Duration,

    /// Preferences file (defaults to the per-user config directory)
    #[arg(long)]
    pub prefs_file: Option<PathBuf>,

    /// Log file for TUI sessions (defaults to the per-user data directory)
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

impl Cli {
    /// True when no flag asks for a non-interactive mode.
    pub fn is_interactive(&self) -> bool {
        !(self.text
            || self.json
            || self.list_branches
            || self.history
            || self.preview.is_some())
    }
}

/// What every mode needs: the service, the preference store and controller settings.
pub(crate) struct Session {
    pub service: Arc<dyn RenderService>,
    pub prefs: PreferenceStore,
    pub settings: SessionSettings,
}

impl Session {
    pub fn open(args: &Cli, offset: UtcOffset) -> Result<Self> {
        let client = ServiceClient::new(&ClientConfig {
            base_url: args.base_url.clone(),
            timeout: Duration::from(args.timeout),
            ..ClientConfig::default()
        })
        .context("build HTTP client")?;

        let prefs_path = match args.prefs_file.clone() {
            Some(p) => p,
            None => PreferenceStore::default_path().unwrap_or_else(|e| {
                warn!(error = %format!("{e:#}"), "using a preferences file in the working directory");
                PathBuf::from(".chronoscope-preferences.json")
            }),
        };

        Ok(Self {
            service: Arc::new(client),
            prefs: PreferenceStore::new(prefs_path),
            settings: SessionSettings {
                poll_interval: args
                    .poll_interval
                    .map(Duration::from)
                    .unwrap_or(DEFAULT_POLL_INTERVAL),
                offset,
                preview_dest: args.preview.clone(),
            },
        })
    }
}

/// Initial form contents: flags first, then the remembered repository path.
pub(crate) fn build_form(args: &Cli, prefs: &PreferenceStore) -> FormState {
    let repo_path = args
        .repo
        .clone()
        .or_else(|| prefs.last_repo_path())
        .unwrap_or_default();
    FormState {
        repo_path,
        branch: args.branch.clone().unwrap_or_default(),
        format: args.format,
        resolution: args.resolution,
        width: args.width.map(|v| v.to_string()).unwrap_or_default(),
        height: args.height.map(|v| v.to_string()).unwrap_or_default(),
        fps: args.fps.to_string(),
        bg_color: args.bg_color.clone(),
        text_color: args.text_color.clone(),
        font_size: args.font_size.to_string(),
        no_email: args.no_email,
    }
}

pub fn init_logging(args: &Cli) -> Result<()> {
    if args.is_interactive() {
        match args.log_file.clone().or_else(logging::default_log_path) {
            Some(path) => logging::init(LogTarget::File(path), "info"),
            None => Ok(()),
        }
    } else {
        logging::init(LogTarget::Stderr, "warn")
    }
}

pub async fn run(args: Cli, offset: UtcOffset) -> Result<()> {
    let session = Session::open(&args, offset)?;

    if args.list_branches {
        return run_list_branches(args, session).await;
    }
    if args.history {
        return run_history(args, session).await;
    }
    if args.preview.is_some() {
        return run_preview(args, session).await;
    }

    if args.is_interactive() {
        #[cfg(feature = "tui")]
        {
            return crate::tui::run(args, session).await;
        }
        #[cfg(not(feature = "tui"))]
        {
            // Fallback when built without TUI support.
            return run_text(args, session).await;
        }
    }

    run_text(args, session).await
}

/// Forward controller events as text lines until every sender is gone.
fn spawn_event_printer(
    mut evt_rx: mpsc::UnboundedReceiver<UiEvent>,
    out_tx: mpsc::UnboundedSender<OutputLine>,
    quiet: bool,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(ev) = evt_rx.recv().await {
            // Alerts come back to the caller as errors.
            if quiet || matches!(ev, UiEvent::Alert { .. }) {
                continue;
            }
            if let Some((line, to_stderr)) = text_summary::event_line(&ev) {
                let _ = out_tx.send(if to_stderr {
                    OutputLine::Stderr(line)
                } else {
                    OutputLine::Stdout(line)
                });
            }
        }
    })
}

#[derive(Serialize)]
struct JobReport {
    job_id: String,
    status: String,
    progress: u32,
    message: String,
    error: Option<String>,
    output: Option<PathBuf>,
}

async fn run_text(args: Cli, session: Session) -> Result<()> {
    let (out_tx, out_handle) = spawn_output_writer();
    let (evt_tx, evt_rx) = mpsc::unbounded_channel::<UiEvent>();
    let printer = spawn_event_printer(evt_rx, out_tx.clone(), args.json);

    let form = build_form(&args, &session.prefs);
    let mut controllers =
        Controllers::new(session.service, session.prefs, evt_tx, session.settings);

    let outcome = async {
        let job_id = controllers
            .jobs
            .submit(&form)
            .await
            .context("could not start generation")?;
        let last = controllers
            .jobs
            .wait_for_terminal()
            .await
            .context("status polling ended without a final status")?;

        let output = match (&last.status, args.download.clone()) {
            (JobStatus::Completed, Some(dest)) => Some(
                controllers
                    .jobs
                    .download_active(Some(dest))
                    .await
                    .context("download failed")?,
            ),
            _ => None,
        };
        anyhow::Ok((job_id, last, output))
    }
    .await;

    controllers.jobs.shutdown();
    drop(controllers);
    let _ = printer.await;

    let result = match outcome {
        Ok((job_id, last, output)) => {
            if args.json {
                let report = JobReport {
                    job_id: job_id.to_string(),
                    status: last.status.to_string(),
                    progress: last.progress,
                    message: last.message.clone(),
                    error: last.error.clone(),
                    output,
                };
                let _ = out_tx.send(OutputLine::Stdout(serde_json::to_string_pretty(&report)?));
            } else {
                let _ = out_tx.send(OutputLine::Stdout(text_summary::outcome_line(&last)));
            }
            if last.status == JobStatus::Failed {
                Err(anyhow::anyhow!(
                    "job {job_id} failed: {}",
                    last.error.as_deref().unwrap_or("Unknown error occurred")
                ))
            } else {
                Ok(())
            }
        }
        Err(e) => Err(e),
    };

    drop(out_tx);
    let _ = out_handle.await;
    result
}

async fn run_list_branches(args: Cli, session: Session) -> Result<()> {
    let (out_tx, out_handle) = spawn_output_writer();
    let (evt_tx, _evt_rx) = mpsc::unbounded_channel::<UiEvent>();
    let form = build_form(&args, &session.prefs);
    let mut controllers =
        Controllers::new(session.service, session.prefs, evt_tx, session.settings);

    let list = controllers
        .branches
        .load(&form.repo_path)
        .await
        .context("Error loading branches")?;
    let lines = if args.json {
        let names: Vec<_> = list.options().iter().filter_map(|o| o.value.clone()).collect();
        vec![serde_json::to_string_pretty(&names)?]
    } else {
        text_summary::branch_lines(list)
    };
    for line in lines {
        let _ = out_tx.send(OutputLine::Stdout(line));
    }

    drop(out_tx);
    let _ = out_handle.await;
    Ok(())
}

async fn run_history(args: Cli, session: Session) -> Result<()> {
    let (out_tx, out_handle) = spawn_output_writer();
    let (evt_tx, _evt_rx) = mpsc::unbounded_channel::<UiEvent>();
    let controllers = Controllers::new(session.service, session.prefs, evt_tx, session.settings);

    let rows = controllers
        .history
        .refresh()
        .await
        .context("could not load job history")?;
    let lines = if args.json {
        vec![serde_json::to_string_pretty(&rows)?]
    } else {
        text_summary::history_lines(&rows)
    };
    for line in lines {
        let _ = out_tx.send(OutputLine::Stdout(line));
    }

    drop(out_tx);
    let _ = out_handle.await;
    Ok(())
}

async fn run_preview(args: Cli, session: Session) -> Result<()> {
    let (out_tx, out_handle) = spawn_output_writer();
    let (evt_tx, evt_rx) = mpsc::unbounded_channel::<UiEvent>();
    let printer = spawn_event_printer(evt_rx, out_tx.clone(), args.json);
    let form = build_form(&args, &session.prefs);
    let controllers = Controllers::new(session.service, session.prefs, evt_tx, session.settings);

    let res = controllers
        .preview
        .generate(&form)
        .await
        .context("Error generating preview");
    drop(controllers);
    let _ = printer.await;

    if let (Ok(path), true) = (&res, args.json) {
        let report = serde_json::json!({ "preview": path });
        let _ = out_tx.send(OutputLine::Stdout(serde_json::to_string_pretty(&report)?));
    }

    drop(out_tx);
    let _ = out_handle.await;
    res.map(|_| ())
}
