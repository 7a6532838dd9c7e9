//! Tracing setup.
//!
//! The TUI owns the terminal, so interactive sessions log to a file. Text and JSON modes
//! log to stderr and keep stdout for results.

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub(crate) enum LogTarget {
    Stderr,
    File(PathBuf),
}

pub(crate) fn default_log_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("git-chronoscope").join("chronoscope.log"))
}

/// Install the global subscriber. `RUST_LOG` overrides `default_level`.
pub(crate) fn init(target: LogTarget, default_level: &str) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    match target {
        LogTarget::Stderr => {
            let _ = tracing_subscriber::registry()
                .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
                .with(filter)
                .try_init();
        }
        LogTarget::File(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("create {}", parent.display()))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("open log file {}", path.display()))?;
            let _ = tracing_subscriber::registry()
                .with(
                    fmt::layer()
                        .with_writer(Mutex::new(file))
                        .with_ansi(false),
                )
                .with(filter)
                .try_init();
        }
    }
    Ok(())
}
