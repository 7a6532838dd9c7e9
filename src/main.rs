mod api;
mod cli;
mod error;
mod form;
mod logging;
mod model;
mod orchestrator;
mod storage;
mod text_summary;
#[cfg(feature = "tui")]
mod tui;
mod view;

use anyhow::{Context, Result};
use clap::Parser;
use time::UtcOffset;

fn main() -> Result<()> {
    let args = cli::Cli::parse();
    let is_non_tui = !args.is_interactive();

    // The local offset can only be read reliably before any other thread exists.
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);

    cli::init_logging(&args)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("start async runtime")?;
    runtime.block_on(cli::run(args, offset))?;

    // Don't wait on lingering blocking tasks (stdout writer) in one-shot modes.
    if is_non_tui {
        std::process::exit(0);
    }
    Ok(())
}
