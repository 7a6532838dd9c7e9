//! Application-level orchestration.
//!
//! This module owns the job lifecycle (submission, the active-job session and its status
//! polling) along with branch loading, previews and the history list. UI/CLI layers send
//! commands in and read `UiEvent`s back out.

mod branches;
mod controller;
mod history;
mod jobs;
pub(crate) mod poller;
mod preview;

pub(crate) use controller::{run_controller, Controllers, SessionSettings, UiCommand};
