//! Branch list for the repository in the form.

use crate::api::RenderService;
use crate::error::{ActionError, ValidationError};
use crate::model::{BranchList, ControlState, UiEvent};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

/// Holds the branch options last loaded. Each successful load replaces them wholesale,
/// whichever repository it was for; a failed load leaves them alone.
pub(crate) struct BranchCache {
    service: Arc<dyn RenderService>,
    events: UnboundedSender<UiEvent>,
    list: BranchList,
}

impl BranchCache {
    pub fn new(service: Arc<dyn RenderService>, events: UnboundedSender<UiEvent>) -> Self {
        Self {
            service,
            events,
            list: BranchList::default(),
        }
    }

    #[cfg(test)]
    pub fn list(&self) -> &BranchList {
        &self.list
    }

    pub async fn load(&mut self, repo_path: &str) -> Result<&BranchList, ActionError> {
        let repo_path = repo_path.trim();
        if repo_path.is_empty() {
            self.send(UiEvent::alert(
                "Branches",
                "Please enter a repository path first.",
            ));
            return Err(ValidationError::MissingRepoPath.into());
        }

        self.send(UiEvent::BranchControl(ControlState::busy("Loading...")));
        let result = self.service.list_branches(repo_path).await;
        self.send(UiEvent::BranchControl(ControlState::Ready));

        match result {
            Ok(names) => {
                debug!(repo = repo_path, count = names.len(), "branches loaded");
                self.list = BranchList::from_names(names);
                let count = self.list.branch_count();
                self.send(UiEvent::BranchesLoaded(self.list.clone()));
                self.send(UiEvent::Info(format!("Loaded {count} branch(es)")));
                Ok(&self.list)
            }
            Err(e) => {
                warn!(repo = repo_path, error = %e, "branch listing failed");
                self.send(UiEvent::alert("Error loading branches", e.to_string()));
                Err(e.into())
            }
        }
    }

    fn send(&self, event: UiEvent) {
        let _ = self.events.send(event);
    }
}
