//! Per-user preferences that survive between sessions.
//!
//! Only the last-used repository path is remembered. The file lives under the
//! platform config directory unless `--prefs-file` points elsewhere.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default)]
    pub last_repo_path: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PreferenceStore {
    path: PathBuf,
}

impl PreferenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn default_path() -> Result<PathBuf> {
        let base = dirs::config_dir().context("no config directory for this user")?;
        Ok(base.join("git-chronoscope").join("preferences.json"))
    }

    pub fn load(&self) -> Result<Preferences> {
        if !self.path.exists() {
            return Ok(Preferences::default());
        }
        let data = std::fs::read(&self.path)
            .with_context(|| format!("read {}", self.path.display()))?;
        serde_json::from_slice(&data).with_context(|| format!("parse {}", self.path.display()))
    }

    /// Stored repository path, if any. A corrupt file reads as empty.
    pub fn last_repo_path(&self) -> Option<String> {
        match self.load() {
            Ok(prefs) => prefs.last_repo_path.filter(|p| !p.trim().is_empty()),
            Err(e) => {
                warn!(error = %format!("{e:#}"), "ignoring unreadable preferences");
                None
            }
        }
    }

    /// Overwrite the stored repository path. Blank input is not stored.
    pub fn remember_repo_path(&self, repo_path: &str) -> Result<()> {
        let repo_path = repo_path.trim();
        if repo_path.is_empty() {
            return Ok(());
        }
        let mut prefs = self.load().unwrap_or_default();
        prefs.last_repo_path = Some(repo_path.to_string());

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        let data = serde_json::to_vec_pretty(&prefs)?;
        std::fs::write(&self.path, data)
            .with_context(|| format!("write {}", self.path.display()))?;
        debug!(path = %self.path.display(), repo_path, "remembered repository path");
        Ok(())
    }
}
