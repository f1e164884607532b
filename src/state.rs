use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stackgraph::Snapshot;
use std::fs;
use std::path::Path;

/// What the last apply realized, persisted as JSON between runs
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct StateFile {
    /// Stack the snapshot belongs to
    pub stack: String,

    /// Last time the state was written
    pub updated_at: DateTime<Utc>,

    #[serde(flatten)]
    pub snapshot: Snapshot,
}

impl StateFile {
    pub fn new(stack: impl Into<String>, snapshot: Snapshot) -> Self {
        Self {
            stack: stack.into(),
            updated_at: Utc::now(),
            snapshot,
        }
    }

    /// Load state from disk, or `None` if the file doesn't exist
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            log::debug!("State file {} does not exist", path.display());
            return Ok(None);
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read state file: {}", path.display()))?;
        let state: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse state file: {}", path.display()))?;

        log::debug!(
            "Loaded state for '{}' from {} ({} resources)",
            state.stack,
            path.display(),
            state.snapshot.len()
        );
        Ok(Some(state))
    }

    /// Snapshot for `stack`, ignoring state written by a different stack
    pub fn load_snapshot(path: &Path, stack: &str) -> Result<Option<Snapshot>> {
        Ok(Self::load(path)?.and_then(|state| {
            if state.stack == stack {
                Some(state.snapshot)
            } else {
                log::warn!(
                    "State file {} belongs to stack '{}', not '{stack}'; ignoring it",
                    path.display(),
                    state.stack
                );
                None
            }
        }))
    }

    /// Save state to disk, refreshing the timestamp
    pub fn save(&mut self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create state directory: {}", dir.display()))?;
        }

        self.updated_at = Utc::now();
        let content =
            serde_json::to_string_pretty(&self).context("Failed to serialize state to JSON")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write state file: {}", path.display()))?;

        log::debug!("Saved state to {}", path.display());
        Ok(())
    }
}
