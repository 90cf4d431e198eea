//! Server configuration, loaded from RON.

use std::path::{Path, PathBuf};
use std::time::Duration;

use battle_core::config::RulesConfig;
use battle_core::inbox::SubmissionWindow;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, ServerError};

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Time between tick boundaries, in milliseconds.
    pub tick_interval_ms: u64,
    /// How long before a boundary submissions for that tick close.
    pub submission_deadline_ms: u64,
    /// Buffered state ticks per player and snapshots per spectator.
    pub snapshot_capacity: usize,
    /// Queued submissions across all players.
    pub order_capacity: usize,
    /// Match seed.
    pub seed: u64,
    /// Rules file; built-in defaults when absent.
    pub rules_path: Option<PathBuf>,
    /// Where to write the replay when the match ends.
    pub replay_path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            submission_deadline_ms: 100,
            snapshot_capacity: 16,
            order_capacity: 256,
            seed: 0,
            rules_path: None,
            replay_path: None,
        }
    }
}

impl ServerConfig {
    /// Load a config from a RON file.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Config`] if the file cannot be read or parsed,
    /// or the deadline is not shorter than the tick interval.
    pub fn load(path: &Path) -> Result<Self> {
        let path_str = path.display().to_string();
        let text = std::fs::read_to_string(path).map_err(|e| ServerError::Config {
            path: path_str.clone(),
            message: e.to_string(),
        })?;
        let config: Self = ron::from_str(&text).map_err(|e| ServerError::Config {
            path: path_str.clone(),
            message: e.to_string(),
        })?;
        if config.submission_deadline_ms >= config.tick_interval_ms {
            return Err(ServerError::Config {
                path: path_str,
                message: "submission_deadline_ms must be shorter than tick_interval_ms".to_string(),
            });
        }
        info!(path = %path_str, "Loaded server config");
        Ok(config)
    }

    /// Tick cadence as the inboxes see it.
    #[must_use]
    pub fn window(&self) -> SubmissionWindow {
        SubmissionWindow {
            tick_interval: Duration::from_millis(self.tick_interval_ms),
            deadline: Duration::from_millis(self.submission_deadline_ms),
        }
    }

    /// The rules to play under.
    ///
    /// # Errors
    ///
    /// Returns an error if the rules file is set and fails to load.
    pub fn rules(&self) -> Result<RulesConfig> {
        match &self.rules_path {
            Some(path) => Ok(RulesConfig::load(path)?),
            None => Ok(RulesConfig::default()),
        }
    }
}
