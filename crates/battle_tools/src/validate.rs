//! Rules file validation.

use std::path::{Path, PathBuf};

use battle_core::config::RulesConfig;
use battle_core::error::{GameError, Result};
use tracing::{info, warn};

/// One checked file.
#[derive(Debug)]
pub struct FileReport {
    /// File checked.
    pub path: PathBuf,
    /// `None` when the file is valid.
    pub error: Option<GameError>,
}

/// Validate a rules file, or every `.ron` file directly inside a directory.
///
/// # Errors
///
/// Returns an error if the path cannot be read. Problems inside individual
/// files are reported per file instead.
pub fn validate_rules_path(path: &Path) -> Result<Vec<FileReport>> {
    let files = if path.is_dir() {
        let entries = std::fs::read_dir(path).map_err(|e| GameError::ConfigError {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "ron"))
            .collect();
        files.sort();
        files
    } else {
        vec![path.to_path_buf()]
    };

    let reports = files
        .into_iter()
        .map(|file| {
            let error = RulesConfig::load(&file).err();
            match &error {
                Some(e) => warn!(path = %file.display(), error = %e, "Invalid rules file"),
                None => info!(path = %file.display(), "Rules file ok"),
            }
            FileReport { path: file, error }
        })
        .collect();
    Ok(reports)
}
