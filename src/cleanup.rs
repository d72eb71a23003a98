//! Log directory cleanup.
//!
//! Deletes consumed log files once a report has been written, leaving the
//! directory empty for the next cycle. Subdirectories are left alone.

use std::fmt;
use std::path::{Path, PathBuf};

/// Remove every regular file directly under `log_dir`. Returns how many were removed.
pub fn clear(log_dir: &Path) -> Result<usize, CleanupError> {
    let entries = std::fs::read_dir(log_dir).map_err(|e| CleanupError::ReadDir {
        path: log_dir.to_path_buf(),
        source: e,
    })?;

    let mut removed = 0;
    for entry in entries {
        let entry = entry.map_err(|e| CleanupError::ReadDir {
            path: log_dir.to_path_buf(),
            source: e,
        })?;
        let path = entry.path();
        match entry.file_type() {
            Ok(t) if t.is_file() || t.is_symlink() => {}
            _ => continue,
        }
        std::fs::remove_file(&path).map_err(|e| CleanupError::Remove {
            path: path.clone(),
            source: e,
        })?;
        tracing::debug!(file = %path.display(), "removed log file");
        removed += 1;
    }

    tracing::info!(dir = %log_dir.display(), removed, "cleared log directory");
    Ok(removed)
}

/// Make sure `log_dir` exists and holds no files from an earlier cycle.
pub fn prepare(log_dir: &Path) -> Result<usize, CleanupError> {
    std::fs::create_dir_all(log_dir).map_err(|e| CleanupError::ReadDir {
        path: log_dir.to_path_buf(),
        source: e,
    })?;
    let removed = clear(log_dir)?;
    if removed > 0 {
        tracing::warn!(removed, "removed stale log files from a previous run");
    }
    Ok(removed)
}

#[derive(Debug)]
pub enum CleanupError {
    ReadDir { path: PathBuf, source: std::io::Error },
    Remove { path: PathBuf, source: std::io::Error },
}

impl fmt::Display for CleanupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CleanupError::ReadDir { path, source } => {
                write!(f, "failed to read log directory {}: {}", path.display(), source)
            }
            CleanupError::Remove { path, source } => {
                write!(f, "failed to remove log file {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for CleanupError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CleanupError::ReadDir { source, .. } => Some(source),
            CleanupError::Remove { source, .. } => Some(source),
        }
    }
}
