//! Log directory enumeration.
//!
//! Lists the regular files directly under the log directory, one per
//! benchmark process. Symlinks are followed, so a linked log is read like any
//! other before cleanup removes the link. Subdirectories are not descended into and hidden files
//! (leading `.`) are skipped. The result is sorted by path so aggregation
//! never depends on the order the filesystem hands entries back.

use std::path::{Path, PathBuf};

pub fn list_log_files(log_dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in std::fs::read_dir(log_dir)? {
        let entry = entry?;
        let path = entry.path();

        let hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with('.'));
        if hidden {
            continue;
        }

        let is_file = match std::fs::metadata(&path) {
            Ok(meta) => meta.is_file(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(file = %path.display(), "skipping dangling symlink");
                false
            }
            Err(e) => return Err(e),
        };
        if !is_file {
            continue;
        }

        files.push(path);
    }

    files.sort();
    tracing::debug!(dir = %log_dir.display(), files = files.len(), "scanned log directory");
    Ok(files)
}
