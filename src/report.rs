//! Report file rendering and writing.
//!
//! One line per metric: `name SEP per_core SEP average [SEP normalized]`.
//! Truncate mode writes through a temp file in the same directory and renames
//! it into place, so a failed write never leaves half a report behind.

use crate::config::{ReportConfig, Separator, WriteMode};
use crate::metrics::Aggregation;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Render every result as one report line, in aggregation order.
pub fn render(aggregation: &Aggregation, separator: Separator) -> String {
    let sep = separator.as_str();
    let mut out = String::new();
    for r in &aggregation.results {
        out.push_str(&r.name);
        out.push_str(sep);
        out.push_str(&r.per_core_task_estimate.to_string());
        out.push_str(sep);
        out.push_str(&format_value(r.average_value));
        if let Some(normalized) = r.normalized_value {
            out.push_str(sep);
            out.push_str(&format_value(normalized));
        }
        out.push('\n');
    }
    out
}

/// Shortest round-trip decimal, always with a fractional part (`3.0`, `7.5`).
fn format_value(v: f64) -> String {
    if v.is_finite() && v.fract() == 0.0 {
        format!("{v:.1}")
    } else {
        format!("{v}")
    }
}

/// Render `aggregation` and write it to the configured report path.
pub fn write_report(aggregation: &Aggregation, config: &ReportConfig) -> Result<(), ReportError> {
    let contents = render(aggregation, config.separator);
    match config.write_mode {
        WriteMode::Truncate => write_atomic(&config.path, contents.as_bytes())?,
        WriteMode::Append => append(&config.path, contents.as_bytes())?,
    }
    tracing::info!(
        path = %config.path.display(),
        mode = ?config.write_mode,
        lines = aggregation.results.len(),
        "wrote report"
    );
    Ok(())
}

fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), ReportError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| ReportError::Write {
        path: dir.to_path_buf(),
        source: e,
    })?;
    tmp.write_all(contents).map_err(|e| ReportError::Write {
        path: tmp.path().to_path_buf(),
        source: e,
    })?;
    tmp.persist(path).map_err(|e| ReportError::Persist {
        path: path.to_path_buf(),
        source: e.error,
    })?;
    Ok(())
}

fn append(path: &Path, contents: &[u8]) -> Result<(), ReportError> {
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| ReportError::Write {
            path: path.to_path_buf(),
            source: e,
        })?;
    file.write_all(contents).map_err(|e| ReportError::Write {
        path: path.to_path_buf(),
        source: e,
    })
}

#[derive(Debug)]
pub enum ReportError {
    Write { path: PathBuf, source: std::io::Error },
    Persist { path: PathBuf, source: std::io::Error },
}

impl fmt::Display for ReportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportError::Write { path, source } => {
                write!(f, "failed to write report {}: {}", path.display(), source)
            }
            ReportError::Persist { path, source } => {
                write!(f, "failed to move report into place at {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for ReportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ReportError::Write { source, .. } => Some(source),
            ReportError::Persist { source, .. } => Some(source),
        }
    }
}
