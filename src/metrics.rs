//! Cross-run metric aggregation.
//!
//! Every log file in the record directory is folded into one `MetricTable`:
//! samples for the same metric name are merged across files and `count`
//! lines add up to a single case total. The table then yields one
//! `AggregateResult` per metric, normalized by the estimated number of
//! cases each process handled.

use crate::config::{AverageMode, ReportConfig};
use crate::logline::{parse_line, LineError, LogLine};
use crate::scanner::list_log_files;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::io::BufRead;
use std::path::{Path, PathBuf};

/// Metric name → samples gathered from every file, in first-seen order.
#[derive(Debug, Default)]
pub struct MetricTable {
    metrics: Vec<(String, Vec<u64>)>,
    index: HashMap<String, usize>,
    total_case_count: u64,
    file_count: u64,
}

/// Statistics for one metric across the whole run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateResult {
    pub name: String,
    pub sample_count: usize,
    pub total_case_count: u64,
    pub per_core_task_estimate: u64,
    pub average_value: f64,
    /// Absent for setup metrics, which are not divided per core.
    pub normalized_value: Option<f64>,
}

/// A finished aggregation, ready to be rendered into a report.
#[derive(Debug, Clone, Serialize)]
pub struct Aggregation {
    pub file_count: u64,
    pub total_case_count: u64,
    pub per_core_task_estimate: u64,
    pub average_mode: AverageMode,
    pub results: Vec<AggregateResult>,
}

/// Knobs for turning a table into results.
#[derive(Debug, Clone)]
pub struct StatsOptions {
    pub average_mode: AverageMode,
    pub setup_metrics: Vec<String>,
}

impl From<&ReportConfig> for StatsOptions {
    fn from(config: &ReportConfig) -> Self {
        Self {
            average_mode: config.average_mode,
            setup_metrics: config.setup_metrics.clone(),
        }
    }
}

impl MetricTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, line: LogLine<'_>) {
        match line {
            LogLine::Blank => {}
            LogLine::Count(n) => self.total_case_count = self.total_case_count.saturating_add(n),
            LogLine::Metric { name, value } => match self.index.get(name) {
                Some(&i) => self.metrics[i].1.push(value),
                None => {
                    self.index.insert(name.to_string(), self.metrics.len());
                    self.metrics.push((name.to_string(), vec![value]));
                }
            },
        }
    }

    /// Fold every line of one log file into the table.
    ///
    /// The file is parsed completely before anything is recorded, so a
    /// malformed file leaves the table untouched. Lines are decoded one at a
    /// time so invalid UTF-8 is reported with its line number.
    pub fn ingest_reader<R: BufRead>(
        &mut self,
        path: &Path,
        reader: R,
    ) -> Result<(), AggregateError> {
        let mut lines = Vec::new();
        for (i, raw) in reader.split(b'\n').enumerate() {
            let mut raw = raw.map_err(|e| AggregateError::Read {
                path: path.to_path_buf(),
                source: e,
            })?;
            if raw.last() == Some(&b'\r') {
                raw.pop();
            }
            let line = String::from_utf8(raw).map_err(|e| AggregateError::MalformedLog {
                path: path.to_path_buf(),
                line: i + 1,
                text: String::from_utf8_lossy(e.as_bytes()).into_owned(),
                reason: LineError::InvalidUtf8,
            })?;
            lines.push((i + 1, line));
        }

        let mut parsed = Vec::with_capacity(lines.len());
        for (line_no, text) in &lines {
            let entry = parse_line(text).map_err(|reason| AggregateError::MalformedLog {
                path: path.to_path_buf(),
                line: *line_no,
                text: text.clone(),
                reason,
            })?;
            parsed.push(entry);
        }

        for entry in parsed {
            self.record(entry);
        }
        self.file_count += 1;
        Ok(())
    }

    pub fn ingest_file(&mut self, path: &Path) -> Result<(), AggregateError> {
        let file = std::fs::File::open(path).map_err(|e| AggregateError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        self.ingest_reader(path, std::io::BufReader::new(file))?;
        tracing::debug!(file = %path.display(), "ingested log file");
        Ok(())
    }

    /// Expected number of cases handled by each process, rounded up.
    pub fn per_core_task_estimate(&self) -> Result<u64, AggregateError> {
        if self.file_count == 0 {
            return Err(AggregateError::EmptyInput { dir: None });
        }
        Ok(self.total_case_count.div_ceil(self.file_count))
    }

    pub fn summarize(&self, options: &StatsOptions) -> Result<Aggregation, AggregateError> {
        let per_core = self.per_core_task_estimate()?;

        let mut results = Vec::with_capacity(self.metrics.len());
        for (name, samples) in &self.metrics {
            let average = average_value(samples, options.average_mode);
            let normalized = if options.setup_metrics.iter().any(|m| m == name) {
                None
            } else if per_core == 0 {
                return Err(AggregateError::ZeroCaseCount {
                    metric: name.clone(),
                });
            } else {
                Some(average / per_core as f64)
            };

            results.push(AggregateResult {
                name: name.clone(),
                sample_count: samples.len(),
                total_case_count: self.total_case_count,
                per_core_task_estimate: per_core,
                average_value: average,
                normalized_value: normalized,
            });
        }

        Ok(Aggregation {
            file_count: self.file_count,
            total_case_count: self.total_case_count,
            per_core_task_estimate: per_core,
            average_mode: options.average_mode,
            results,
        })
    }
}

/// `SquaredCount` divides the sample sum by the squared sample count, which
/// is what historical reports used; `Mean` is the arithmetic mean.
pub fn average_value(samples: &[u64], mode: AverageMode) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: u128 = samples.iter().map(|&v| v as u128).sum();
    let n = samples.len() as f64;
    let divisor = match mode {
        AverageMode::SquaredCount => n * n,
        AverageMode::Mean => n,
    };
    sum as f64 / divisor
}

/// Scan `log_dir` and aggregate every log file in it.
pub fn aggregate(log_dir: &Path, options: &StatsOptions) -> Result<Aggregation, AggregateError> {
    let files = list_log_files(log_dir).map_err(|e| AggregateError::Scan {
        dir: log_dir.to_path_buf(),
        source: e,
    })?;
    if files.is_empty() {
        return Err(AggregateError::EmptyInput {
            dir: Some(log_dir.to_path_buf()),
        });
    }

    let mut table = MetricTable::new();
    for file in &files {
        table.ingest_file(file)?;
    }

    let aggregation = table.summarize(options)?;
    tracing::info!(
        files = aggregation.file_count,
        total_cases = aggregation.total_case_count,
        per_core = aggregation.per_core_task_estimate,
        metrics = aggregation.results.len(),
        "aggregated benchmark logs"
    );
    Ok(aggregation)
}

#[derive(Debug)]
pub enum AggregateError {
    /// No log files to aggregate.
    EmptyInput { dir: Option<PathBuf> },
    MalformedLog {
        path: PathBuf,
        line: usize,
        text: String,
        reason: LineError,
    },
    /// A metric needs per-core normalization but no cases were counted.
    ZeroCaseCount { metric: String },
    Scan { dir: PathBuf, source: std::io::Error },
    Read { path: PathBuf, source: std::io::Error },
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregateError::EmptyInput { dir: Some(dir) } => {
                write!(f, "no log files found in {}", dir.display())
            }
            AggregateError::EmptyInput { dir: None } => write!(f, "no log files to aggregate"),
            AggregateError::MalformedLog {
                path,
                line,
                text,
                reason,
            } => write!(
                f,
                "malformed log line {}:{}: {} ({:?})",
                path.display(),
                line,
                reason,
                text
            ),
            AggregateError::ZeroCaseCount { metric } => write!(
                f,
                "cannot normalize {metric:?}: logs report a total case count of 0"
            ),
            AggregateError::Scan { dir, source } => {
                write!(f, "failed to list log directory {}: {}", dir.display(), source)
            }
            AggregateError::Read { path, source } => {
                write!(f, "failed to read log file {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for AggregateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AggregateError::MalformedLog { reason, .. } => Some(reason),
            AggregateError::Scan { source, .. } => Some(source),
            AggregateError::Read { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_SETUP_METRICS;
    use tempfile::tempdir;

    fn options(mode: AverageMode) -> StatsOptions {
        StatsOptions {
            average_mode: mode,
            setup_metrics: DEFAULT_SETUP_METRICS.iter().map(|s| s.to_string()).collect(),
        }
    }

    impl MetricTable {
        fn total_case_count(&self) -> u64 {
            self.total_case_count
        }

        fn file_count(&self) -> u64 {
            self.file_count
        }

        fn samples(&self, name: &str) -> Option<&[u64]> {
            self.index.get(name).map(|&i| self.metrics[i].1.as_slice())
        }
    }

    fn write_logs(dir: &Path, logs: &[(&str, &str)]) {
        for (name, contents) in logs {
            std::fs::write(dir.join(name), contents).unwrap();
        }
    }

    #[test]
    fn test_two_file_example() {
        let dir = tempdir().unwrap();
        write_logs(
            dir.path(),
            &[("log0", "count:5\nfoo:10 ms\n"), ("log1", "count:7\nfoo:20 ms\n")],
        );

        let agg = aggregate(dir.path(), &options(AverageMode::SquaredCount)).unwrap();
        assert_eq!(agg.file_count, 2);
        assert_eq!(agg.total_case_count, 12);
        assert_eq!(agg.per_core_task_estimate, 6);
        assert_eq!(
            agg.results,
            vec![AggregateResult {
                name: "foo".to_string(),
                sample_count: 2,
                total_case_count: 12,
                per_core_task_estimate: 6,
                average_value: 7.5,
                normalized_value: Some(1.25),
            }]
        );
    }

    #[test]
    fn test_mean_mode() {
        let dir = tempdir().unwrap();
        write_logs(
            dir.path(),
            &[("log0", "count:5\nfoo:10 ms\n"), ("log1", "count:7\nfoo:20 ms\n")],
        );

        let agg = aggregate(dir.path(), &options(AverageMode::Mean)).unwrap();
        assert_eq!(agg.results[0].average_value, 15.0);
        assert_eq!(agg.results[0].normalized_value, Some(2.5));
    }

    #[test]
    fn test_per_core_rounds_up_and_is_shared() {
        let dir = tempdir().unwrap();
        write_logs(
            dir.path(),
            &[
                ("log0", "count:4\nfoo:1\nbar:2\n"),
                ("log1", "count:4\nfoo:1\n"),
                ("log2", "count:3\nbar:2\n"),
            ],
        );

        let agg = aggregate(dir.path(), &options(AverageMode::SquaredCount)).unwrap();
        // ceil(11 / 3) = 4
        assert_eq!(agg.per_core_task_estimate, 4);
        assert!(agg.results.iter().all(|r| r.per_core_task_estimate == 4));
    }

    #[test]
    fn test_setup_metrics_skip_normalization() {
        let dir = tempdir().unwrap();
        write_logs(
            dir.path(),
            &[("log0", "Generate Keys Done:42 ms\ncount:2\nAverage add:8 microseconds\n")],
        );

        let agg = aggregate(dir.path(), &options(AverageMode::SquaredCount)).unwrap();
        assert_eq!(agg.results[0].name, "Generate Keys Done");
        assert_eq!(agg.results[0].average_value, 42.0);
        assert_eq!(agg.results[0].normalized_value, None);
        assert_eq!(agg.results[1].normalized_value, Some(4.0));
    }

    #[test]
    fn test_metrics_keep_first_seen_order() {
        let dir = tempdir().unwrap();
        write_logs(
            dir.path(),
            &[("a", "count:1\nzeta:1\nalpha:1\n"), ("b", "count:1\nbeta:1\nzeta:3\n")],
        );

        let agg = aggregate(dir.path(), &options(AverageMode::SquaredCount)).unwrap();
        let names: Vec<_> = agg.results.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["zeta", "alpha", "beta"]);
        assert_eq!(agg.results[0].sample_count, 2);
    }

    #[test]
    fn test_empty_directory_is_error() {
        let dir = tempdir().unwrap();
        let err = aggregate(dir.path(), &options(AverageMode::SquaredCount)).unwrap_err();
        assert!(matches!(err, AggregateError::EmptyInput { dir: Some(_) }));
    }

    #[test]
    fn test_empty_table_is_error() {
        let err = MetricTable::new()
            .summarize(&options(AverageMode::SquaredCount))
            .unwrap_err();
        assert!(matches!(err, AggregateError::EmptyInput { dir: None }));
    }

    #[test]
    fn test_malformed_line_reports_location() {
        let dir = tempdir().unwrap();
        write_logs(
            dir.path(),
            &[
                ("log0", "count:5\nfoo:10 ms\n"),
                ("log1", "count:7\nno separator here\n"),
            ],
        );

        let err = aggregate(dir.path(), &options(AverageMode::SquaredCount)).unwrap_err();
        match err {
            AggregateError::MalformedLog {
                path,
                line,
                text,
                reason,
            } => {
                assert_eq!(path, dir.path().join("log1"));
                assert_eq!(line, 2);
                assert_eq!(text, "no separator here");
                assert_eq!(reason, LineError::MissingSeparator);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_malformed_file_leaves_table_untouched() {
        let mut table = MetricTable::new();
        let res = table.ingest_reader(Path::new("log0"), "count:5\nfoo:ten\n".as_bytes());
        assert!(res.is_err());
        assert_eq!(table.total_case_count(), 0);
        assert_eq!(table.file_count(), 0);
        assert!(table.samples("foo").is_none());
    }

    #[test]
    fn test_invalid_utf8_reports_line() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("log0"), b"count:5\nfoo\xff:10 ms\n").unwrap();

        let err = aggregate(dir.path(), &options(AverageMode::SquaredCount)).unwrap_err();
        match err {
            AggregateError::MalformedLog {
                path, line, reason, ..
            } => {
                assert_eq!(path, dir.path().join("log0"));
                assert_eq!(line, 2);
                assert_eq!(reason, LineError::InvalidUtf8);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_crlf_line_endings() {
        let mut table = MetricTable::new();
        table
            .ingest_reader(Path::new("log0"), "count:3\r\nfoo:6 ms\r\n".as_bytes())
            .unwrap();
        assert_eq!(table.total_case_count(), 3);
        assert_eq!(table.samples("foo"), Some(&[6][..]));
    }

    #[test]
    fn test_zero_cases_is_error() {
        let dir = tempdir().unwrap();
        write_logs(dir.path(), &[("log0", "foo:10 ms\n")]);
        let err = aggregate(dir.path(), &options(AverageMode::SquaredCount)).unwrap_err();
        assert!(matches!(err, AggregateError::ZeroCaseCount { .. }));
    }

    #[test]
    fn test_zero_cases_allowed_for_setup_metrics_only() {
        let dir = tempdir().unwrap();
        write_logs(dir.path(), &[("log0", "Generate Keys Done: 100 microseconds\n")]);
        let agg = aggregate(dir.path(), &options(AverageMode::SquaredCount)).unwrap();
        assert_eq!(agg.per_core_task_estimate, 0);
        assert_eq!(agg.results[0].average_value, 100.0);
    }

    #[test]
    fn test_blank_lines_are_ignored() {
        let mut table = MetricTable::new();
        table
            .ingest_reader(Path::new("log0"), "count:2\n\nfoo:4 ms\n\n".as_bytes())
            .unwrap();
        assert_eq!(table.total_case_count(), 2);
        assert_eq!(table.samples("foo"), Some(&[4][..]));
    }

    #[test]
    fn test_average_value_formulas() {
        assert_eq!(average_value(&[10, 20], AverageMode::SquaredCount), 7.5);
        assert_eq!(average_value(&[10, 20], AverageMode::Mean), 15.0);
        assert_eq!(average_value(&[9], AverageMode::SquaredCount), 9.0);
        assert_eq!(average_value(&[], AverageMode::Mean), 0.0);
    }
}
