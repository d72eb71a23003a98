//! One benchmark cycle: prepare the log directory, fan out, aggregate,
//! write the report, clean up.
//!
//! Cleanup only runs once the report is on disk. Any failure before that
//! point leaves the raw logs in place for diagnosis.

use crate::cleanup::{self, CleanupError};
use crate::config::{BenchConfig, ConfigError, PolyModulusDegree, ProcessCount};
use crate::metrics::{aggregate, AggregateError, Aggregation, StatsOptions};
use crate::orchestrator::{run_parallel, FanOut};
use crate::report::{write_report, ReportError};
use crate::signals::Shutdown;
use crate::watchdog::Watchdog;
use std::fmt;

/// What a completed cycle produced.
#[derive(Debug)]
pub struct CycleSummary {
    pub fan_out: FanOut,
    pub aggregation: Aggregation,
}

/// Run the benchmark `processes` times in parallel and report on the logs.
pub async fn run_cycle(
    config: &BenchConfig,
    processes: ProcessCount,
    degree: PolyModulusDegree,
    shutdown: &Shutdown,
    keep_logs: bool,
) -> Result<CycleSummary, PipelineError> {
    if config.logs.clear_before_run {
        cleanup::prepare(&config.logs.dir)?;
    } else {
        std::fs::create_dir_all(&config.logs.dir).map_err(|e| CleanupError::ReadDir {
            path: config.logs.dir.clone(),
            source: e,
        })?;
    }

    let watchdog = Watchdog::from_timeout_secs(config.orchestrator.timeout_secs, shutdown.clone());
    let fan_out = run_parallel(&config.runner, degree, processes.get(), &watchdog).await;

    if fan_out.interrupted() || shutdown.is_triggered() {
        return Err(PipelineError::Interrupted);
    }

    let aggregation = aggregate_and_report(config, keep_logs)?;
    Ok(CycleSummary {
        fan_out,
        aggregation,
    })
}

/// Aggregate whatever logs are present, write the report, then clear the logs
/// unless `keep_logs` is set.
pub fn aggregate_and_report(
    config: &BenchConfig,
    keep_logs: bool,
) -> Result<Aggregation, PipelineError> {
    let options = StatsOptions::from(&config.report);
    let aggregation = aggregate(&config.logs.dir, &options)?;
    write_report(&aggregation, &config.report)?;

    if keep_logs {
        tracing::info!(dir = %config.logs.dir.display(), "keeping log files");
    } else {
        cleanup::clear(&config.logs.dir)?;
    }
    Ok(aggregation)
}

#[derive(Debug)]
pub enum PipelineError {
    Config(ConfigError),
    Aggregate(AggregateError),
    Report(ReportError),
    Cleanup(CleanupError),
    /// The operator interrupted the run; logs were left in place.
    Interrupted,
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Config(e) => write!(f, "{e}"),
            PipelineError::Aggregate(e) => write!(f, "aggregation failed: {e}"),
            PipelineError::Report(e) => write!(f, "{e}"),
            PipelineError::Cleanup(e) => write!(f, "{e}"),
            PipelineError::Interrupted => {
                write!(f, "interrupted; benchmark logs were left in place")
            }
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PipelineError::Config(e) => Some(e),
            PipelineError::Aggregate(e) => Some(e),
            PipelineError::Report(e) => Some(e),
            PipelineError::Cleanup(e) => Some(e),
            PipelineError::Interrupted => None,
        }
    }
}

impl From<ConfigError> for PipelineError {
    fn from(e: ConfigError) -> Self {
        PipelineError::Config(e)
    }
}

impl From<AggregateError> for PipelineError {
    fn from(e: AggregateError) -> Self {
        PipelineError::Aggregate(e)
    }
}

impl From<ReportError> for PipelineError {
    fn from(e: ReportError) -> Self {
        PipelineError::Report(e)
    }
}

impl From<CleanupError> for PipelineError {
    fn from(e: CleanupError) -> Self {
        PipelineError::Cleanup(e)
    }
}
