//! Fan-out of identical benchmark processes behind a start-all/join-all barrier.

use crate::config::{PolyModulusDegree, RunnerConfig};
use crate::runner::{run_benchmark, RunOutcome, RunStatus};
use crate::watchdog::Watchdog;
use std::sync::Arc;
use tokio::task::JoinSet;

/// Outcomes of every child in one fan-out, ordered by child index.
#[derive(Debug, Default)]
pub struct FanOut {
    pub outcomes: Vec<RunOutcome>,
}

impl FanOut {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.status.is_success()).count()
    }

    pub fn failed(&self) -> impl Iterator<Item = &RunOutcome> {
        self.outcomes.iter().filter(|o| !o.status.is_success())
    }

    /// True if any child was killed because the operator interrupted the run.
    pub fn interrupted(&self) -> bool {
        self.outcomes
            .iter()
            .any(|o| o.status == RunStatus::Interrupted)
    }
}

/// Spawn `process_count` copies of the benchmark and wait for all of them.
///
/// Every child is started before any is awaited. A failing child is
/// recorded in the result and never retried; its siblings keep running.
/// `process_count == 0` returns an empty `FanOut`.
pub async fn run_parallel(
    runner: &RunnerConfig,
    degree: PolyModulusDegree,
    process_count: u32,
    watchdog: &Watchdog,
) -> FanOut {
    if process_count == 0 {
        tracing::debug!("no benchmark processes requested");
        return FanOut::default();
    }

    tracing::info!(
        processes = process_count,
        degree = degree.value(),
        command = %runner.command,
        "starting benchmark fan-out"
    );

    let runner = Arc::new(runner.clone());
    let mut tasks = JoinSet::new();
    for index in 0..process_count {
        let runner = Arc::clone(&runner);
        let watchdog = watchdog.clone();
        tasks.spawn(async move { run_benchmark(&runner, degree, index, &watchdog).await });
    }

    let mut outcomes = Vec::with_capacity(process_count as usize);
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => tracing::error!(error = %e, "benchmark supervisor task failed"),
        }
    }
    outcomes.sort_by_key(|o| o.index);

    let fan_out = FanOut { outcomes };
    for outcome in fan_out.failed() {
        tracing::warn!(
            index = outcome.index,
            pid = outcome.pid,
            status = ?outcome.status,
            duration_ms = outcome.duration.as_millis() as u64,
            "benchmark process did not succeed"
        );
    }
    tracing::info!(
        succeeded = fan_out.succeeded(),
        total = process_count,
        "benchmark fan-out complete"
    );
    fan_out
}
