//! Single benchmark invocation: spawn the external binary, wait for it under
//! a watchdog, and report how it ended (exit status, pid, duration).
//!
//! The binary writes its timing log into the shared log directory itself;
//! the runner never looks at that file.

use crate::config::{PolyModulusDegree, RunnerConfig};
use crate::watchdog::{Watchdog, WatchdogOutcome};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;

/// Terminal state of one benchmark process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    /// Exited on its own with this code.
    Exited(i32),
    /// Killed by a signal it did not receive from us.
    Signaled,
    /// The binary could not be started.
    SpawnFailed(String),
    /// Started, but waiting on it failed; its real exit is unknown.
    WaitFailed(String),
    /// Killed by the watchdog after the deadline.
    TimedOut,
    /// Killed because the operator interrupted the run.
    Interrupted,
}

impl RunStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, RunStatus::Exited(0))
    }
}

/// Result of a completed benchmark process.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Position of this child within the fan-out (0-based).
    pub index: u32,
    /// Child PID (0 if it never started).
    pub pid: u32,
    pub status: RunStatus,
    /// Wall-clock duration from spawn to exit.
    pub duration: Duration,
}

/// Build the command arguments, replacing `{degree}` and `{mode}` placeholders.
fn build_args(runner: &RunnerConfig, degree: PolyModulusDegree) -> Vec<String> {
    let degree = degree.to_string();
    runner
        .args
        .iter()
        .map(|arg| arg.replace("{degree}", &degree).replace("{mode}", &runner.mode))
        .collect()
}

fn run_status(monitored: std::io::Result<WatchdogOutcome>) -> RunStatus {
    match monitored {
        Ok(WatchdogOutcome::Exited(exit)) => match exit.code() {
            Some(code) => RunStatus::Exited(code),
            None => RunStatus::Signaled,
        },
        Ok(WatchdogOutcome::TimedOut) => RunStatus::TimedOut,
        Ok(WatchdogOutcome::Interrupted) => RunStatus::Interrupted,
        Err(e) => RunStatus::WaitFailed(e.to_string()),
    }
}

/// Run the benchmark binary once and wait for it to terminate.
///
/// Spawn and wait failures are folded into the returned status rather than
/// surfaced as errors; one broken child must not abort its siblings. The
/// child is placed in its own process group so the watchdog can kill
/// anything it forks.
pub async fn run_benchmark(
    runner: &RunnerConfig,
    degree: PolyModulusDegree,
    index: u32,
    watchdog: &Watchdog,
) -> RunOutcome {
    let args = build_args(runner, degree);
    tracing::debug!(index, command = %runner.command, args = ?args, "spawning benchmark process");

    let start = Instant::now();

    let mut child = match Command::new(&runner.command)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::inherit())
        .process_group(0)
        .kill_on_drop(true)
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            tracing::warn!(
                index,
                command = %runner.command,
                error = %e,
                "failed to spawn benchmark process"
            );
            return RunOutcome {
                index,
                pid: 0,
                status: RunStatus::SpawnFailed(e.to_string()),
                duration: start.elapsed(),
            };
        }
    };

    let pid = child.id().unwrap_or(0);
    tracing::info!(index, pid, "benchmark process started");

    let monitored = watchdog.monitor(&mut child).await;
    if let Err(e) = &monitored {
        tracing::warn!(index, pid, error = %e, "failed to wait for benchmark process");
    }
    let status = run_status(monitored);

    let duration = start.elapsed();
    tracing::info!(
        index,
        pid,
        status = ?status,
        duration_ms = duration.as_millis() as u64,
        "benchmark process finished"
    );

    RunOutcome {
        index,
        pid,
        status,
        duration,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::Shutdown;

    fn watchdog() -> Watchdog {
        let (_trigger, shutdown) = Shutdown::channel();
        Watchdog::new(Some(Duration::from_secs(30)), shutdown)
    }

    fn sh(script: &str) -> RunnerConfig {
        RunnerConfig {
            command: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            mode: "2".to_string(),
        }
    }

    #[test]
    fn test_build_args_default_template() {
        let runner = RunnerConfig::default();
        let args = build_args(&runner, PolyModulusDegree::D8192);
        assert_eq!(args, vec!["8192", "2"]);
    }

    #[test]
    fn test_build_args_placeholders_inside_args() {
        let runner = RunnerConfig {
            command: "bench".to_string(),
            args: vec![
                "--degree={degree}".to_string(),
                "fixed".to_string(),
                "{mode}{mode}".to_string(),
            ],
            mode: "7".to_string(),
        };
        let args = build_args(&runner, PolyModulusDegree::D1024);
        assert_eq!(args, vec!["--degree=1024", "fixed", "77"]);
    }

    #[test]
    fn test_wait_error_is_not_reported_as_signal() {
        let err = std::io::Error::other("wait interrupted");
        assert_eq!(
            run_status(Err(err)),
            RunStatus::WaitFailed("wait interrupted".to_string())
        );
        assert_eq!(run_status(Ok(WatchdogOutcome::TimedOut)), RunStatus::TimedOut);
    }

    #[tokio::test]
    async fn test_run_benchmark_success() {
        let outcome = run_benchmark(&sh("exit 0"), PolyModulusDegree::D1024, 4, &watchdog()).await;
        assert_eq!(outcome.status, RunStatus::Exited(0));
        assert!(outcome.status.is_success());
        assert_eq!(outcome.index, 4);
        assert!(outcome.pid > 0);
    }

    #[tokio::test]
    async fn test_run_benchmark_receives_degree_and_mode() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("args");
        let runner = RunnerConfig {
            command: "sh".to_string(),
            args: vec![
                "-c".to_string(),
                format!("echo \"$0 $1\" > {}", out.display()),
                "{degree}".to_string(),
                "{mode}".to_string(),
            ],
            mode: "2".to_string(),
        };
        let outcome = run_benchmark(&runner, PolyModulusDegree::D16384, 0, &watchdog()).await;
        assert!(outcome.status.is_success());
        assert_eq!(std::fs::read_to_string(&out).unwrap().trim(), "16384 2");
    }

    #[tokio::test]
    async fn test_run_benchmark_nonzero_exit() {
        let outcome = run_benchmark(&sh("exit 42"), PolyModulusDegree::D1024, 0, &watchdog()).await;
        assert_eq!(outcome.status, RunStatus::Exited(42));
        assert!(!outcome.status.is_success());
    }

    #[tokio::test]
    async fn test_run_benchmark_missing_binary_is_recorded() {
        let runner = RunnerConfig {
            command: "nonexistent-benchmark-xyz".to_string(),
            args: vec![],
            mode: "2".to_string(),
        };
        let outcome = run_benchmark(&runner, PolyModulusDegree::D1024, 1, &watchdog()).await;
        assert!(matches!(outcome.status, RunStatus::SpawnFailed(_)));
        assert_eq!(outcome.pid, 0);
    }

    #[tokio::test]
    async fn test_run_benchmark_duration_is_reasonable() {
        let outcome =
            run_benchmark(&sh("sleep 0.1"), PolyModulusDegree::D1024, 0, &watchdog()).await;
        assert!(outcome.duration.as_millis() >= 80);
        assert!(outcome.duration.as_secs() < 5);
    }
}
