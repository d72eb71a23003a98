//! Deadline and interrupt monitor for benchmark processes.
//!
//! Runs alongside one child process. If the deadline passes or the operator
//! interrupts the run, kills the child's process group so a hung benchmark
//! cannot wedge the join barrier.

use crate::signals::Shutdown;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::process::ExitStatus;
use std::time::Duration;
use tokio::process::Child;

/// How a supervised child came to an end.
#[derive(Debug)]
pub enum WatchdogOutcome {
    Exited(ExitStatus),
    TimedOut,
    Interrupted,
}

#[derive(Debug, Clone)]
pub struct Watchdog {
    deadline: Option<Duration>,
    shutdown: Shutdown,
}

impl Watchdog {
    pub fn new(deadline: Option<Duration>, shutdown: Shutdown) -> Self {
        Self { deadline, shutdown }
    }

    /// Build from `timeout_secs`, where 0 means no deadline.
    pub fn from_timeout_secs(timeout_secs: u64, shutdown: Shutdown) -> Self {
        let deadline = (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs));
        Self::new(deadline, shutdown)
    }

    /// Wait for `child` to exit, killing its process group on deadline or interrupt.
    pub async fn monitor(&self, child: &mut Child) -> std::io::Result<WatchdogOutcome> {
        let mut shutdown = self.shutdown.clone();
        let deadline = self.deadline;
        let expired = async move {
            match deadline {
                Some(d) => tokio::time::sleep(d).await,
                None => std::future::pending::<()>().await,
            }
        };

        let outcome = tokio::select! {
            status = child.wait() => return Ok(WatchdogOutcome::Exited(status?)),
            _ = expired => WatchdogOutcome::TimedOut,
            _ = shutdown.wait() => WatchdogOutcome::Interrupted,
        };

        tracing::warn!(pid = ?child.id(), outcome = ?outcome, "killing benchmark process group");
        kill_group(child);
        child.wait().await?;
        Ok(outcome)
    }
}

/// SIGKILL the child's process group, falling back to the child alone.
fn kill_group(child: &mut Child) {
    let Some(pid) = child.id() else {
        return;
    };
    if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
        tracing::debug!(pid, error = %e, "killpg failed, killing child directly");
        let _ = child.start_kill();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Stdio;
    use std::time::Instant;
    use tokio::process::Command;

    fn spawn_sh(script: &str) -> Child {
        Command::new("sh")
            .args(["-c", script])
            .stdout(Stdio::null())
            .process_group(0)
            .spawn()
            .unwrap()
    }

    #[test]
    fn test_zero_timeout_means_no_deadline() {
        let (_trigger, shutdown) = Shutdown::channel();
        assert_eq!(Watchdog::from_timeout_secs(0, shutdown.clone()).deadline, None);
        assert_eq!(
            Watchdog::from_timeout_secs(5, shutdown).deadline,
            Some(Duration::from_secs(5))
        );
    }

    #[tokio::test]
    async fn test_child_exits_normally() {
        let (_trigger, shutdown) = Shutdown::channel();
        let watchdog = Watchdog::new(Some(Duration::from_secs(10)), shutdown);
        let mut child = spawn_sh("exit 3");
        match watchdog.monitor(&mut child).await.unwrap() {
            WatchdogOutcome::Exited(status) => assert_eq!(status.code(), Some(3)),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_deadline_kills_hung_child() {
        let (_trigger, shutdown) = Shutdown::channel();
        let watchdog = Watchdog::new(Some(Duration::from_millis(100)), shutdown);
        let mut child = spawn_sh("sleep 30");
        let start = Instant::now();
        let outcome = watchdog.monitor(&mut child).await.unwrap();
        assert!(matches!(outcome, WatchdogOutcome::TimedOut));
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_interrupt_kills_child() {
        let (trigger, shutdown) = Shutdown::channel();
        let watchdog = Watchdog::new(None, shutdown);
        let mut child = spawn_sh("sleep 30");
        trigger.trigger();
        let outcome = watchdog.monitor(&mut child).await.unwrap();
        assert!(matches!(outcome, WatchdogOutcome::Interrupted));
    }
}
