//! Ctrl-C handling for benchmark cycles.
//!
//! One `Shutdown` is shared by every watchdog. The first SIGINT flips it and
//! each watchdog kills its child's process group; the pipeline then skips
//! aggregation so the partial logs stay on disk.

use tokio::sync::watch;

#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

/// Sending half, kept by whoever decides the run is over.
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl Shutdown {
    pub fn channel() -> (ShutdownTrigger, Shutdown) {
        let (tx, rx) = watch::channel(false);
        (ShutdownTrigger { tx }, Shutdown { rx })
    }

    /// Install a SIGINT listener that triggers the returned handle.
    ///
    /// First SIGINT: kill running benchmarks and stop after the join.
    /// Second SIGINT: exit immediately with status 130.
    pub fn install() -> Shutdown {
        let (trigger, shutdown) = Shutdown::channel();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "failed to listen for interrupt");
                return;
            }
            tracing::warn!(
                "interrupt received, stopping benchmark processes (press Ctrl-C again to exit now)"
            );
            trigger.trigger();

            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("second interrupt, exiting");
                std::process::exit(130);
            }
        });
        shutdown
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown has been requested. Never resolves if every
    /// trigger was dropped without firing.
    pub async fn wait(&mut self) {
        let fired = self.rx.wait_for(|triggered| *triggered).await.is_ok();
        if !fired {
            std::future::pending::<()>().await;
        }
    }
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_wait_resolves_after_trigger() {
        let (trigger, mut shutdown) = Shutdown::channel();
        assert!(!shutdown.is_triggered());
        trigger.trigger();
        tokio::time::timeout(Duration::from_secs(1), shutdown.wait())
            .await
            .unwrap();
        assert!(shutdown.is_triggered());
    }

    #[tokio::test]
    async fn test_dropped_trigger_never_resolves() {
        let (trigger, mut shutdown) = Shutdown::channel();
        drop(trigger);
        let res = tokio::time::timeout(Duration::from_millis(50), shutdown.wait()).await;
        assert!(res.is_err());
    }

    #[tokio::test]
    async fn test_clones_observe_trigger() {
        let (trigger, shutdown) = Shutdown::channel();
        let other = shutdown.clone();
        trigger.trigger();
        assert!(other.is_triggered());
    }
}
