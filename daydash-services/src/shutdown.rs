//! Cooperative shutdown signal shared by the poller and dispatcher

use std::future::Future;

use tokio::sync::watch;

/// Create a linked trigger/signal pair
pub fn shutdown_channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, Shutdown { rx })
}

/// Fires the shutdown signal. Dropping the trigger also counts as a
/// shutdown.
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }
}

/// Cloneable observer of the shutdown signal
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    /// Resolves once shutdown is requested
    pub async fn triggered(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Drive `fut` to completion unless shutdown is requested first, in
    /// which case `None` is returned
    pub async fn run_until<F: Future>(&self, fut: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            _ = self.triggered() => None,
            out = fut => Some(out),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_run_until_completes_without_shutdown() {
        let (_trigger, shutdown) = shutdown_channel();
        assert_eq!(shutdown.run_until(async { 7 }).await, Some(7));
    }

    #[tokio::test]
    async fn test_trigger_cancels_pending_future() {
        let (trigger, shutdown) = shutdown_channel();
        let waiter = shutdown.clone();

        let handle = tokio::spawn(async move {
            waiter
                .run_until(tokio::time::sleep(Duration::from_secs(60)))
                .await
        });

        trigger.trigger();
        assert_eq!(handle.await.unwrap(), None);
        assert_eq!(shutdown.run_until(async { 7 }).await, None);
    }

    #[tokio::test]
    async fn test_dropped_trigger_counts_as_shutdown() {
        let (trigger, shutdown) = shutdown_channel();
        drop(trigger);
        shutdown.triggered().await;
    }
}
