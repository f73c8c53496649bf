//! Graceful shutdown: stop picking up files, then wait for in-flight work.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::claim::ClaimRegistry;

pub struct ShutdownCoordinator {
    sender: watch::Sender<bool>,
    registry: Arc<ClaimRegistry>,
    timeout: Duration,
    poll_interval: Duration,
}

impl ShutdownCoordinator {
    pub fn new(registry: Arc<ClaimRegistry>, timeout: Duration, poll_interval: Duration) -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender,
            registry,
            timeout,
            poll_interval,
        }
    }

    /// Receiver that flips to `true` when shutdown starts.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.sender.borrow()
    }

    /// Signal shutdown and wait until no file is in flight or the timeout
    /// passes. Returns whether all work drained.
    pub async fn shutdown(&self) -> bool {
        self.sender.send_replace(true);
        let started = Instant::now();
        info!(in_flight = self.registry.in_flight(), "Shutting down, waiting for in-flight files");

        loop {
            let in_flight = self.registry.in_flight();
            if in_flight == 0 {
                info!(elapsed_ms = started.elapsed().as_millis() as u64, "All files processed");
                return true;
            }
            if started.elapsed() >= self.timeout {
                warn!(in_flight, "Shutdown timeout reached with files still in flight");
                return false;
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use avi_common::FileReference;

    #[tokio::test]
    async fn test_waits_for_claims() {
        let registry = Arc::new(ClaimRegistry::new());
        let coordinator = ShutdownCoordinator::new(registry.clone(), Duration::from_secs(5), Duration::from_millis(5));
        let mut receiver = coordinator.subscribe();

        let claim = registry.claim(FileReference::new("taf", "a.txt")).unwrap();
        let release = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            drop(claim);
        });

        assert!(coordinator.shutdown().await);
        assert!(receiver.has_changed().unwrap());
        assert!(*receiver.borrow_and_update());
        assert!(coordinator.is_shutting_down());
        release.await.unwrap();
    }

    #[tokio::test]
    async fn test_times_out() {
        let registry = Arc::new(ClaimRegistry::new());
        let _claim = registry.claim(FileReference::new("taf", "a.txt")).unwrap();
        let coordinator = ShutdownCoordinator::new(registry, Duration::from_millis(20), Duration::from_millis(5));
        assert!(!coordinator.shutdown().await);
    }
}
