//! Injected readiness flag. Callers await readiness instead of polling a global.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

#[derive(Clone)]
pub struct Readiness {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for Readiness {
    fn default() -> Self { Self::new() }
}

impl Readiness {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Already-ready handle, for collaborators with nothing to wait on.
    pub fn ready() -> Self {
        let r = Self::new();
        r.mark_ready();
        r
    }

    pub fn mark_ready(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_ready(&self) -> bool {
        *self.tx.borrow()
    }

    pub async fn wait_ready(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|ready| *ready).await;
    }

    /// Returns false if not ready within `limit`.
    pub async fn wait_ready_timeout(&self, limit: Duration) -> bool {
        if self.is_ready() {
            return true;
        }
        tokio::time::timeout(limit, self.wait_ready()).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn waiters_wake_on_mark_ready() {
        let r = Readiness::new();
        assert!(!r.is_ready());
        let waiter = {
            let r = r.clone();
            tokio::spawn(async move { r.wait_ready().await })
        };
        r.mark_ready();
        waiter.await.unwrap();
        assert!(r.is_ready());
    }

    #[tokio::test]
    async fn timeout_when_never_ready() {
        let r = Readiness::new();
        assert!(!r.wait_ready_timeout(Duration::from_millis(20)).await);
        assert!(Readiness::ready().wait_ready_timeout(Duration::from_millis(1)).await);
    }
}
