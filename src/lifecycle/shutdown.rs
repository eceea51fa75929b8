//! Shutdown coordination.

use std::sync::Arc;

use tokio::sync::watch;

/// A cloneable one-shot stop signal.
///
/// Every clone observes the same trigger. Triggering is idempotent, and
/// waiters that subscribe after the trigger return immediately.
#[derive(Debug, Clone)]
pub struct ShutdownToken {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownToken {
    /// Creates an untriggered token.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Fires the signal for every clone.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    /// `true` once [`trigger`](Self::trigger) has been called.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Completes when the token is triggered.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|triggered| *triggered).await;
    }
}

impl Default for ShutdownToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn starts_untriggered() {
        assert!(!ShutdownToken::new().is_triggered());
    }

    #[tokio::test]
    async fn trigger_wakes_waiting_clones() {
        let token = ShutdownToken::new();
        let waiter = {
            let token = token.clone();
            tokio::spawn(async move { token.cancelled().await })
        };
        tokio::task::yield_now().await;
        token.trigger();

        let Ok(joined) = tokio::time::timeout(Duration::from_secs(1), waiter).await else {
            panic!("waiter not woken");
        };
        assert!(joined.is_ok());
    }

    #[tokio::test]
    async fn late_waiter_returns_immediately() {
        let token = ShutdownToken::new();
        token.trigger();
        token.trigger();
        assert!(token.clone().is_triggered());
        let result = tokio::time::timeout(Duration::from_millis(100), token.cancelled()).await;
        assert!(result.is_ok());
    }
}
