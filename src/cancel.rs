use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

/// Cooperative stop signal.
///
/// Cheap to clone; every clone observes the same flag. Long running loops
/// check [`StopFlag::is_stopped`] between steps or race their work against
/// [`StopFlag::wait`].
#[derive(Debug, Clone, Default)]
pub struct StopFlag {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    stopped: AtomicBool,
    notify: Notify,
}

impl StopFlag {
    pub fn new() -> StopFlag {
        StopFlag::default()
    }

    /// Raise the flag and wake every waiter. Idempotent.
    pub fn stop(&self) {
        if !self.inner.stopped.swap(true, Ordering::SeqCst) {
            self.inner.notify.notify_waiters();
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    /// Resolve once the flag is raised.
    pub async fn wait(&self) {
        loop {
            // Register before checking so a concurrent stop is not missed.
            let notified = self.inner.notify.notified();
            if self.is_stopped() {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn wait_returns_after_stop() {
        let flag = StopFlag::new();
        let waiter = {
            let flag = flag.clone();
            tokio::spawn(async move { flag.wait().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!flag.is_stopped());
        flag.stop();
        flag.stop();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(flag.is_stopped());
    }

    #[tokio::test]
    async fn wait_on_stopped_flag_is_immediate() {
        let flag = StopFlag::new();
        flag.stop();
        flag.wait().await;
    }
}
