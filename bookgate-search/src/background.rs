//! Detached work that must outlive the request that started it.
//!
//! Cache writes, and provider calls whose caller went away, run here. The
//! host drains the tracker on shutdown so that work gets a chance to finish.

use std::future::Future;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;

/// A cloneable handle over a shared [`TaskTracker`].
#[derive(Debug, Clone, Default)]
pub struct Background {
    tracker: TaskTracker,
}

impl Background {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `future` on the runtime and track it.
    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.tracker.spawn(future)
    }

    /// Tasks still running.
    pub fn len(&self) -> usize {
        self.tracker.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracker.is_empty()
    }

    /// Wait for everything spawned so far, then accept new work again.
    pub async fn settle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Wait for everything spawned so far. The tracker stays closed, so
    /// [`settle`](Self::settle) is the right call outside of shutdown.
    pub async fn shutdown(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn settle_waits_for_spawned_work() {
        let background = Background::new();
        let done = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let done = Arc::clone(&done);
            background.spawn(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                done.fetch_add(1, Ordering::SeqCst);
            });
        }
        background.settle().await;
        assert_eq!(done.load(Ordering::SeqCst), 3);
        assert!(background.is_empty());
    }

    #[tokio::test]
    async fn spawn_returns_output() {
        let background = Background::new();
        let value = background.spawn(async { 42 }).await.expect("join");
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn reusable_after_settle() {
        let background = Background::new();
        background.settle().await;
        let value = background.spawn(async { "again" }).await.expect("join");
        assert_eq!(value, "again");
        background.shutdown().await;
    }
}
