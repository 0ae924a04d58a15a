// Worker pool lifecycle

use std::future::Future;

use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Owns the task handles of one stage's workers.
///
/// Stopping is cooperative: workers watch their token between items and
/// finish whatever they are holding first. The pool never touches host records.
pub struct WorkerPool {
    name: String,
    token: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(name: impl Into<String>) -> Self {
        WorkerPool {
            name: name.into(),
            token: CancellationToken::new(),
            handles: Vec::new(),
        }
    }

    /// Launch `workers` tasks. Each gets its worker id and a stop token.
    pub fn start<F, Fut>(&mut self, workers: usize, factory: F)
    where
        F: Fn(usize, CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        for id in 0..workers {
            let worker = factory(id, self.token.child_token());
            self.handles.push(tokio::spawn(worker));
        }
        debug!(pool = %self.name, workers, "worker pool started");
    }

    /// Whether any worker is still active
    pub fn is_running(&self) -> bool {
        self.handles.iter().any(|handle| !handle.is_finished())
    }

    /// Ask every worker to exit at its next poll point
    pub fn request_stop(&self) {
        debug!(pool = %self.name, "stop requested");
        self.token.cancel();
    }

    /// Wait for every worker to exit
    pub async fn join(&mut self) {
        let results = join_all(self.handles.drain(..)).await;
        for result in results {
            if let Err(e) = result {
                warn!(pool = %self.name, error = %e, "worker ended abnormally");
            }
        }
    }

    /// Stop the pool and wait for it to wind down
    pub async fn shutdown(&mut self) {
        self.request_stop();
        self.join().await;
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_pool_lifecycle() {
        let started = Arc::new(AtomicUsize::new(0));
        let mut pool = WorkerPool::new("test");
        assert!(!pool.is_running());

        let counter = started.clone();
        pool.start(3, move |_, token| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                while !token.is_cancelled() {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
            }
        });

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(pool.is_running());
        assert_eq!(started.load(Ordering::SeqCst), 3);

        pool.shutdown().await;
        assert!(!pool.is_running());
    }

    #[tokio::test]
    async fn test_stop_waits_for_current_item() {
        let finished = Arc::new(AtomicUsize::new(0));
        let mut pool = WorkerPool::new("test");

        let counter = finished.clone();
        pool.start(1, move |_, token| {
            let counter = counter.clone();
            async move {
                while !token.is_cancelled() {
                    // an item in flight is not interrupted by the stop request
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            }
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        pool.shutdown().await;
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }
}
