// Hand-off queue between pipeline stages

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::inventory::HostRecord;

/// Unordered multi-producer/multi-consumer queue of host records.
///
/// Records move in and out by value, so whoever popped a record owns it
/// until they push it somewhere else. Cloning the queue clones the handle.
#[derive(Clone, Default)]
pub struct HostQueue {
    inner: Arc<QueueInner>,
}

#[derive(Default)]
struct QueueInner {
    items: Mutex<VecDeque<HostRecord>>,
    available: Notify,
}

impl HostQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a record and wake one waiting consumer
    pub fn push(&self, host: HostRecord) {
        self.inner.items.lock().push_back(host);
        self.inner.available.notify_one();
    }

    /// Dequeue a record, waiting at most `wait` for one to show up.
    ///
    /// Returns `None` when the wait elapses with the queue still empty.
    pub async fn pop(&self, wait: Duration) -> Option<HostRecord> {
        let deadline = tokio::time::Instant::now() + wait;

        loop {
            if let Some(host) = self.inner.items.lock().pop_front() {
                return Some(host);
            }

            // notify_one stores a permit when nobody is waiting, so a push
            // between the check above and this await is not lost
            if tokio::time::timeout_at(deadline, self.inner.available.notified())
                .await
                .is_err()
            {
                return self.inner.items.lock().pop_front();
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.items.lock().is_empty()
    }
}
