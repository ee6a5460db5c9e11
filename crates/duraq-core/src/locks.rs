//! Per-queue mutation locks
//!
//! Every read-mutate-rewrite cycle against a queue file holds that
//! queue's lock, so concurrent calls within the process cannot lose
//! updates. The lock is async because it is held across file I/O.
//! Cross-process exclusion is out of contract: one process owns a given
//! queue directory.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

pub(crate) struct QueueLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl QueueLocks {
    pub(crate) fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    /// Take the queue's mutation lock, creating it on first use.
    pub(crate) async fn acquire(&self, queue: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(queue.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_same_queue_serializes() {
        let locks = Arc::new(QueueLocks::new());

        let guard = locks.acquire("q").await;
        let locks2 = Arc::clone(&locks);
        let contender = tokio::spawn(async move {
            let _g = locks2.acquire("q").await;
        });

        // The contender cannot finish while the first guard is held.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn test_distinct_queues_do_not_contend() {
        let locks = QueueLocks::new();
        let _a = locks.acquire("a").await;
        let _b = locks.acquire("b").await;
    }
}
