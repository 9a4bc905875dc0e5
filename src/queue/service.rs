// src/queue/service.rs
//! In-process queue backend
//!
//! Each queue keeps a pending list and an in-flight set. The drain barrier
//! resolves only when both are empty, so it cannot resolve before every
//! item of the matching enqueue has been acknowledged.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Registry of named queues
#[derive(Default)]
pub struct QueueService {
    queues: DashMap<String, Arc<QueueState>>,
}

impl QueueService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create a queue by name
    pub fn open(&self, name: &str) -> Arc<QueueState> {
        self.queues
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(QueueState::new(name)))
            .clone()
    }

    /// Clear the pending and in-flight state of every queue.
    ///
    /// Recovery action for a stalled tick: items that will never be
    /// acknowledged are dropped and every drain barrier is released, so the
    /// next tick starts from clean queues.
    pub fn reset_all(&self) {
        for entry in self.queues.iter() {
            entry.value().reset();
        }
    }

    /// Names of all queues that have been opened
    pub fn names(&self) -> Vec<String> {
        self.queues.iter().map(|e| e.key().clone()).collect()
    }
}

struct QueueInner {
    pending: VecDeque<String>,
    in_flight: HashSet<String>,
}

/// State of one named queue
pub struct QueueState {
    name: String,
    inner: Mutex<QueueInner>,
    // Bumped on every mutation; the barrier re-checks on each change.
    changed: watch::Sender<u64>,
    added: AtomicU64,
    acked: AtomicU64,
}

impl QueueState {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            inner: Mutex::new(QueueInner {
                pending: VecDeque::new(),
                in_flight: HashSet::new(),
            }),
            changed: watch::channel(0).0,
            added: AtomicU64::new(0),
            acked: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn touch(&self) {
        self.changed.send_modify(|v| *v += 1);
    }

    /// Fan out a batch of work items. Returns the number enqueued.
    pub fn add_multi(&self, ids: Vec<String>) -> usize {
        let count = ids.len();
        if count > 0 {
            let mut inner = self.inner.lock();
            inner.pending.extend(ids);
            drop(inner);
            self.added.fetch_add(count as u64, Ordering::Relaxed);
            self.touch();
        }
        debug!(queue = %self.name, count, "enqueued work items");
        count
    }

    /// Worker side: claim the next pending item.
    pub fn fetch(&self) -> Option<String> {
        let mut inner = self.inner.lock();
        let id = inner.pending.pop_front()?;
        inner.in_flight.insert(id.clone());
        drop(inner);
        self.touch();
        Some(id)
    }

    /// Worker side: acknowledge a claimed item.
    ///
    /// Returns false if the item was not in flight (for example after a
    /// reset dropped it).
    pub fn mark_done(&self, id: &str) -> bool {
        let mut inner = self.inner.lock();
        let known = inner.in_flight.remove(id);
        drop(inner);
        if known {
            self.acked.fetch_add(1, Ordering::Relaxed);
            self.touch();
        } else {
            warn!(queue = %self.name, id, "acknowledged unknown work item");
        }
        known
    }

    fn is_drained(&self) -> bool {
        let inner = self.inner.lock();
        inner.pending.is_empty() && inner.in_flight.is_empty()
    }

    /// Fan-in barrier: resolves once every enqueued item has been
    /// acknowledged (or dropped by a reset).
    pub async fn when_all_done(&self) {
        let mut rx = self.changed.subscribe();
        loop {
            if self.is_drained() {
                return;
            }
            if rx.changed().await.is_err() {
                // Sender lives as long as the queue; treat closure as drained.
                return;
            }
        }
    }

    /// Drop all pending and in-flight items and release the barrier.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        let dropped = inner.pending.len() + inner.in_flight.len();
        inner.pending.clear();
        inner.in_flight.clear();
        drop(inner);
        if dropped > 0 {
            warn!(queue = %self.name, dropped, "queue reset dropped work items");
        }
        self.touch();
    }

    /// Counters and sizes for diagnostics
    pub fn stats(&self) -> QueueStats {
        let inner = self.inner.lock();
        QueueStats {
            pending: inner.pending.len(),
            in_flight: inner.in_flight.len(),
            added: self.added.load(Ordering::Relaxed),
            acked: self.acked.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time queue counters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueStats {
    /// Items waiting to be claimed
    pub pending: usize,
    /// Items claimed but not yet acknowledged
    pub in_flight: usize,
    /// Total items ever enqueued
    pub added: u64,
    /// Total items ever acknowledged
    pub acked: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_barrier_resolves_immediately_when_empty() {
        let service = QueueService::new();
        let queue = service.open("users");
        timeout(Duration::from_millis(100), queue.when_all_done())
            .await
            .expect("empty queue barrier should resolve at once");
    }

    #[tokio::test]
    async fn test_barrier_waits_for_every_ack() {
        let service = QueueService::new();
        let queue = service.open("rooms");
        queue.add_multi(vec!["a".into(), "b".into(), "c".into()]);

        for _ in 0..2 {
            let id = queue.fetch().unwrap();
            queue.mark_done(&id);
        }

        // Two of three acknowledged: the barrier must still be pending.
        assert!(timeout(Duration::from_millis(50), queue.when_all_done())
            .await
            .is_err());

        let last = queue.fetch().unwrap();
        queue.mark_done(&last);
        timeout(Duration::from_millis(100), queue.when_all_done())
            .await
            .expect("barrier should resolve after the last ack");

        let stats = queue.stats();
        assert_eq!(stats.added, 3);
        assert_eq!(stats.acked, 3);
        assert_eq!(stats.pending, 0);
        assert_eq!(stats.in_flight, 0);
    }

    #[tokio::test]
    async fn test_barrier_sees_unclaimed_items() {
        let service = QueueService::new();
        let queue = service.open("rooms");
        queue.add_multi(vec!["a".into()]);
        assert!(timeout(Duration::from_millis(50), queue.when_all_done())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_reset_releases_blocked_barrier() {
        let service = QueueService::new();
        let queue = service.open("rooms");
        queue.add_multi(vec!["a".into(), "b".into()]);
        queue.fetch();

        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.when_all_done().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        service.reset_all();
        timeout(Duration::from_millis(100), waiter)
            .await
            .expect("reset should release the barrier")
            .unwrap();
        assert_eq!(queue.stats().pending, 0);
        assert_eq!(queue.stats().in_flight, 0);
    }

    #[tokio::test]
    async fn test_mark_done_after_reset_is_ignored() {
        let service = QueueService::new();
        let queue = service.open("rooms");
        queue.add_multi(vec!["a".into()]);
        let id = queue.fetch().unwrap();
        queue.reset();
        assert!(!queue.mark_done(&id));
        assert_eq!(queue.stats().acked, 0);
    }
}
