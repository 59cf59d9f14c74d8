//! Small bounded queue implementing the two overflow policies spec.md §4.3
//! calls for (drop-oldest on receive, block-with-timeout-then-drop on
//! send). A plain `tokio::sync::mpsc` channel cannot express drop-oldest
//! (only the receiving task may evict an item), so this wraps a
//! `Mutex<VecDeque<T>>` with a `Notify` for wake-up, in the spirit of the
//! teacher's channel-heavy concurrency style but sized to what the overflow
//! policies actually require.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;

pub struct AudioQueue<T> {
    inner: Mutex<VecDeque<T>>,
    capacity: usize,
    not_empty: Notify,
    not_full: Notify,
    closed: AtomicBool,
}

impl<T> AudioQueue<T> {
    pub fn new(capacity: usize) -> Self {
        AudioQueue {
            inner: Mutex::new(VecDeque::with_capacity(capacity.min(64))),
            capacity,
            not_empty: Notify::new(),
            not_full: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Push, dropping the oldest queued item if at capacity. Never blocks.
    pub fn push_drop_oldest(&self, item: T) {
        let mut guard = self.inner.lock().unwrap();
        if guard.len() >= self.capacity {
            guard.pop_front();
        }
        guard.push_back(item);
        drop(guard);
        self.not_empty.notify_one();
    }

    /// Push if there is room; otherwise wait up to `timeout` for room to
    /// open up, and drop the item (returning `false`) if it never does.
    pub async fn push_block_timeout(&self, item: T, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            {
                let mut guard = self.inner.lock().unwrap();
                if guard.len() < self.capacity {
                    guard.push_back(item);
                    drop(guard);
                    self.not_empty.notify_one();
                    return true;
                }
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                return false;
            }
            let wait = self.not_full.notified();
            if tokio::time::timeout(deadline - now, wait).await.is_err() {
                return false;
            }
        }
    }

    /// Non-blocking pop, for the 20ms pacing tick.
    pub fn try_pop(&self) -> Option<T> {
        let mut guard = self.inner.lock().unwrap();
        let item = guard.pop_front();
        drop(guard);
        if item.is_some() {
            self.not_full.notify_one();
        }
        item
    }

    /// Wait for an item, or `None` once the queue is closed and drained.
    pub async fn pop(&self) -> Option<T> {
        loop {
            {
                let mut guard = self.inner.lock().unwrap();
                if let Some(item) = guard.pop_front() {
                    drop(guard);
                    self.not_full.notify_one();
                    return Some(item);
                }
                if self.closed.load(Ordering::Relaxed) {
                    return None;
                }
            }
            self.not_empty.notified().await;
        }
    }

    /// Drop every queued item immediately. Used on pause (barge-in):
    /// stale AI speech must not keep playing once the caller starts
    /// talking again.
    pub fn drain(&self) {
        let mut guard = self.inner.lock().unwrap();
        guard.clear();
        drop(guard);
        self.not_full.notify_waiters();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
        self.not_empty.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drop_oldest_evicts_the_front_item() {
        let q = AudioQueue::new(2);
        q.push_drop_oldest(1);
        q.push_drop_oldest(2);
        q.push_drop_oldest(3);
        assert_eq!(q.try_pop(), Some(2));
        assert_eq!(q.try_pop(), Some(3));
        assert_eq!(q.try_pop(), None);
    }

    #[tokio::test]
    async fn block_timeout_drops_when_queue_stays_full() {
        let q: AudioQueue<u8> = AudioQueue::new(1);
        assert!(q.push_block_timeout(1, Duration::from_millis(50)).await);
        let accepted = q.push_block_timeout(2, Duration::from_millis(20)).await;
        assert!(!accepted);
        assert_eq!(q.try_pop(), Some(1));
        assert_eq!(q.try_pop(), None);
    }

    #[test]
    fn drain_empties_the_queue() {
        let q = AudioQueue::new(4);
        q.push_drop_oldest(1);
        q.push_drop_oldest(2);
        q.drain();
        assert!(q.is_empty());
    }

    #[tokio::test]
    async fn pop_returns_none_after_close_and_drain() {
        let q: AudioQueue<u8> = AudioQueue::new(4);
        q.close();
        assert_eq!(q.pop().await, None);
    }
}
