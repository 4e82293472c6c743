use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};

/// Unbounded FIFO shared between tasks.
///
/// Cloning yields another handle to the same queue. A popped item is
/// removed for every handle, so each item is delivered at most once.
#[derive(Debug)]
pub struct SharedQueue<T> {
    inner: Arc<Inner<T>>,
}

#[derive(Debug)]
struct Inner<T> {
    items: Mutex<VecDeque<T>>,
    available: Notify,
}

impl<T> Clone for SharedQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Default for SharedQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SharedQueue<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                items: Mutex::new(VecDeque::new()),
                available: Notify::new(),
            }),
        }
    }

    /// Append an item. Returns the queue length after the push.
    pub async fn push(&self, item: T) -> usize {
        let len = {
            let mut items = self.inner.items.lock().await;
            items.push_back(item);
            items.len()
        };
        self.inner.available.notify_one();
        len
    }

    /// Remove the front item without waiting. `None` means the queue is empty.
    pub async fn try_pop(&self) -> Option<T> {
        self.inner.items.lock().await.pop_front()
    }

    /// Remove the front item, waiting until one is pushed.
    pub async fn pop(&self) -> T {
        loop {
            let notified = self.inner.available.notified();
            if let Some(item) = self.try_pop().await {
                return item;
            }
            notified.await;
        }
    }

    /// Like [`pop`](Self::pop) but gives up after `timeout`.
    pub async fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        tokio::time::timeout(timeout, self.pop()).await.ok()
    }

    pub async fn len(&self) -> usize {
        self.inner.items.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.items.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fifo_order() {
        let q = SharedQueue::new();
        q.push(1).await;
        q.push(2).await;
        assert_eq!(q.push(3).await, 3);

        assert_eq!(q.try_pop().await, Some(1));
        assert_eq!(q.pop().await, 2);
        assert_eq!(q.try_pop().await, Some(3));
        assert_eq!(q.try_pop().await, None);
    }

    #[tokio::test]
    async fn clones_share_items() {
        let a = SharedQueue::new();
        let b = a.clone();
        a.push("x").await;
        assert_eq!(b.len().await, 1);
        assert_eq!(b.try_pop().await, Some("x"));
        assert!(a.is_empty().await);
    }

    #[tokio::test]
    async fn pop_waits_for_push() {
        let q: SharedQueue<u32> = SharedQueue::new();
        let producer = q.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            producer.push(7).await;
        });

        assert_eq!(q.pop().await, 7);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn pop_timeout_expires_on_empty_queue() {
        let q: SharedQueue<u32> = SharedQueue::new();
        assert_eq!(q.pop_timeout(Duration::from_millis(20)).await, None);
    }

    #[tokio::test]
    async fn concurrent_consumers_never_share_items() {
        let q = SharedQueue::new();
        for i in 0..200 {
            q.push(i).await;
        }

        let mut handles = Vec::new();
        for _ in 0..4 {
            let q = q.clone();
            handles.push(tokio::spawn(async move {
                let mut taken = Vec::new();
                while let Some(i) = q.try_pop().await {
                    taken.push(i);
                }
                taken
            }));
        }

        let mut all = Vec::new();
        for h in handles {
            all.extend(h.await.unwrap());
        }
        all.sort();
        assert_eq!(all, (0..200).collect::<Vec<_>>());
    }
}
