// ── Bounded request queue ──
//
// Fixed-capacity FIFO between any number of producers and the single
// consumer. Admission is non-blocking and fails closed; removal suspends
// the consumer until an item arrives or the queue is closed.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

use crate::error::SubmitError;

/// Bounded multi-producer, single-consumer FIFO.
///
/// `size() <= capacity` holds at all times; an enqueue beyond capacity is
/// rejected instead of blocking the producer. The short critical section
/// is a plain mutex -- producers call [`try_enqueue`](Self::try_enqueue)
/// from sync or async code alike, and the consumer parks on a `Notify`
/// between polls, re-checking after every wakeup.
pub(crate) struct RequestQueue<T> {
    inner: Mutex<Inner<T>>,
    available: Notify,
    capacity: usize,
}

struct Inner<T> {
    items: VecDeque<T>,
    closed: bool,
}

impl<T> RequestQueue<T> {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            available: Notify::new(),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        // A poisoned lock only means some thread panicked mid-section;
        // the VecDeque itself is still coherent.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Non-blocking admission. Fails with [`SubmitError::QueueFull`] at
    /// capacity and [`SubmitError::Closed`] after [`close`](Self::close).
    pub(crate) fn try_enqueue(&self, item: T) -> Result<(), SubmitError> {
        {
            let mut inner = self.lock();
            if inner.closed {
                return Err(SubmitError::Closed);
            }
            if inner.items.len() >= self.capacity {
                return Err(SubmitError::QueueFull);
            }
            inner.items.push_back(item);
        }
        self.available.notify_one();
        Ok(())
    }

    /// Remove the oldest pending item, suspending while the queue is
    /// empty. Returns `None` once the queue is closed and drained.
    pub(crate) async fn dequeue(&self) -> Option<T> {
        loop {
            let notified = self.available.notified();
            {
                let mut inner = self.lock();
                if let Some(item) = inner.items.pop_front() {
                    return Some(item);
                }
                if inner.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Drain every pending item without executing it. Never touches an
    /// item already removed by the consumer.
    pub(crate) fn clear(&self) -> Vec<T> {
        self.lock().items.drain(..).collect()
    }

    /// Point-in-time occupancy, for observability only.
    pub(crate) fn len(&self) -> usize {
        self.lock().items.len()
    }

    /// Stop admitting new items. The consumer drains what remains and
    /// then observes the closed state.
    pub(crate) fn close(&self) {
        self.lock().closed = true;
        // notify_one stores a permit even when the consumer has not
        // registered yet, so the close cannot be lost between its
        // empty-check and the await.
        self.available.notify_one();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn dequeue_returns_items_in_fifo_order() {
        let queue = RequestQueue::new(3);
        queue.try_enqueue(1).unwrap();
        queue.try_enqueue(2).unwrap();
        queue.try_enqueue(3).unwrap();

        assert_eq!(queue.dequeue().await, Some(1));
        assert_eq!(queue.dequeue().await, Some(2));
        assert_eq!(queue.dequeue().await, Some(3));
    }

    #[tokio::test]
    async fn enqueue_beyond_capacity_is_rejected_without_reordering() {
        let queue = RequestQueue::new(2);
        queue.try_enqueue("a").unwrap();
        queue.try_enqueue("b").unwrap();

        assert_eq!(queue.try_enqueue("c"), Err(SubmitError::QueueFull));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.dequeue().await, Some("a"));
        assert_eq!(queue.dequeue().await, Some("b"));
    }

    #[tokio::test]
    async fn dequeue_wakes_on_late_enqueue() {
        let queue = std::sync::Arc::new(RequestQueue::new(1));

        let consumer = {
            let queue = std::sync::Arc::clone(&queue);
            tokio::spawn(async move { queue.dequeue().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        queue.try_enqueue(7).unwrap();
        assert_eq!(consumer.await.unwrap(), Some(7));
    }

    #[tokio::test]
    async fn clear_drains_all_pending_items() {
        let queue = RequestQueue::new(3);
        queue.try_enqueue(1).unwrap();
        queue.try_enqueue(2).unwrap();

        assert_eq!(queue.clear(), vec![1, 2]);
        assert_eq!(queue.len(), 0);

        // A fresh backlog starts after the purge.
        queue.try_enqueue(3).unwrap();
        assert_eq!(queue.dequeue().await, Some(3));
    }

    #[tokio::test]
    async fn closed_queue_rejects_producers_and_drains_consumer() {
        let queue = RequestQueue::new(2);
        queue.try_enqueue(1).unwrap();
        queue.close();

        assert_eq!(queue.try_enqueue(2), Err(SubmitError::Closed));
        assert_eq!(queue.dequeue().await, Some(1));
        assert_eq!(queue.dequeue().await, None);
    }

    #[tokio::test]
    async fn close_wakes_a_parked_consumer() {
        let queue = std::sync::Arc::new(RequestQueue::<u8>::new(1));

        let consumer = {
            let queue = std::sync::Arc::clone(&queue);
            tokio::spawn(async move { queue.dequeue().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        queue.close();
        assert_eq!(consumer.await.unwrap(), None);
    }
}
