//! Bounded ingest buffer between the producer and the processing loop.
//!
//! Overload policy is drop-oldest: the producer never waits, and the buffer
//! always holds the most recent `capacity` items in arrival order.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::sync::Notify;

/// Result of a successful [`BoundedIngestQueue::enqueue`].
#[derive(Debug)]
pub enum Enqueued<T> {
    /// Appended without eviction.
    Accepted,
    /// Appended after evicting the oldest buffered item, which is returned.
    Evicted(T),
}

struct QueueState<T> {
    items: VecDeque<T>,
    closed: bool,
    evicted: u64,
}

pub struct BoundedIngestQueue<T> {
    capacity: usize,
    state: Mutex<QueueState<T>>,
    notify: Notify,
}

impl<T> BoundedIngestQueue<T> {
    /// `capacity` is clamped to at least 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity.min(4_096)),
                closed: false,
                evicted: 0,
            }),
            notify: Notify::new(),
        }
    }

    /// Appends `item` without blocking, evicting the oldest item when full.
    ///
    /// Returns the item back as `Err` once the queue is closed.
    pub fn enqueue(&self, item: T) -> Result<Enqueued<T>, T> {
        let outcome = {
            let mut st = self.state.lock();
            if st.closed {
                return Err(item);
            }

            let evicted = if st.items.len() >= self.capacity {
                st.evicted += 1;
                st.items.pop_front()
            } else {
                None
            };

            st.items.push_back(item);

            match evicted {
                Some(old) => Enqueued::Evicted(old),
                None => Enqueued::Accepted,
            }
        };

        // Stores a permit if the consumer is not currently parked.
        self.notify.notify_one();
        Ok(outcome)
    }

    /// Waits for the next item in FIFO order.
    ///
    /// Returns `None` once the queue is closed and drained. Cancel-safe: an
    /// item is only removed when this future completes.
    pub async fn dequeue(&self) -> Option<T> {
        loop {
            let notified = self.notify.notified();

            {
                let mut st = self.state.lock();
                if let Some(item) = st.items.pop_front() {
                    return Some(item);
                }
                if st.closed {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Rejects further enqueues and wakes any waiting consumer.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.notify.notify_waiters();
        self.notify.notify_one();
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total items evicted by the drop-oldest policy.
    pub fn evicted(&self) -> u64 {
        self.state.lock().evicted
    }
}

impl<T: Clone> BoundedIngestQueue<T> {
    /// Copy of the buffered items, oldest first.
    pub fn snapshot(&self) -> Vec<T> {
        self.state.lock().items.iter().cloned().collect()
    }
}
