//! Bounded queues used by the pipeline, and the "bounded-drop enqueue"
//! policy shared by all of them.
//!
//! A full queue never blocks its producer: the *oldest* element is evicted
//! (and, for work items, marked `Dropped`) to make room, so the newest
//! packet always wins. [`BoundedQueue`] is the plain ring buffer;
//! [`enqueue_drop_oldest`] layers the eviction policy on top for queues of
//! [`crate::work::InboundWork`] handles, and [`enqueue_drop_oldest_silent`]
//! does the same for queues (like the TUN inbound queue) whose evicted
//! payload needs no special handling.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::work::InboundWork;

/// A fixed-capacity FIFO ring buffer with a non-blocking, fallible push and
/// an async pop.
pub struct BoundedQueue<T> {
    capacity: usize,
    inner: Mutex<VecDeque<T>>,
    notify: Notify,
}

impl<T> BoundedQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            notify: Notify::new(),
        }
    }

    /// Inserts `item` if there is room, otherwise hands it back unchanged.
    pub fn try_push(&self, item: T) -> Result<(), T> {
        let mut inner = self.inner.lock();
        if inner.len() >= self.capacity {
            return Err(item);
        }

        inner.push_back(item);
        drop(inner);
        self.notify.notify_one();
        Ok(())
    }

    /// Pops the oldest item without waiting.
    pub fn try_pop_front(&self) -> Option<T> {
        self.inner.lock().pop_front()
    }

    /// Pops the oldest item, waiting for one to arrive if the queue is
    /// currently empty.
    pub async fn pop(&self) -> T {
        loop {
            if let Some(item) = self.try_pop_front() {
                return item;
            }

            self.notify.notified().await;
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Implemented by anything that carries an [`InboundWork`] handle, so
/// [`enqueue_drop_oldest`] can mark an evicted entry `Dropped` regardless of
/// what else the queue's payload type bundles alongside the handle (e.g. the
/// pre-locked guard or a `Locker`).
pub trait AsWork {
    fn mark_dropped(&self);
}

impl AsWork for Arc<InboundWork> {
    fn mark_dropped(&self) {
        InboundWork::mark_dropped(self)
    }
}

/// Bounded-drop enqueue for queues carrying work items: retry insertion,
/// evicting and marking dropped the oldest element each time the queue is
/// full, until the new item fits. Returns the number of items evicted, so
/// callers can surface overload in their own metrics.
pub fn enqueue_drop_oldest<T: AsWork>(queue: &BoundedQueue<T>, mut item: T) -> usize {
    let mut evicted = 0;
    loop {
        match queue.try_push(item) {
            Ok(()) => return evicted,
            Err(returned) => {
                item = returned;
                if let Some(oldest) = queue.try_pop_front() {
                    oldest.mark_dropped();
                    evicted += 1;
                }
            }
        }
    }
}

/// Same eviction policy, for queues whose payload carries no `Dropped`
/// state of its own (e.g. the TUN inbound queue).
pub fn enqueue_drop_oldest_silent<T>(queue: &BoundedQueue<T>, mut item: T) -> usize {
    let mut evicted = 0;
    loop {
        match queue.try_push(item) {
            Ok(()) => return evicted,
            Err(returned) => {
                item = returned;
                if queue.try_pop_front().is_some() {
                    evicted += 1;
                }
            }
        }
    }
}
