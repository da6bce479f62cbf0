use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::Notify;

use crate::error::{Error, Result};
use crate::pipeline::cancel::CancelToken;

/// Fixed-capacity FIFO shared by any number of producers and consumers.
///
/// - [`push`](Self::push) waits while the queue is full (backpressure).
/// - [`pop`](Self::pop) waits while the queue is empty and not completed.
/// - [`complete`](Self::complete) is idempotent; afterwards consumers drain
///   what is left and then observe `None`.
///
/// Every wait also resolves when the run's [`CancelToken`] fires.
pub struct BoundedQueue<T> {
    shared: Arc<Shared<T>>,
}

struct Shared<T> {
    items: Mutex<VecDeque<T>>,
    capacity: usize,
    completed: AtomicBool,
    pushed: AtomicU64,
    not_empty: Notify,
    not_full: Notify,
}

impl<T> BoundedQueue<T> {
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            shared: Arc::new(Shared {
                items: Mutex::new(VecDeque::with_capacity(capacity.min(4096))),
                capacity,
                completed: AtomicBool::new(false),
                pushed: AtomicU64::new(0),
                not_empty: Notify::new(),
                not_full: Notify::new(),
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    pub fn len(&self) -> usize {
        self.shared.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True once [`complete`](Self::complete) has been called, even if items remain.
    pub fn is_completed(&self) -> bool {
        self.shared.completed.load(Ordering::SeqCst)
    }

    /// Items accepted over the queue's lifetime.
    pub fn pushed_count(&self) -> u64 {
        self.shared.pushed.load(Ordering::Relaxed)
    }

    /// Completed and fully drained.
    pub fn is_finished(&self) -> bool {
        self.is_completed() && self.is_empty()
    }

    /// Append `item`, waiting for a free slot if the queue is full.
    ///
    /// Fails with [`Error::QueueCompleted`] after completion and with
    /// [`Error::Cancelled`] once `cancel` fires; the item is dropped in both cases.
    pub async fn push(&self, item: T, cancel: &CancelToken) -> Result<()> {
        let mut item = Some(item);
        loop {
            let not_full = self.shared.not_full.notified();
            tokio::pin!(not_full);
            not_full.as_mut().enable();

            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            {
                let mut items = self.shared.lock();
                if self.is_completed() {
                    return Err(Error::QueueCompleted);
                }
                if items.len() < self.shared.capacity {
                    if let Some(item) = item.take() {
                        items.push_back(item);
                        self.shared.pushed.fetch_add(1, Ordering::Relaxed);
                    }
                    drop(items);
                    self.shared.not_empty.notify_one();
                    return Ok(());
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = &mut not_full => {}
            }
        }
    }

    /// Take the oldest item, waiting while the queue is empty.
    ///
    /// Returns `Ok(None)` once the queue is completed and drained.
    pub async fn pop(&self, cancel: &CancelToken) -> Result<Option<T>> {
        loop {
            let not_empty = self.shared.not_empty.notified();
            tokio::pin!(not_empty);
            not_empty.as_mut().enable();

            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            if let Some(item) = self.try_pop() {
                return Ok(Some(item));
            }
            if self.is_completed() {
                // a push may have landed between the two checks
                return Ok(self.try_pop());
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = &mut not_empty => {}
            }
        }
    }

    /// Non-blocking pop.
    pub fn try_pop(&self) -> Option<T> {
        let item = self.shared.lock().pop_front();
        if item.is_some() {
            self.shared.not_full.notify_one();
        }
        item
    }

    /// Signal that no more items will be pushed. Idempotent.
    pub fn complete(&self) {
        // taken under the lock so a concurrent push either lands first or fails
        let _items = self.shared.lock();
        if !self.shared.completed.swap(true, Ordering::SeqCst) {
            self.shared.not_empty.notify_waiters();
            self.shared.not_full.notify_waiters();
        }
    }

    /// Guard that completes the queue when dropped, including on panic
    /// or early return of the producing stage.
    pub fn complete_on_drop(&self) -> CompleteOnDrop<T> {
        CompleteOnDrop {
            queue: self.clone(),
        }
    }
}

impl<T> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        // a panic while holding the lock cannot leave the deque half-updated
        self.items.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<T> Clone for BoundedQueue<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T> std::fmt::Debug for BoundedQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedQueue")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .field("completed", &self.is_completed())
            .finish()
    }
}

pub struct CompleteOnDrop<T> {
    queue: BoundedQueue<T>,
}

impl<T> Drop for CompleteOnDrop<T> {
    fn drop(&mut self) {
        self.queue.complete();
    }
}
