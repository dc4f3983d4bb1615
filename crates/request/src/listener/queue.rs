use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// A FIFO shared by one producer thread and any number of blocking consumers.
///
/// Every pushed item is popped exactly once. A panic in another thread does not
/// make the queue unusable: each operation leaves it consistent before unlocking.
#[derive(Debug)]
pub(crate) struct BlockingQueue<T> {
    items: Mutex<VecDeque<T>>,
    available: Condvar,
}

impl<T> BlockingQueue<T> {
    pub(crate) fn new() -> Self {
        Self { items: Mutex::new(VecDeque::new()), available: Condvar::new() }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn push(&self, item: T) {
        self.lock().push_back(item);
        self.available.notify_one();
    }

    /// Waits until an item is available
    pub(crate) fn pop(&self) -> T {
        let mut items = self.lock();
        loop {
            if let Some(item) = items.pop_front() {
                return item;
            }
            items = self.available.wait(items).unwrap_or_else(PoisonError::into_inner);
        }
    }

    pub(crate) fn try_pop(&self) -> Option<T> {
        self.lock().pop_front()
    }

    /// Waits at most `timeout` for an item
    pub(crate) fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now().checked_add(timeout);
        let mut items = self.lock();
        loop {
            if let Some(item) = items.pop_front() {
                return Some(item);
            }

            let remaining = match deadline {
                Some(deadline) => deadline.checked_duration_since(Instant::now()).filter(|d| !d.is_zero())?,
                None => timeout,
            };
            items = self.available.wait_timeout(items, remaining).unwrap_or_else(PoisonError::into_inner).0;
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }
}
