//! A blocking fifo queue with explicit close semantics.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

/// A thread-safe fifo queue.
///
/// Poppers block on a condvar while the queue is empty; [SyncQueue::close]
/// wakes them all so consumers can wind down. All operations are
/// serialized by a single internal mutex, and none of them block while
/// holding it.
#[derive(Debug)]
pub struct SyncQueue<T> {
    inner: Mutex<Inner<T>>,
    popable: Condvar,
}

#[derive(Debug)]
struct Inner<T> {
    buffer: VecDeque<T>,
    closed: bool,
}

impl<T> Default for SyncQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SyncQueue<T> {
    /// Create a new empty queue.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                buffer: VecDeque::new(),
                closed: false,
            }),
            popable: Condvar::new(),
        }
    }

    /// Append an item to the tail and wake one blocked popper.
    /// Never blocks. Once the queue is closed the item is silently
    /// dropped.
    pub fn push(&self, item: T) {
        let mut lock = self.inner.lock().unwrap();
        if lock.closed {
            return;
        }
        lock.buffer.push_back(item);
        self.popable.notify_one();
    }

    /// Remove and return the head, blocking while the queue is empty.
    /// Returns `None` only once the queue is closed and drained.
    pub fn pop(&self) -> Option<T> {
        let mut lock = self.inner.lock().unwrap();
        while lock.buffer.is_empty() && !lock.closed {
            lock = self.popable.wait(lock).unwrap();
        }
        lock.buffer.pop_front()
    }

    /// Remove and return the head, or `None` immediately when empty.
    pub fn try_pop(&self) -> Option<T> {
        self.inner.lock().unwrap().buffer.pop_front()
    }

    /// Current depth snapshot.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().buffer.len()
    }

    /// Whether the queue is currently empty.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().buffer.is_empty()
    }

    /// Flip the closed flag and wake all blocked poppers. Idempotent.
    /// Items still buffered remain poppable; new pushes are dropped.
    pub fn close(&self) {
        let mut lock = self.inner.lock().unwrap();
        if !lock.closed {
            lock.closed = true;
            self.popable.notify_all();
        }
    }

    /// Whether [SyncQueue::close] has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.lock().unwrap().closed
    }
}

impl<T: PartialEq> SyncQueue<T> {
    /// Whether an equal item is currently queued. A linear scan under
    /// the lock.
    ///
    /// This is a best-effort dedup check only: nothing prevents an equal
    /// item from being pushed the instant after this returns false. At
    /// most one duplicate can be admitted per race window, which
    /// consumers of this queue must tolerate.
    pub fn has(&self, item: &T) -> bool {
        self.inner.lock().unwrap().buffer.contains(item)
    }
}

impl<T: Clone> SyncQueue<T> {
    /// Clone of the current queue contents, head first.
    pub fn snapshot(&self) -> Vec<T> {
        self.inner.lock().unwrap().buffer.iter().cloned().collect()
    }
}
