// src/deque.rs
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

struct Inner<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// A capacity-bounded blocking double-ended queue.
///
/// Pushes block while the queue is full; [`BlockDeque::pop`] blocks until an
/// element arrives, the optional timeout expires, or the queue is closed.
/// Closing is terminal: it drains the queue and wakes every waiter.
pub struct BlockDeque<T> {
    inner: Mutex<Inner<T>>,
    consumer: Condvar,
    producer: Condvar,
    capacity: usize,
}

impl<T> BlockDeque<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0);
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                closed: false,
            }),
            consumer: Condvar::new(),
            producer: Condvar::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() == self.capacity
    }

    /// Add an element to the end and notify one consumer. Blocks while the
    /// queue is full. Pushing into a closed queue is a caller error; the
    /// element is dropped.
    pub fn push_back(&self, item: T) {
        let mut inner = self.wait_for_space();
        if inner.closed {
            return;
        }
        inner.items.push_back(item);
        self.consumer.notify_one();
    }

    /// Insert an element at the front and notify one consumer. Blocks while
    /// the queue is full.
    pub fn push_front(&self, item: T) {
        let mut inner = self.wait_for_space();
        if inner.closed {
            return;
        }
        inner.items.push_front(item);
        self.consumer.notify_one();
    }

    fn wait_for_space(&self) -> std::sync::MutexGuard<'_, Inner<T>> {
        let inner = self.inner.lock().unwrap();
        self.producer
            .wait_while(inner, |inner| {
                !inner.closed && inner.items.len() >= self.capacity
            })
            .unwrap()
    }

    /// Try to pop the first element.
    ///
    /// With no timeout this keeps waiting until an element arrives or the
    /// queue is closed; with a timeout it additionally returns `None` on
    /// expiry.
    pub fn pop(&self, time_out: Option<Duration>) -> Option<T> {
        // Consumers may not have started to wait when the queue is closed. If
        // the close notification is sent before they wait, the condition
        // variable would block them forever, so the predicate also checks the
        // closed flag.
        let not_empty_or_closed =
            |inner: &mut Inner<T>| inner.items.is_empty() && !inner.closed;

        let guard = self.inner.lock().unwrap();
        let mut inner = match time_out {
            Some(time_out) => {
                let (inner, _) = self
                    .consumer
                    .wait_timeout_while(guard, time_out, not_empty_or_closed)
                    .unwrap();
                inner
            }
            None => self.consumer.wait_while(guard, not_empty_or_closed).unwrap(),
        };

        if inner.closed {
            return None;
        }
        let item = inner.items.pop_front();
        if item.is_some() {
            self.producer.notify_one();
        }
        item
    }

    /// Remove all elements without closing the queue.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.items.clear();
        self.producer.notify_all();
    }

    /// Drain the queue, flip the terminal flag, and wake every waiter.
    pub fn close(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.items.clear();
        inner.closed = true;
        self.producer.notify_all();
        self.consumer.notify_all();
    }
}

impl<T: Clone> BlockDeque<T> {
    /// A copy of the first element, or `None` when empty.
    pub fn front(&self) -> Option<T> {
        self.inner.lock().unwrap().items.front().cloned()
    }

    /// A copy of the last element, or `None` when empty.
    pub fn back(&self) -> Option<T> {
        self.inner.lock().unwrap().items.back().cloned()
    }
}
