// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Bounded blocking FIFO with an active flag.
//!
//! `push` blocks while the queue is full, `pop` blocks while it is empty.
//! Deactivating the queue clears it and wakes every blocked party with a
//! failure, which is how filters unblock their worker tasks before pausing
//! or stopping them. FIFO order is guaranteed for a single producer and a
//! single consumer; concurrent producers have no mutual ordering.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::debug;

struct QueueState<T> {
    items: VecDeque<T>,
    active: bool,
}

/// A bounded FIFO whose ends block, with fail-fast deactivation.
pub struct BlockingQueue<T> {
    name: String,
    capacity: usize,
    state: Mutex<QueueState<T>>,
    not_empty: Condvar,
    not_full: Condvar,
}

impl<T> BlockingQueue<T> {
    /// Create an active queue holding at most `capacity` items.
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be positive");
        BlockingQueue {
            name: name.into(),
            capacity,
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity),
                active: true,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        }
    }

    /// Maximum number of queued items.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current number of queued items.
    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    /// Whether the queue holds no items.
    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    /// Enqueue, blocking while full. Returns `false` if the queue is (or
    /// becomes) inactive, in which case the item is dropped.
    pub fn push(&self, item: T) -> bool {
        let mut state = self.state.lock();
        while state.active && state.items.len() >= self.capacity {
            self.not_full.wait(&mut state);
        }
        if !state.active {
            debug!("queue {} inactive, push rejected", self.name);
            return false;
        }
        state.items.push_back(item);
        self.not_empty.notify_one();
        true
    }

    /// Dequeue, blocking while empty. Returns `None` if the queue is (or
    /// becomes) inactive.
    pub fn pop(&self) -> Option<T> {
        let mut state = self.state.lock();
        while state.active && state.items.is_empty() {
            self.not_empty.wait(&mut state);
        }
        if !state.active {
            return None;
        }
        let item = state.items.pop_front();
        self.not_full.notify_one();
        item
    }

    /// Dequeue with a timeout. `None` on timeout or deactivation.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        let mut state = self.state.lock();
        let deadline = std::time::Instant::now() + timeout;
        while state.active && state.items.is_empty() {
            if self
                .not_empty
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                break;
            }
        }
        if !state.active {
            return None;
        }
        let item = state.items.pop_front();
        if item.is_some() {
            self.not_full.notify_one();
        }
        item
    }

    /// Activate or deactivate the queue.
    ///
    /// Deactivation clears all queued items and wakes every blocked pusher
    /// and popper with a failure result.
    pub fn set_active(&self, active: bool) {
        let mut state = self.state.lock();
        state.active = active;
        if !active {
            state.items.clear();
            self.not_empty.notify_all();
            self.not_full.notify_all();
        }
    }

    /// Remove all queued items without deactivating.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.items.clear();
        self.not_full.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_fifo_order_single_producer_consumer() {
        let queue = Arc::new(BlockingQueue::new("fifo", 4));
        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for i in 0..100 {
                    assert!(queue.push(i));
                }
            })
        };
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for expected in 0..100 {
                    assert_eq!(queue.pop(), Some(expected));
                }
            })
        };
        producer.join().unwrap();
        consumer.join().unwrap();
    }

    #[test]
    fn test_push_blocks_until_pop() {
        let queue = Arc::new(BlockingQueue::new("full", 1));
        assert!(queue.push(1));
        let pusher = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.push(2))
        };
        thread::sleep(Duration::from_millis(20));
        assert_eq!(queue.pop(), Some(1));
        assert!(pusher.join().unwrap());
        assert_eq!(queue.pop(), Some(2));
    }

    #[test]
    fn test_deactivate_wakes_blocked_popper() {
        let queue = Arc::new(BlockingQueue::<u32>::new("inactive", 2));
        let popper = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.pop())
        };
        thread::sleep(Duration::from_millis(20));
        queue.set_active(false);
        assert_eq!(popper.join().unwrap(), None);
        // inactive queue rejects further traffic
        assert!(!queue.push(7));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn test_deactivate_clears_items() {
        let queue = BlockingQueue::new("clearing", 4);
        queue.push(1);
        queue.push(2);
        queue.set_active(false);
        queue.set_active(true);
        assert!(queue.is_empty());
        assert_eq!(queue.pop_timeout(Duration::from_millis(10)), None);
    }
}
