//! Blocking task queue shared between a worker pool and its workers.
//!
//! The queue supports the two close protocols the pool's shutdown paths rely
//! on:
//!
//! - [`finish`](WorkQueue::finish) half-closes the queue: no new items are
//!   accepted, but workers keep draining what was already queued and observe
//!   the end of the queue only once it is empty.
//! - [`abort`](WorkQueue::abort) closes the queue and discards every queued
//!   item, so workers observe the end of the queue as soon as they finish
//!   their current item.

use std::{
    collections::VecDeque,
    sync::{Arc, Condvar, Mutex},
};

pub(crate) struct WorkQueue<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for WorkQueue<T> {
    fn clone(&self) -> Self {
        WorkQueue {
            inner: self.inner.clone(),
        }
    }
}

struct Inner<T> {
    state: Mutex<QueueState<T>>,
    available: Condvar,
}

struct QueueState<T> {
    items: VecDeque<T>,
    closed: bool,
}

impl<T> WorkQueue<T> {
    pub(crate) fn new() -> WorkQueue<T> {
        WorkQueue {
            inner: Arc::new(Inner {
                state: Mutex::new(QueueState {
                    items: VecDeque::new(),
                    closed: false,
                }),
                available: Condvar::new(),
            }),
        }
    }

    /// Enqueues an item, returning it back if the queue is already closed.
    pub(crate) fn push(&self, item: T) -> Result<(), T> {
        let mut state = self.inner.state.lock().unwrap();
        if state.closed {
            return Err(item);
        }
        state.items.push_back(item);
        drop(state);
        self.inner.available.notify_one();
        Ok(())
    }

    /// Dequeues the next item, blocking while the queue is empty and open.
    ///
    /// Returns `None` once the queue is closed and no items remain.
    pub(crate) fn pop(&self) -> Option<T> {
        let mut state = self.inner.state.lock().unwrap();
        loop {
            if let Some(item) = state.items.pop_front() {
                return Some(item);
            }
            if state.closed {
                return None;
            }
            state = self.inner.available.wait(state).unwrap();
        }
    }

    /// Half-closes the queue: new pushes fail, queued items stay available.
    pub(crate) fn finish(&self) {
        let mut state = self.inner.state.lock().unwrap();
        state.closed = true;
        drop(state);
        self.inner.available.notify_all();
    }

    /// Closes the queue and discards every queued item, returning how many
    /// were dropped.
    pub(crate) fn abort(&self) -> usize {
        let drained = {
            let mut state = self.inner.state.lock().unwrap();
            state.closed = true;
            std::mem::take(&mut state.items)
        };
        self.inner.available.notify_all();
        // Items are dropped here, after the lock is released, so that a
        // panicking destructor cannot poison the queue state.
        drained.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_push_pop_fifo() {
        let q = WorkQueue::new();
        q.push(1).unwrap();
        q.push(2).unwrap();
        q.push(3).unwrap();
        assert_eq!(q.pop(), Some(1));
        assert_eq!(q.pop(), Some(2));
        assert_eq!(q.pop(), Some(3));
    }

    #[test]
    fn test_pop_blocks_until_push() {
        let q = WorkQueue::new();
        let q_clone = q.clone();

        let handle = thread::spawn(move || q_clone.pop());

        thread::sleep(Duration::from_millis(50));
        q.push("item").unwrap();

        assert_eq!(handle.join().unwrap(), Some("item"));
    }

    #[test]
    fn test_finish_drains_then_ends() {
        let q = WorkQueue::new();
        q.push(1).unwrap();
        q.push(2).unwrap();
        q.finish();

        assert_eq!(q.push(3), Err(3));
        assert_eq!(q.pop(), Some(1));
        assert_eq!(q.pop(), Some(2));
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn test_abort_discards_queued_items() {
        let q = WorkQueue::new();
        q.push(1).unwrap();
        q.push(2).unwrap();

        assert_eq!(q.abort(), 2);
        assert_eq!(q.pop(), None);
        assert_eq!(q.push(3), Err(3));
    }

    #[test]
    fn test_close_wakes_blocked_consumers() {
        let q = WorkQueue::<i32>::new();
        let handles: Vec<_> = (0..3)
            .map(|_| {
                let q = q.clone();
                thread::spawn(move || q.pop())
            })
            .collect();

        thread::sleep(Duration::from_millis(50));
        q.finish();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), None);
        }
    }
}
