//! A thread-safe single-value channel.
//!
//! This module provides the channel used to deliver the outcome of a unit of
//! work from the worker thread that executed it to the thread waiting on its
//! handle. The channel transmits exactly one value; if the sender is dropped
//! without sending, the receiver resolves with `None` instead of blocking
//! forever.
//!
//! ## Channel Lifecycle
//!
//! 1. Pending: no value has been sent yet
//! 2. Ready: a value was sent and is waiting to be consumed
//! 3. Consumed: the value was taken, or the sender was dropped without one
//!
//! ## Thread Safety
//!
//! [`OneshotSender<T>`] and [`OneshotReceiver<T>`] are `Send` and `Sync` when
//! `T: Send`. Synchronization is a `Mutex`-protected state cell paired with a
//! `Condvar`.

use std::{
    sync::{Arc, Condvar, Mutex},
    time::Duration,
};

/// Creates a new oneshot channel, returning the sender and receiver halves.
pub fn channel<T>() -> (OneshotSender<T>, OneshotReceiver<T>) {
    let cell = Arc::new(OneshotCell::new());
    (OneshotSender(cell.clone()), OneshotReceiver(cell))
}

/// The sending half of a oneshot channel.
///
/// Dropping the sender without sending closes the channel: the receiver wakes
/// up and observes `None`.
pub struct OneshotSender<T>(Arc<OneshotCell<T>>);

impl<T> OneshotSender<T> {
    /// Attempts to send a value through the channel.
    ///
    /// Returns `Err(value)` if a value was already sent or the channel was
    /// closed.
    pub fn send(&self, value: T) -> Result<(), T> {
        self.0.set(value)
    }

    /// Checks whether the channel is still waiting for a value.
    pub fn is_pending(&self) -> bool {
        self.0.is_pending()
    }
}

impl<T> Drop for OneshotSender<T> {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

/// The receiving half of a oneshot channel.
pub struct OneshotReceiver<T>(Arc<OneshotCell<T>>);

impl<T> OneshotReceiver<T> {
    /// Blocks until a value is received or the channel is closed.
    ///
    /// Returns `None` if the sender was dropped without sending, or if the
    /// value was already consumed.
    pub fn recv(&self) -> Option<T> {
        self.0.wait()
    }

    /// Attempts to receive a value, waiting at most `timeout`.
    ///
    /// Returns `Ok(Some(value))` when a value arrived in time, `Ok(None)`
    /// when the channel was closed without one, and an error when the wait
    /// expired while the channel was still pending.
    pub fn recv_timeout(
        &self,
        timeout: Duration,
    ) -> Result<Option<T>, std::sync::mpsc::RecvTimeoutError> {
        self.0
            .wait_for(timeout)
            .map_err(|_| std::sync::mpsc::RecvTimeoutError::Timeout)
    }

    /// Checks whether the channel is still waiting for a value.
    pub fn is_pending(&self) -> bool {
        self.0.is_pending()
    }
}

/// Shared state cell behind the sender/receiver pair.
struct OneshotCell<T> {
    value: Mutex<State<T>>,
    condvar: Condvar,
}

impl<T> OneshotCell<T> {
    fn new() -> OneshotCell<T> {
        OneshotCell {
            value: Mutex::new(State::Pending),
            condvar: Condvar::new(),
        }
    }

    fn set(&self, value: T) -> Result<(), T> {
        let res = self.value.lock().unwrap().set(value);
        self.condvar.notify_all();
        res
    }

    fn is_pending(&self) -> bool {
        self.value.lock().unwrap().is_pending()
    }

    fn cancel(&self) {
        self.value.lock().unwrap().cancel();
        self.condvar.notify_all();
    }

    fn wait(&self) -> Option<T> {
        let guard = self.value.lock().unwrap();
        self.condvar
            .wait_while(guard, |state| state.is_pending())
            .unwrap()
            .take()
    }

    fn wait_for(&self, timeout: Duration) -> Result<Option<T>, ()> {
        let guard = self.value.lock().unwrap();
        let (mut guard, res) = self
            .condvar
            .wait_timeout_while(guard, timeout, |state| state.is_pending())
            .unwrap();
        if res.timed_out() && guard.is_pending() {
            Err(())
        } else {
            Ok(guard.take())
        }
    }
}

/// State transitions: `Pending -> Ready(T)` on send, `Pending -> Consumed`
/// on cancellation, `Ready(T) -> Consumed` on receive.
enum State<T> {
    Pending,
    Ready(T),
    Consumed,
}

impl<T> State<T> {
    fn is_pending(&self) -> bool {
        matches!(self, State::Pending)
    }

    fn set(&mut self, value: T) -> Result<(), T> {
        match self {
            State::Pending => {
                *self = State::Ready(value);
                Ok(())
            }
            State::Ready(_) | State::Consumed => Err(value),
        }
    }

    fn take(&mut self) -> Option<T> {
        match std::mem::replace(self, State::Consumed) {
            State::Pending => panic!("State::take() unexpected: value is not ready yet"),
            State::Ready(value) => Some(value),
            State::Consumed => None,
        }
    }

    fn cancel(&mut self) {
        if self.is_pending() {
            *self = State::Consumed;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::UnsafeCell, time::Duration};

    use crate::oneshot::{self, OneshotReceiver, OneshotSender};

    #[test]
    fn test_oneshot_send_sync() {
        fn is_send_sync<T: Send + Sync>() {}

        fn test<T: Send>() {
            is_send_sync::<OneshotReceiver<T>>();
            is_send_sync::<OneshotSender<T>>();
        }

        test::<usize>();
        test::<UnsafeCell<usize>>();
    }

    #[test]
    fn test_oneshot_basics() {
        let (tx, rx) = oneshot::channel::<usize>();
        assert!(rx.is_pending());
        tx.send(1).unwrap();
        assert_eq!(rx.recv().unwrap(), 1);
        assert!(rx.recv().is_none());

        let (tx, rx) = oneshot::channel::<usize>();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            tx.send(1).unwrap();
        });
        assert_eq!(rx.recv().unwrap(), 1);
    }

    #[test]
    fn test_oneshot_second_send_rejected() {
        let (tx, rx) = oneshot::channel::<usize>();
        tx.send(1).unwrap();
        assert_eq!(tx.send(2), Err(2));
        assert_eq!(rx.recv().unwrap(), 1);
    }

    #[test]
    fn test_oneshot_recv_timeout() {
        let (tx, rx) = oneshot::channel::<usize>();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            tx.send(1).unwrap();
        });
        assert!(rx.recv_timeout(Duration::from_millis(10)).is_err());
        assert!(rx.is_pending());
        assert_eq!(rx.recv().unwrap(), 1);
    }

    #[test]
    fn test_oneshot_sender_dropped() {
        let (tx, rx) = oneshot::channel::<usize>();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            drop(tx);
        });
        assert!(rx.recv().is_none());
        assert!(!rx.is_pending());
    }
}
