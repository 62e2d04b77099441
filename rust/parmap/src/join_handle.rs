//! Handles for waiting on the results of submitted units of work.
//!
//! A [`JoinHandle<R>`] is returned by
//! [`WorkerPool::spawn`](crate::worker_pool::WorkerPool::spawn) and resolves
//! with the unit's return value once it has run. A unit that was discarded
//! before it ran (because the pool was shut down with work still queued)
//! resolves with `None`. A unit that panicked re-raises the panic, with its
//! original payload, on the thread that joins the handle.

use std::{panic, sync::mpsc::RecvTimeoutError, time::Duration};

use crate::oneshot::OneshotReceiver;

/// Outcome of one unit of work: the closure's return value, or the payload of
/// the panic that terminated it.
pub(crate) type UnitResult<R> = std::thread::Result<R>;

/// A handle for waiting on the result of one submitted unit of work.
///
/// ## Lifecycle
///
/// 1. **Created**: returned from `WorkerPool::spawn`
/// 2. **Pending**: the unit is queued or running
/// 3. **Ready**: the unit completed (or was discarded) and the outcome is
///    available
/// 4. **Consumed**: the outcome was retrieved via [`join()`](Self::join) or
///    [`join_timeout()`](Self::join_timeout)
pub struct JoinHandle<R>(OneshotReceiver<UnitResult<R>>);

impl<R> JoinHandle<R> {
    pub(crate) fn new(rx: OneshotReceiver<UnitResult<R>>) -> JoinHandle<R> {
        JoinHandle(rx)
    }

    /// Checks if the outcome is ready without blocking.
    pub fn is_ready(&self) -> bool {
        !self.0.is_pending()
    }

    /// Waits for the unit of work to complete and returns its result.
    ///
    /// Returns `None` when the unit was discarded before it ran. If the unit
    /// panicked, the panic is re-raised here with its original payload.
    pub fn join(self) -> Option<R> {
        Self::unwrap_unit(self.0.recv())
    }

    /// Like [`join()`](Self::join), but waits at most `timeout`.
    ///
    /// The handle is consumed either way; an expired wait abandons the unit,
    /// which keeps running in the background with its result discarded.
    pub fn join_timeout(self, timeout: Duration) -> Result<Option<R>, RecvTimeoutError> {
        let unit = self.0.recv_timeout(timeout)?;
        Ok(Self::unwrap_unit(unit))
    }

    fn unwrap_unit(unit: Option<UnitResult<R>>) -> Option<R> {
        match unit {
            Some(Ok(value)) => Some(value),
            Some(Err(payload)) => panic::resume_unwind(payload),
            None => None,
        }
    }
}
