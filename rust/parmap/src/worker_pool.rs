//! Bounded worker pool with scoped acquisition and two shutdown protocols.
//!
//! A [`WorkerPool`] owns a fixed set of worker threads that execute submitted
//! units of work to completion. The pool is built for single-scope usage:
//! create it, submit work, and tear it down exactly once through one of two
//! protocols:
//!
//! - [`shutdown`](WorkerPool::shutdown) (graceful): stop accepting new units,
//!   wait for every queued and in-flight unit to finish, then join the worker
//!   threads. Blocking, bounded only by the slowest unit of work.
//! - [`abort`](WorkerPool::abort): discard every unit that has not started,
//!   and release the worker threads without waiting for in-flight units.
//!   Never blocks on running work.
//!
//! The distinction is what makes failure propagation fast: waiting for all
//! units to finish while unwinding from an error would stall an
//! already-failed operation on unrelated slow work. [`WorkerPool::scoped`]
//! packages the choice: it runs a closure against a fresh pool and picks the
//! shutdown protocol from how the closure completes.
//!
//! Cancellation is best-effort: aborting discards queued units only. Units
//! that already started keep running in the background with their results
//! discarded. [`WorkerCounter`] makes the eventual drain observable.

use std::{
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
};

use crate::{
    error::Error, join_handle::JoinHandle, oneshot, result::Result, work_queue::WorkQueue,
};

/// A boxed unit of work, ready to run on a worker thread.
type Task = Box<dyn FnOnce() + Send + 'static>;

/// A bounded pool of worker threads consuming a shared task queue.
///
/// At most `worker_count` units of work execute concurrently. The pool is
/// owned by the scope that created it and is torn down exactly once, either
/// by [`shutdown`](Self::shutdown), by [`abort`](Self::abort), or by being
/// dropped (which behaves like `abort` and never blocks).
pub struct WorkerPool {
    queue: WorkQueue<Task>,
    threads: Vec<thread::JoinHandle<()>>,
    live: WorkerCounter,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("worker_count", &self.threads.len())
            .finish_non_exhaustive()
    }
}

impl WorkerPool {
    /// Creates a pool with exactly `worker_count` worker threads.
    ///
    /// Fails with an `InvalidArgument` error if `worker_count` is zero.
    pub fn new(worker_count: usize) -> Result<WorkerPool> {
        crate::verify_arg!(worker_count, worker_count > 0);

        let queue = WorkQueue::new();
        let live = WorkerCounter::new();
        let threads = (0..worker_count)
            .map(|i| {
                let queue = queue.clone();
                let live = live.clone();
                live.started();
                thread::Builder::new()
                    .name(format!("parmap-worker-{i}"))
                    .spawn(move || Self::thread_fn(queue, live))
                    .expect("spawn worker thread")
            })
            .collect();

        Ok(WorkerPool {
            queue,
            threads,
            live,
        })
    }

    /// Runs `f` against a freshly created pool and tears the pool down
    /// according to how `f` completes.
    ///
    /// - `Ok(..)`: graceful shutdown, then the value is returned;
    /// - `Err(..)`: abort shutdown, then the error is returned unchanged;
    /// - panic: abort shutdown, then the panic continues unwinding.
    ///
    /// Pool creation errors are converted into the closure's error type, so
    /// a caller-facing operation can surface them through its own `Result`.
    pub fn scoped<F, T, E>(worker_count: usize, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&WorkerPool) -> std::result::Result<T, E>,
        E: From<Error>,
    {
        let pool = WorkerPool::new(worker_count)?;
        let guard = AbortGuard(Some(pool));
        match f(guard.pool()) {
            Ok(value) => {
                guard.disarm().shutdown();
                Ok(value)
            }
            Err(err) => {
                drop(guard);
                Err(err)
            }
        }
    }

    /// Submits one unit of work and returns a handle to its result.
    ///
    /// The unit runs on the first worker thread that becomes available. A
    /// panic inside `f` does not take the worker down; it is captured and
    /// re-raised when the handle is joined.
    pub fn spawn<F, R>(&self, f: F) -> JoinHandle<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let task: Task = Box::new(move || {
            let unit = panic::catch_unwind(AssertUnwindSafe(f));
            let _ = tx.send(unit);
        });
        // A task rejected because shutdown already began is dropped here,
        // which resolves its handle as cancelled.
        let _ = self.queue.push(task);
        JoinHandle::new(rx)
    }

    /// Number of worker threads currently alive.
    pub fn live_workers(&self) -> usize {
        self.live.live()
    }

    /// Returns a cloneable handle to the live-worker counter.
    ///
    /// The counter outlives the pool, which makes it possible to observe
    /// workers draining after an [`abort`](Self::abort): in-flight units keep
    /// running until they finish, and the counter reaches zero only once the
    /// last worker thread has exited.
    pub fn worker_counter(&self) -> WorkerCounter {
        self.live.clone()
    }

    /// Graceful shutdown: stops accepting new units of work, waits for every
    /// queued and in-flight unit to finish, then joins the worker threads.
    pub fn shutdown(mut self) {
        self.queue.finish();
        for worker in self.threads.drain(..) {
            if worker.join().is_err() {
                log::warn!("worker thread terminated abnormally during shutdown");
            }
        }
    }

    /// Abort shutdown: discards every queued unit of work that has not
    /// started and releases the worker threads without joining them.
    ///
    /// In-flight units are not interrupted; they run to completion in the
    /// background and their results are discarded. Discarded units resolve
    /// their handles as cancelled. Failures raised while discarding are
    /// suppressed so they cannot mask the error that triggered the abort.
    pub fn abort(mut self) {
        self.abort_now();
    }

    fn abort_now(&mut self) {
        let queue = &self.queue;
        match panic::catch_unwind(AssertUnwindSafe(|| queue.abort())) {
            Ok(0) => {}
            Ok(discarded) => {
                log::debug!("abort shutdown discarded {discarded} queued units of work")
            }
            Err(_) => log::warn!("suppressed a panic while discarding queued units of work"),
        }
        // Dropping the thread handles detaches the workers.
        self.threads.clear();
    }

    fn thread_fn(queue: WorkQueue<Task>, live: WorkerCounter) {
        while let Some(task) = queue.pop() {
            task();
        }
        live.exited();
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.abort_now();
    }
}

/// Tears the pool down with [`WorkerPool::abort`] unless disarmed first.
struct AbortGuard(Option<WorkerPool>);

impl AbortGuard {
    fn pool(&self) -> &WorkerPool {
        self.0.as_ref().expect("pool")
    }

    fn disarm(mut self) -> WorkerPool {
        self.0.take().expect("pool")
    }
}

impl Drop for AbortGuard {
    fn drop(&mut self) {
        if let Some(pool) = self.0.take() {
            pool.abort();
        }
    }
}

/// Cloneable counter of live worker threads.
///
/// Incremented when a worker thread starts and decremented when it exits.
/// After a graceful shutdown the count is zero by the time the shutdown call
/// returns; after an abort it drains to zero once in-flight units finish.
#[derive(Clone)]
pub struct WorkerCounter(Arc<AtomicUsize>);

impl WorkerCounter {
    fn new() -> WorkerCounter {
        WorkerCounter(Arc::new(AtomicUsize::new(0)))
    }

    fn started(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    fn exited(&self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }

    /// Number of worker threads currently alive.
    pub fn live(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::{
        sync::atomic::AtomicUsize,
        time::{Duration, Instant},
    };

    fn wait_for_drain(counter: &WorkerCounter) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while counter.live() > 0 {
            assert!(Instant::now() < deadline, "worker threads did not drain");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_new_zero_workers() {
        let err = WorkerPool::new(0).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidArgument { .. }));
    }

    #[test]
    fn test_spawn_and_join() {
        let pool = WorkerPool::new(2).unwrap();
        let handle = pool.spawn(|| 42);
        assert_eq!(handle.join(), Some(42));
        pool.shutdown();
    }

    #[test]
    fn test_units_run_concurrently() {
        let pool = WorkerPool::new(4).unwrap();
        let sleep = Duration::from_millis(50);
        let start = Instant::now();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                pool.spawn(move || {
                    thread::sleep(sleep);
                    42
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join(), Some(42));
        }

        assert!(start.elapsed() < sleep * 3);
        pool.shutdown();
    }

    #[test]
    fn test_shutdown_waits_for_queued_units() {
        let pool = WorkerPool::new(1).unwrap();
        let workers = pool.worker_counter();
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let counter = counter.clone();
            pool.spawn(move || {
                thread::sleep(Duration::from_millis(30));
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        pool.shutdown();

        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert_eq!(workers.live(), 0);
    }

    #[test]
    fn test_abort_discards_queued_units() {
        let pool = WorkerPool::new(1).unwrap();
        let workers = pool.worker_counter();
        let counter = Arc::new(AtomicUsize::new(0));

        pool.spawn(|| thread::sleep(Duration::from_millis(500)));
        let queued: Vec<_> = (0..3)
            .map(|_| {
                let counter = counter.clone();
                pool.spawn(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect();
        thread::sleep(Duration::from_millis(20));

        let start = Instant::now();
        pool.abort();
        assert!(start.elapsed() < Duration::from_millis(100));

        for handle in queued {
            assert_eq!(handle.join(), None);
        }
        wait_for_drain(&workers);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_live_workers_counter() {
        let pool = WorkerPool::new(3).unwrap();
        assert_eq!(pool.live_workers(), 3);
        let workers = pool.worker_counter();
        pool.shutdown();
        assert_eq!(workers.live(), 0);
    }

    #[test]
    fn test_unit_panic_does_not_kill_worker() {
        let pool = WorkerPool::new(1).unwrap();
        let failed = pool.spawn(|| panic!("unit failed"));
        let ok = pool.spawn(|| 5);

        let res = panic::catch_unwind(AssertUnwindSafe(move || failed.join()));
        let payload = res.unwrap_err();
        assert_eq!(*payload.downcast_ref::<&str>().unwrap(), "unit failed");

        // The single worker survived the panic and serves the next unit.
        assert_eq!(ok.join(), Some(5));
        pool.shutdown();
    }

    #[test]
    fn test_scoped_success_runs_all_units() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut workers = None;

        let res: std::result::Result<usize, Error> = WorkerPool::scoped(2, |pool| {
            workers = Some(pool.worker_counter());
            for _ in 0..5 {
                let counter = counter.clone();
                pool.spawn(move || {
                    thread::sleep(Duration::from_millis(10));
                    counter.fetch_add(1, Ordering::SeqCst);
                });
            }
            Ok(7)
        });

        assert_eq!(res.unwrap(), 7);
        assert_eq!(counter.load(Ordering::SeqCst), 5);
        assert_eq!(workers.unwrap().live(), 0);
    }

    #[test]
    fn test_scoped_error_aborts_without_waiting() {
        let mut workers = None;
        let start = Instant::now();

        let res: std::result::Result<(), Error> = WorkerPool::scoped(1, |pool| {
            workers = Some(pool.worker_counter());
            pool.spawn(|| thread::sleep(Duration::from_millis(300)));
            thread::sleep(Duration::from_millis(20));
            Err(Error::invalid_arg("test", "forced failure"))
        });

        assert!(res.is_err());
        assert!(start.elapsed() < Duration::from_millis(150));
        wait_for_drain(&workers.unwrap());
    }

    #[test]
    fn test_scoped_unwind_aborts_without_waiting() {
        let start = Instant::now();

        let res = panic::catch_unwind(|| {
            WorkerPool::scoped::<_, (), Error>(1, |pool| {
                pool.spawn(|| thread::sleep(Duration::from_millis(300)));
                thread::sleep(Duration::from_millis(20));
                panic!("scope failed")
            })
        });

        let payload = res.unwrap_err();
        assert_eq!(*payload.downcast_ref::<&str>().unwrap(), "scope failed");
        assert!(start.elapsed() < Duration::from_millis(150));
    }

    #[test]
    fn test_drop_behaves_like_abort() {
        let pool = WorkerPool::new(1).unwrap();
        let workers = pool.worker_counter();
        let ran = Arc::new(AtomicUsize::new(0));

        pool.spawn(|| thread::sleep(Duration::from_millis(300)));
        let ran_clone = ran.clone();
        pool.spawn(move || {
            ran_clone.fetch_add(1, Ordering::SeqCst);
        });
        thread::sleep(Duration::from_millis(20));

        let start = Instant::now();
        drop(pool);
        assert!(start.elapsed() < Duration::from_millis(50));

        wait_for_drain(&workers);
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }
}
