//! Ordered parallel map over argument sequences.
//!
//! [`run_parallel`] applies a function to every element of an input sequence
//! on a pool of worker threads and collects the outputs **in input order**,
//! regardless of the order in which units of work complete. The first
//! failure ends the whole run: the failing unit's error is returned by value,
//! unwrapped, and the pool is torn down through its abort protocol instead of
//! waiting for work the caller no longer needs.
//!
//! [`run_parallel2`] and [`run_parallel3`] are the multi-sequence entry
//! points: the sequences are combined positionally and truncated to the
//! shortest, the same way `Iterator::zip` behaves.
//!
//! # Caller obligations
//!
//! The supplied function is invoked concurrently from several threads and
//! must be safe for that. Nothing here can verify it; invoking a
//! non-thread-safe function is undefined behavior with respect to whatever
//! shared state it touches.
//!
//! # Sizing
//!
//! By default the pool gets one worker per unit of work, which keeps every
//! unit runnable at once but can over-subscribe the system for large inputs.
//! [`RunOptions::max_workers`] bounds the pool; excess units queue and run as
//! workers free up.
//!
//! # Cancellation
//!
//! Cancellation is best-effort. On failure or timeout, units that never
//! started are discarded, but units already running are not interrupted;
//! they finish in the background and their results are dropped.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use crate::{error::Error, worker_pool::WorkerPool};

/// Tuning knobs for [`run_parallel_with`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Upper bound on the total wall-clock wait for all results. When the
    /// bound is exceeded the run fails with a `Timeout` error and the pool
    /// is abort-shut-down. Must be non-zero when supplied.
    pub timeout: Option<Duration>,

    /// Upper bound on the number of worker threads. Defaults to one worker
    /// per unit of work. Must be non-zero when supplied.
    pub max_workers: Option<usize>,
}

impl RunOptions {
    pub fn new() -> RunOptions {
        Default::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> RunOptions {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> RunOptions {
        self.max_workers = Some(max_workers);
        self
    }
}

/// Applies `f` to every element of `args` in parallel and returns the
/// outputs in input order.
///
/// Equivalent to [`run_parallel_with`] with default [`RunOptions`]: no
/// timeout, one worker per unit of work.
pub fn run_parallel<T, R, E, F>(
    f: F,
    args: impl IntoIterator<Item = T>,
) -> std::result::Result<Vec<R>, E>
where
    T: Send + 'static,
    R: Send + 'static,
    E: From<Error> + Send + 'static,
    F: Fn(T) -> std::result::Result<R, E> + Send + Sync + 'static,
{
    run_parallel_with(RunOptions::default(), f, args)
}

/// Applies `f` to every element of `args` in parallel, subject to `options`,
/// and returns the outputs in input order.
///
/// On success, `results[i] == f(args[i])` for every `i`. On the first
/// failing unit (observed in input order) the run stops waiting, the pool is
/// abort-shut-down, and that unit's error is returned exactly as `f`
/// produced it. A unit that panics re-raises its panic, with the original
/// payload, on the calling thread. When `options.timeout` expires before all
/// results are available, the run fails with a `Timeout` error instead.
///
/// Errors originating here rather than in `f` (invalid options, timeout)
/// enter the caller's error type through its `From<Error>` conversion.
pub fn run_parallel_with<T, R, E, F>(
    options: RunOptions,
    f: F,
    args: impl IntoIterator<Item = T>,
) -> std::result::Result<Vec<R>, E>
where
    T: Send + 'static,
    R: Send + 'static,
    E: From<Error> + Send + 'static,
    F: Fn(T) -> std::result::Result<R, E> + Send + Sync + 'static,
{
    crate::verify_arg!(max_workers, options.max_workers != Some(0));
    crate::verify_arg!(timeout, options.timeout != Some(Duration::ZERO));

    let units: Vec<T> = args.into_iter().collect();
    if units.is_empty() {
        return Ok(Vec::new());
    }

    let worker_count = options.max_workers.unwrap_or(units.len()).min(units.len());
    let deadline = options.timeout.map(|limit| (Instant::now() + limit, limit));

    WorkerPool::scoped(worker_count, move |pool| {
        let f = Arc::new(f);
        let handles = units
            .into_iter()
            .map(|unit| {
                let f = Arc::clone(&f);
                pool.spawn(move || (*f)(unit))
            })
            .collect::<Vec<_>>();

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            let unit = match deadline {
                None => handle.join(),
                Some((deadline, limit)) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    handle
                        .join_timeout(remaining)
                        .map_err(|_| E::from(Error::timeout(limit)))?
                }
            };
            match unit {
                Some(Ok(value)) => results.push(value),
                Some(Err(err)) => return Err(err),
                None => return Err(E::from(Error::cancelled("unit of work"))),
            }
        }
        Ok(results)
    })
}

/// Applies `f` to corresponding elements of two sequences in parallel.
///
/// The sequences are combined positionally and truncated to the shorter one.
pub fn run_parallel2<A, B, R, E, F>(
    f: F,
    first: impl IntoIterator<Item = A>,
    second: impl IntoIterator<Item = B>,
) -> std::result::Result<Vec<R>, E>
where
    A: Send + 'static,
    B: Send + 'static,
    R: Send + 'static,
    E: From<Error> + Send + 'static,
    F: Fn(A, B) -> std::result::Result<R, E> + Send + Sync + 'static,
{
    run_parallel(move |(a, b)| f(a, b), first.into_iter().zip(second))
}

/// Applies `f` to corresponding elements of three sequences in parallel.
///
/// The sequences are combined positionally and truncated to the shortest one.
pub fn run_parallel3<A, B, C, R, E, F>(
    f: F,
    first: impl IntoIterator<Item = A>,
    second: impl IntoIterator<Item = B>,
    third: impl IntoIterator<Item = C>,
) -> std::result::Result<Vec<R>, E>
where
    A: Send + 'static,
    B: Send + 'static,
    C: Send + 'static,
    R: Send + 'static,
    E: From<Error> + Send + 'static,
    F: Fn(A, B, C) -> std::result::Result<R, E> + Send + Sync + 'static,
{
    let args = first
        .into_iter()
        .zip(second.into_iter().zip(third))
        .map(|(a, (b, c))| (a, b, c));
    run_parallel(move |(a, b, c)| f(a, b, c), args)
}

/// Runs `f` for every element of `args` in parallel, discarding outputs.
///
/// Failure semantics match [`run_parallel`]: the first failing unit ends the
/// run and its error is returned unchanged.
pub fn for_each<T, E, F>(
    f: F,
    args: impl IntoIterator<Item = T>,
) -> std::result::Result<(), E>
where
    T: Send + 'static,
    E: From<Error> + Send + 'static,
    F: Fn(T) -> std::result::Result<(), E> + Send + Sync + 'static,
{
    run_parallel(f, args).map(|_| ())
}
