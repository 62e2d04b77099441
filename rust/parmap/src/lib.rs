//! Scoped worker pools and an ordered parallel map built on top of them.
//!
//! This crate packages one concurrency pattern that is easy to get wrong by
//! hand: run a fixed function over argument sequences on a bounded pool of
//! worker threads, where normal completion waits for all work and surfaces
//! any failure, while a failure stops issuing new work immediately and never
//! blocks on work the caller no longer needs.
//!
//! # Key Components
//!
//! ## Worker Pool
//!
//! - [`worker_pool::WorkerPool`] - A bounded pool of worker threads with two
//!   shutdown protocols: graceful (drain everything, then join) and abort
//!   (discard queued work, detach without waiting)
//! - [`worker_pool::WorkerPool::scoped`] - Scoped acquisition that picks the
//!   shutdown protocol from how the protected closure completes
//!
//! ## High-Level Parallel Processing
//!
//! - [`data_parallel`] - `run_parallel` and friends: parallel `map` over one
//!   or more argument sequences with input-order results, fail-fast error
//!   propagation, and optional timeout and concurrency bounds
//!
//! ## Task Management
//!
//! - [`join_handle`] - Handles for waiting on unit-of-work results, with
//!   blocking and timeout-bounded joins
//! - [`oneshot`] - Single-value communication between a worker and the
//!   thread waiting on its result
//!
//! # Example
//!
//! ```
//! use parmap::data_parallel::run_parallel;
//! use parmap::error::Error;
//!
//! let squares = run_parallel(|x: u64| Ok::<_, Error>(x * x), 0..8).unwrap();
//! assert_eq!(squares, vec![0, 1, 4, 9, 16, 25, 36, 49]);
//! ```
//!
//! # Failure Semantics
//!
//! The first failing unit of work ends the run: its error is returned to the
//! caller exactly as the function produced it, and a panicking unit re-raises
//! its panic, with the original payload, on the caller's thread. Teardown
//! after a failure is prompt but best-effort: units that already started are
//! not interrupted and finish in the background with their results discarded.

pub mod data_parallel;
pub mod error;
pub mod join_handle;
pub mod oneshot;
pub mod result;
pub mod worker_pool;

mod work_queue;

pub use result::Result;
