//! A thread-pool with a bounded task queue and an elastic worker population.
//!
//! Tidepool hands closures to a set of OS worker threads through a single
//! shared FIFO queue. The queue has a fixed capacity: when it is full, a
//! submission waits for a short while and is then shed rather than allowed to
//! grow the queue without bound. The number of workers is governed by a
//! [`PoolMode`]:
//!
//! + In [`PoolMode::Fixed`] mode the pool keeps exactly the number of workers
//!   it was started with.
//! + In [`PoolMode::Elastic`] mode the pool spawns one extra worker whenever
//!   the backlog exceeds the number of idle workers (up to a ceiling), and
//!   extra workers retire themselves after sitting idle for
//!   [`IDLE_TIMEOUT`].
//!
//! Every submission returns a [`TaskHandle`] through which the result of the
//! task (or the panic it raised) can be observed. Dropping the pool drains
//! the queue and waits for every worker thread to exit.
//!
//! ```
//! use tidepool::{PoolMode, ThreadPool};
//!
//! let pool = ThreadPool::new();
//! pool.set_mode(PoolMode::Elastic);
//! pool.set_worker_ceiling(4);
//! pool.start(2).unwrap();
//!
//! let sum = pool.submit_with(|(a, b)| a + b, (1, 2));
//! let range = pool.submit(|| (1..=100).sum::<i32>());
//!
//! assert_eq!(sum.wait(), Ok(3));
//! assert_eq!(range.wait(), Ok(5050));
//! ```

#![no_std]
#![cfg_attr(feature = "shuttle", allow(dead_code))]
#![cfg_attr(feature = "shuttle", allow(unused_imports))]

// -----------------------------------------------------------------------------
// Boilerplate for building without the standard library

extern crate alloc;
extern crate std;

// -----------------------------------------------------------------------------
// Modules

mod config;
mod error;
mod job;
mod queue;
mod signal;
mod thread_pool;
mod unwind;
mod worker;

// -----------------------------------------------------------------------------
// Top-level exports

pub use config::DEFAULT_QUEUE_CAPACITY;
pub use config::DEFAULT_WORKER_CEILING;
pub use config::IDLE_POLL_INTERVAL;
pub use config::IDLE_TIMEOUT;
pub use config::PoolConfig;
pub use config::PoolMode;
pub use config::SUBMIT_TIMEOUT;
pub use error::PoolError;
pub use error::TaskError;
pub use job::TaskHandle;
pub use thread_pool::PoolStats;
pub use thread_pool::ThreadPool;

// -----------------------------------------------------------------------------
// Platform Support

// This crate uses `shuttle` for testing, which requires mocking all of the core
// threading primitives (`Mutex` and the like).
//
// To make things a bit simpler, we re-export all the important types in the
// `platform` module.

#[cfg(not(feature = "shuttle"))]
mod platform {

    // Core exports

    pub use alloc::sync::Arc;
    pub use core::sync::atomic::AtomicU32;
    pub use core::sync::atomic::AtomicUsize;
    pub use core::sync::atomic::Ordering;
    pub use std::sync::Condvar;
    pub use std::sync::Mutex;
    pub use std::sync::MutexGuard;
    pub use std::thread::Builder as ThreadBuilder;
    pub use std::thread::JoinHandle;
    pub use std::thread_local;
    pub use std::thread::available_parallelism;
}

#[cfg(feature = "shuttle")]
mod platform {

    // Core exports

    pub use shuttle::sync::Arc;
    pub use shuttle::sync::Condvar;
    pub use shuttle::sync::Mutex;
    pub use shuttle::sync::MutexGuard;
    pub use shuttle::sync::atomic::AtomicU32;
    pub use shuttle::sync::atomic::AtomicUsize;
    pub use shuttle::sync::atomic::Ordering;
    pub use shuttle::thread::Builder as ThreadBuilder;
    pub use shuttle::thread::JoinHandle;
    pub use shuttle::thread_local;

    // Available parallelism

    pub fn available_parallelism() -> std::io::Result<core::num::NonZero<usize>> {
        panic!("available_parallelism does not work on shuttle");
    }
}
