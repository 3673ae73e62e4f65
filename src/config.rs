//! Pool configuration and the timing constants that govern backpressure and
//! idle retirement.

use core::time::Duration;

// -----------------------------------------------------------------------------
// Design constants

/// How long a submission waits for room in a full queue before the task is
/// shed.
pub const SUBMIT_TIMEOUT: Duration = Duration::from_secs(1);

/// How long an extra worker in an elastic pool may sit idle before it retires.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// How often an idle worker in an elastic pool wakes to re-check its idle
/// time. This bounds the imprecision of [`IDLE_TIMEOUT`].
pub const IDLE_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// The default maximum number of tasks waiting in the queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// The default maximum number of workers in an elastic pool.
pub const DEFAULT_WORKER_CEILING: usize = 1024;

// -----------------------------------------------------------------------------
// Pool mode

/// The policy a pool uses to size its worker population.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PoolMode {
    /// The pool keeps exactly the number of workers it was started with.
    #[default]
    Fixed,
    /// The pool grows by one worker per submission while the backlog exceeds
    /// the number of idle workers (up to the worker ceiling), and workers
    /// above the initial count retire after [`IDLE_TIMEOUT`] without work.
    Elastic,
}

// -----------------------------------------------------------------------------
// Timings

/// The timing parameters of a pool. These are fixed for users of the crate,
/// but tests shorten them so retirement can be observed quickly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Timings {
    pub submit_timeout: Duration,
    pub idle_timeout: Duration,
    pub idle_poll_interval: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            submit_timeout: SUBMIT_TIMEOUT,
            idle_timeout: IDLE_TIMEOUT,
            idle_poll_interval: IDLE_POLL_INTERVAL,
        }
    }
}

// -----------------------------------------------------------------------------
// Pool config

/// Configuration for a [`ThreadPool`](crate::ThreadPool).
///
/// The same settings can be changed on an unstarted pool through its setters;
/// once the pool is started its configuration is frozen.
///
/// ```
/// use tidepool::{PoolConfig, PoolMode, ThreadPool};
///
/// let config = PoolConfig::new()
///     .with_mode(PoolMode::Elastic)
///     .with_worker_ceiling(8)
///     .with_queue_capacity(64);
/// let pool = ThreadPool::with_config(config);
/// pool.start(2).unwrap();
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    mode: PoolMode,
    worker_ceiling: usize,
    queue_capacity: usize,
    pub(crate) timings: Timings,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            mode: PoolMode::Fixed,
            worker_ceiling: DEFAULT_WORKER_CEILING,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            timings: Timings::default(),
        }
    }
}

impl PoolConfig {
    /// Creates the default configuration: a fixed pool with a queue capacity
    /// of [`DEFAULT_QUEUE_CAPACITY`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the sizing policy.
    pub fn with_mode(mut self, mode: PoolMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the maximum number of workers for an elastic pool. Ignored by
    /// fixed pools. A ceiling below the initial worker count is raised to the
    /// initial count when the pool starts.
    pub fn with_worker_ceiling(mut self, ceiling: usize) -> Self {
        self.worker_ceiling = ceiling;
        self
    }

    /// Sets the maximum number of tasks waiting in the queue. The capacity is
    /// at least one.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    #[cfg(test)]
    pub(crate) fn with_timings(mut self, timings: Timings) -> Self {
        self.timings = timings;
        self
    }

    /// The sizing policy.
    pub fn mode(&self) -> PoolMode {
        self.mode
    }

    /// The maximum number of workers for an elastic pool.
    pub fn worker_ceiling(&self) -> usize {
        self.worker_ceiling
    }

    /// The maximum number of tasks waiting in the queue.
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }
}
