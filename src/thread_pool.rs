//! This module contains the api and controller logic for the tidepool thread
//! pool: configuration, startup, submission with backpressure, elastic
//! scale-up, and the shutdown drain.

use alloc::collections::BTreeMap;
use alloc::format;
use alloc::vec::Vec;
use core::mem;
use core::num::NonZero;
use std::io;
use std::sync::PoisonError;
use std::time::Instant;

use tracing::debug;
use tracing::trace;
use tracing::trace_span;
use tracing::warn;

use crate::config::PoolConfig;
use crate::config::PoolMode;
use crate::error::PoolError;
use crate::job::HeapJob;
use crate::job::JobBox;
use crate::job::TaskHandle;
use crate::platform::*;
use crate::queue::TaskQueue;
use crate::worker;

// -----------------------------------------------------------------------------
// Thread pool types

/// The `ThreadPool` object queues tasks and distributes them to a population
/// of worker threads, and is the main entry point to using tidepool.
///
/// # Lifecycle
///
/// A pool is created unstarted. While unstarted it can be configured with
/// [`ThreadPool::set_mode`], [`ThreadPool::set_worker_ceiling`] and
/// [`ThreadPool::set_queue_capacity`]. [`ThreadPool::start`] spawns the initial
/// workers and freezes the configuration. Tasks may be submitted at any time;
/// tasks submitted before `start` wait in the queue.
///
/// Dropping the pool (or calling [`ThreadPool::shutdown`]) lets the workers
/// drain every queued task, then waits for all worker threads to exit.
///
/// ```
/// use tidepool::{PoolMode, ThreadPool};
///
/// let pool = ThreadPool::new();
/// pool.set_mode(PoolMode::Elastic);
/// pool.set_worker_ceiling(8);
/// pool.start(2).unwrap();
///
/// let handles: Vec<_> = (0..16).map(|i| pool.submit(move || i * i)).collect();
/// let total: i32 = handles.into_iter().map(|h| h.wait().unwrap()).sum();
/// assert_eq!(total, 1240);
///
/// // Waits for every worker to exit.
/// pool.shutdown();
/// ```
///
/// # Backpressure
///
/// The queue is bounded. A submission that finds the queue full waits up to
/// [`SUBMIT_TIMEOUT`](crate::SUBMIT_TIMEOUT) for a slot, and is otherwise
/// shed: its handle resolves immediately with
/// [`TaskError::Rejected`](crate::TaskError::Rejected).
pub struct ThreadPool {
    shared: Arc<Shared>,
}

/// State shared between the pool handle and its workers.
pub(crate) struct Shared {
    /// Everything that must be mutated atomically: the queue, the registry,
    /// and the lifecycle flags.
    pub state: Mutex<PoolState>,
    /// Notified when a job is pushed, and when the pool begins to shut down.
    pub not_empty: Condvar,
    /// Notified when a job is popped, freeing a slot.
    pub not_full: Condvar,
    /// Notified by each initial worker once it is running.
    pub workers_started: Condvar,
    /// Notified whenever a worker removes itself from the registry.
    pub all_exited: Condvar,
    /// The number of live workers. Only written while holding the lock.
    pub current_workers: AtomicUsize,
    /// The number of workers not running a task. Only written while holding
    /// the lock.
    pub idle_workers: AtomicUsize,
    /// The number of jobs waiting in the queue. Only written while holding the
    /// lock.
    pub queued_tasks: AtomicUsize,
}

pub(crate) struct PoolState {
    pub config: PoolConfig,
    pub queue: TaskQueue,
    /// The number of workers the pool was started with.
    pub initial_workers: usize,
    /// Set once by `start`, never cleared.
    pub started: bool,
    /// Set by `start`, cleared when the pool shuts down.
    pub running: bool,
    /// The number of initial workers which have not yet checked in.
    pub starting: usize,
    /// Records for every live worker, keyed by id.
    pub workers: BTreeMap<usize, WorkerRecord>,
    /// Join handles of workers which have removed their records.
    pub exited: Vec<JoinHandle<()>>,
    /// The id the next spawned worker will receive.
    pub next_worker_id: usize,
}

/// The pool's record of a live worker thread.
pub(crate) struct WorkerRecord {
    pub handle: JoinHandle<()>,
}

/// A snapshot of a pool's configuration and load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// The sizing policy.
    pub mode: PoolMode,
    /// The number of workers the pool was started with.
    pub initial_workers: usize,
    /// The number of live workers.
    pub current_workers: usize,
    /// The number of live workers not running a task.
    pub idle_workers: usize,
    /// The number of worker records in the registry.
    pub registered_workers: usize,
    /// The maximum number of workers, for elastic pools.
    pub worker_ceiling: usize,
    /// The number of tasks waiting in the queue.
    pub queued_tasks: usize,
    /// The maximum number of tasks waiting in the queue.
    pub queue_capacity: usize,
    /// Whether the pool has been started and not yet shut down.
    pub running: bool,
}

// -----------------------------------------------------------------------------
// Shared state helpers

impl Shared {
    /// Locks the pool state.
    ///
    /// Task code never runs while the lock is held, so the lock can only be
    /// poisoned by a bug in the pool itself. The state is still consistent
    /// in that case, so poison is ignored.
    #[inline]
    pub fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Waits on `condvar`, releasing the pool lock while asleep.
    #[inline]
    pub fn wait<'a>(
        &self,
        condvar: &Condvar,
        state: MutexGuard<'a, PoolState>,
    ) -> MutexGuard<'a, PoolState> {
        condvar.wait(state).unwrap_or_else(PoisonError::into_inner)
    }

    /// Waits on `condvar` for at most `timeout`. Returns the guard and whether
    /// the wait timed out.
    #[inline]
    pub fn wait_timeout<'a>(
        &self,
        condvar: &Condvar,
        state: MutexGuard<'a, PoolState>,
        timeout: core::time::Duration,
    ) -> (MutexGuard<'a, PoolState>, bool) {
        let (state, result) = condvar
            .wait_timeout(state, timeout)
            .unwrap_or_else(PoisonError::into_inner);
        (state, result.timed_out())
    }

    /// Spawns a worker thread and registers it. The caller holds the lock,
    /// so the new worker cannot touch the registry until the record exists.
    fn spawn_worker(
        self: &Arc<Self>,
        state: &mut PoolState,
        check_in: bool,
    ) -> io::Result<usize> {
        Self::reap_exited(state);

        let id = state.next_worker_id;
        let shared = self.clone();
        let handle = ThreadBuilder::new()
            .name(format!("tidepool worker {id}"))
            .spawn(move || worker::run(shared, id, check_in))?;
        state.next_worker_id += 1;
        let previous = state.workers.insert(id, WorkerRecord { handle });
        debug_assert!(previous.is_none(), "worker id {id} registered twice");
        trace!("spawned worker {}", id);
        Ok(id)
    }

    /// Joins the threads of workers which have left the registry.
    ///
    /// A worker pushes its handle while holding the lock and never takes the
    /// lock again, so with the lock held here every thread in the list is
    /// already on its way out and the joins return promptly.
    fn reap_exited(state: &mut PoolState) {
        if state.exited.is_empty() {
            return;
        }
        trace!("reaping {} exited worker(s)", state.exited.len());
        for handle in state.exited.drain(..) {
            let _ = handle.join();
        }
    }

    /// Blocks until there is room in the queue, then pushes the job. If the
    /// queue stays full past the submission timeout, the job is rejected.
    fn submit(self: &Arc<Self>, job: JobBox) {
        let mut state = self.lock();
        let deadline = Instant::now() + state.config.timings.submit_timeout;

        let mut job = job;
        loop {
            match state.queue.push(job) {
                Ok(()) => break,
                Err(refused) => job = refused,
            }

            let now = Instant::now();
            if now >= deadline {
                drop(state);
                warn!("task queue is full, rejecting task");
                job.reject();
                return;
            }

            state = self.wait_timeout(&self.not_full, state, deadline - now).0;
        }

        let queued = self.queued_tasks.fetch_add(1, Ordering::Relaxed) + 1;
        self.not_empty.notify_one();

        if state.config.mode() == PoolMode::Elastic && state.running {
            self.scale_up(&mut state, queued);
        }
    }

    /// Adds at most one worker to an elastic pool when the backlog exceeds the
    /// number of idle workers.
    fn scale_up(self: &Arc<Self>, state: &mut PoolState, queued: usize) {
        let idle = self.idle_workers.load(Ordering::Relaxed);
        let current = self.current_workers.load(Ordering::Relaxed);
        if queued <= idle || current >= state.config.worker_ceiling() {
            return;
        }

        match self.spawn_worker(state, false) {
            Ok(id) => {
                self.current_workers.fetch_add(1, Ordering::Relaxed);
                self.idle_workers.fetch_add(1, Ordering::Relaxed);
                debug!(
                    "backlog of {} exceeds {} idle workers, added worker {} ({} total)",
                    queued,
                    idle,
                    id,
                    current + 1
                );
            }
            Err(err) => {
                warn!("failed to spawn additional worker: {}", err);
            }
        }
    }

    /// Stops the pool: lets the workers drain the queue, waits for all of them
    /// to deregister, and joins their threads.
    ///
    /// When the last handle to the pool is dropped by a task, this runs on one
    /// of the pool's own workers. That worker cannot wait for itself, so it is
    /// detached instead and drains whatever is left in the queue once the task
    /// returns.
    fn shutdown(&self) {
        let _span = trace_span!("shutdown").entered();

        let own = worker::current_worker(self);

        let mut state = self.lock();
        state.running = false;
        self.not_empty.notify_all();

        while state.workers.keys().any(|&id| Some(id) != own) {
            trace!("waiting for {} worker(s) to exit", state.workers.len());
            state = self.wait(&self.all_exited, state);
        }

        if let Some(id) = own {
            state.workers.remove(&id);
            debug!("worker {} shut down its own pool, detaching it", id);
        } else {
            // Anything still queued was submitted to a pool that never started.
            let mut abandoned = 0;
            while let Some(job) = state.queue.pop() {
                drop(job);
                abandoned += 1;
            }
            if abandoned > 0 {
                self.queued_tasks.store(0, Ordering::Relaxed);
                debug!("abandoned {} task(s) queued on an unstarted pool", abandoned);
            }
        }

        let exited = mem::take(&mut state.exited);
        drop(state);

        for handle in exited {
            let _ = handle.join();
        }

        debug!("thread pool shut down");
    }
}

// -----------------------------------------------------------------------------
// Thread pool creation and configuration

impl Default for ThreadPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ThreadPool {
    /// Creates a new, unstarted thread pool with the default configuration.
    pub fn new() -> ThreadPool {
        Self::with_config(PoolConfig::default())
    }

    /// Creates a new, unstarted thread pool with the given configuration.
    pub fn with_config(config: PoolConfig) -> ThreadPool {
        let queue = TaskQueue::new(config.queue_capacity());
        let state = PoolState {
            config,
            queue,
            initial_workers: 0,
            started: false,
            running: false,
            starting: 0,
            workers: BTreeMap::new(),
            exited: Vec::new(),
            next_worker_id: 0,
        };

        ThreadPool {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                not_empty: Condvar::new(),
                not_full: Condvar::new(),
                workers_started: Condvar::new(),
                all_exited: Condvar::new(),
                current_workers: AtomicUsize::new(0),
                idle_workers: AtomicUsize::new(0),
                queued_tasks: AtomicUsize::new(0),
            }),
        }
    }

    /// Sets the sizing policy. Returns `false` (and changes nothing) if the
    /// pool has already been started.
    pub fn set_mode(&self, mode: PoolMode) -> bool {
        let mut state = self.shared.lock();
        if state.started {
            debug!("ignoring mode change on a started pool");
            return false;
        }
        state.config = state.config.clone().with_mode(mode);
        true
    }

    /// Sets the maximum number of workers. Only meaningful for elastic pools:
    /// returns `false` (and changes nothing) if the pool is not in
    /// [`PoolMode::Elastic`] mode, or has already been started.
    pub fn set_worker_ceiling(&self, ceiling: usize) -> bool {
        let mut state = self.shared.lock();
        if state.started {
            debug!("ignoring worker ceiling change on a started pool");
            return false;
        }
        if state.config.mode() != PoolMode::Elastic {
            debug!("ignoring worker ceiling change on a fixed pool");
            return false;
        }
        state.config = state.config.clone().with_worker_ceiling(ceiling);
        true
    }

    /// Sets the maximum number of tasks waiting in the queue (at least one).
    /// Returns `false` (and changes nothing) if the pool has already been
    /// started.
    pub fn set_queue_capacity(&self, capacity: usize) -> bool {
        let mut state = self.shared.lock();
        if state.started {
            debug!("ignoring queue capacity change on a started pool");
            return false;
        }
        state.config = state.config.clone().with_queue_capacity(capacity);
        state.queue.set_capacity(capacity);
        true
    }

    /// Returns a copy of the pool's configuration.
    pub fn config(&self) -> PoolConfig {
        self.shared.lock().config.clone()
    }
}

// -----------------------------------------------------------------------------
// Thread pool lifecycle

impl ThreadPool {
    /// Starts the pool with `initial_workers` worker threads, and returns once
    /// all of them are running. After this, the configuration is frozen.
    ///
    /// A pool can only be started once; later calls return
    /// [`PoolError::AlreadyStarted`] and have no effect.
    ///
    /// If a worker thread cannot be spawned, the pool keeps the workers that
    /// did start (and treats their number as the initial worker count) and
    /// returns [`PoolError::Spawn`].
    #[cold]
    pub fn start(&self, initial_workers: usize) -> Result<(), PoolError> {
        let _span = trace_span!("start", initial_workers).entered();

        let mut state = self.shared.lock();
        if state.started {
            warn!("attempted to start a thread pool twice");
            return Err(PoolError::AlreadyStarted);
        }
        state.started = true;
        state.running = true;

        if state.config.worker_ceiling() < initial_workers {
            state.config = state.config.clone().with_worker_ceiling(initial_workers);
        }

        let mut failure = None;
        let mut spawned = 0;
        for _ in 0..initial_workers {
            match self.shared.spawn_worker(&mut state, true) {
                Ok(_) => spawned += 1,
                Err(err) => {
                    warn!("failed to spawn worker: {}", err);
                    failure = Some(err);
                    break;
                }
            }
        }

        state.initial_workers = spawned;
        state.starting = spawned;
        self.shared.current_workers.store(spawned, Ordering::Relaxed);
        self.shared.idle_workers.store(spawned, Ordering::Relaxed);

        // Wait for the workers to check in.
        while state.starting > 0 {
            state = self.shared.wait(&self.shared.workers_started, state);
        }

        debug!(
            "started {:?} thread pool with {} worker(s)",
            state.config.mode(),
            spawned
        );

        match failure {
            Some(err) => Err(PoolError::Spawn(err)),
            None => Ok(()),
        }
    }

    /// Starts the pool with one worker per available core. Returns the number
    /// of workers started.
    ///
    /// See [`ThreadPool::start`] for more information.
    pub fn start_available(&self) -> Result<usize, PoolError> {
        let available = available_parallelism().map(NonZero::get).unwrap_or(1);
        self.start(available)?;
        Ok(available)
    }

    /// Shuts the pool down. Every queued task is run to completion, then all
    /// worker threads are joined.
    ///
    /// This is equivalent to dropping the pool, but makes the wait explicit.
    pub fn shutdown(self) {
        drop(self);
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shared.shutdown();
    }
}

// -----------------------------------------------------------------------------
// Thread pool scheduling api

impl ThreadPool {
    /// Submits a closure to the pool, returning a handle to its result.
    ///
    /// If the queue is full this blocks for up to
    /// [`SUBMIT_TIMEOUT`](crate::SUBMIT_TIMEOUT); if no slot frees up in that
    /// time the task is dropped and the handle resolves to
    /// [`TaskError::Rejected`](crate::TaskError::Rejected).
    ///
    /// In an elastic pool, a successful submission may spawn one additional
    /// worker.
    pub fn submit<F, T>(&self, func: F) -> TaskHandle<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (job, handle) = HeapJob::new(func);
        self.shared.submit(job);
        handle
    }

    /// Submits a function along with the argument it should be called with.
    ///
    /// See [`ThreadPool::submit`] for more information.
    pub fn submit_with<F, A, T>(&self, func: F, args: A) -> TaskHandle<T>
    where
        F: FnOnce(A) -> T + Send + 'static,
        A: Send + 'static,
        T: Send + 'static,
    {
        self.submit(move || func(args))
    }
}

// -----------------------------------------------------------------------------
// Thread pool introspection

impl ThreadPool {
    /// The number of live workers.
    #[inline]
    pub fn current_workers(&self) -> usize {
        self.shared.current_workers.load(Ordering::Relaxed)
    }

    /// The number of live workers not currently running a task.
    #[inline]
    pub fn idle_workers(&self) -> usize {
        self.shared.idle_workers.load(Ordering::Relaxed)
    }

    /// The number of tasks waiting in the queue.
    #[inline]
    pub fn queued_tasks(&self) -> usize {
        self.shared.queued_tasks.load(Ordering::Relaxed)
    }

    /// Takes a consistent snapshot of the pool.
    pub fn stats(&self) -> PoolStats {
        let state = self.shared.lock();
        PoolStats {
            mode: state.config.mode(),
            initial_workers: state.initial_workers,
            current_workers: self.shared.current_workers.load(Ordering::Relaxed),
            idle_workers: self.shared.idle_workers.load(Ordering::Relaxed),
            registered_workers: state.workers.len(),
            worker_ceiling: state.config.worker_ceiling(),
            queued_tasks: state.queue.len(),
            queue_capacity: state.queue.capacity(),
            running: state.running,
        }
    }
}

impl core::fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ThreadPool")
            .field("stats", &self.stats())
            .finish()
    }
}
