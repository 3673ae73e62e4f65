//! The worker state machine and the main worker loop.
//!
//! A worker moves between four states:
//!
//! ```text
//!            dequeue               idle timeout (elastic, above minimum)
//!   Idle ------------> Busy        Idle ------------> Retiring ----> Exited
//!    ^                  |
//!    +------------------+          Idle/Busy --------------------------> Exited
//!         completion                          shutdown, queue empty
//! ```
//!
//! The guards for leaving `Idle` are evaluated by [`IdleCheck::decide`], a
//! pure function over a snapshot of the pool, so each transition can be
//! tested without spinning up threads.

use core::cell::Cell;
use core::ptr;
use core::time::Duration;
use std::time::Instant;

use tracing::debug;
use tracing::trace;
use tracing::trace_span;

use crate::config::PoolMode;
use crate::job::JobBox;
use crate::platform::*;
use crate::thread_pool::PoolState;
use crate::thread_pool::Shared;

// -----------------------------------------------------------------------------
// States and events

/// The lifecycle state of a worker thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WorkerState {
    /// Waiting for a task.
    Idle,
    /// Running a task.
    Busy,
    /// Leaving an elastic pool after sitting idle too long.
    Retiring,
    /// Deregistered and about to terminate.
    Exited,
}

/// Something that happened to a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WorkerEvent {
    /// A task was taken from the queue.
    Dequeued,
    /// The running task returned or panicked.
    Completed,
    /// The idle timeout elapsed while the pool was above its minimum size.
    IdleExpired,
    /// The pool is shutting down and the queue is empty.
    Shutdown,
    /// A retiring worker removed its record.
    Deregistered,
}

impl WorkerState {
    /// Returns the state reached by applying `event`, or `None` if the event
    /// is not valid in this state.
    pub(crate) fn on(self, event: WorkerEvent) -> Option<WorkerState> {
        use WorkerEvent::*;
        use WorkerState::*;

        match (self, event) {
            (Idle, Dequeued) => Some(Busy),
            (Busy, Completed) => Some(Idle),
            (Idle, IdleExpired) => Some(Retiring),
            (Idle | Busy, Shutdown) => Some(Exited),
            (Retiring, Deregistered) => Some(Exited),
            _ => None,
        }
    }

    /// Returns true if the worker has left the pool.
    pub fn is_terminal(self) -> bool {
        self == WorkerState::Exited
    }
}

// -----------------------------------------------------------------------------
// Idle guards

/// What an idle worker can see of the pool when deciding what to do next.
#[derive(Debug, Clone, Copy)]
pub(crate) struct IdleCheck {
    pub mode: PoolMode,
    pub running: bool,
    pub queue_empty: bool,
    /// Whether the worker's last wait ended by timing out.
    pub timed_out: bool,
    pub idle_for: Duration,
    pub idle_timeout: Duration,
    pub current_workers: usize,
    pub initial_workers: usize,
}

/// The action an idle worker takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IdleDecision {
    /// Pop the head of the queue.
    Take,
    /// Keep waiting for work.
    Wait,
    /// Retire from an elastic pool.
    Retire,
    /// Exit because the pool is shutting down.
    Exit,
}

impl IdleCheck {
    pub fn decide(&self) -> IdleDecision {
        // Queued work always comes first, even during shutdown.
        if !self.queue_empty {
            return IdleDecision::Take;
        }

        if !self.running {
            return IdleDecision::Exit;
        }

        if self.mode == PoolMode::Elastic
            && self.timed_out
            && self.idle_for >= self.idle_timeout
            && self.current_workers > self.initial_workers
        {
            return IdleDecision::Retire;
        }

        IdleDecision::Wait
    }
}

// -----------------------------------------------------------------------------
// Worker

/// The private state of a running worker.
struct Worker<'a> {
    id: usize,
    state: WorkerState,
    last_active: Instant,
    shared: &'a Shared,
}

impl<'a> Worker<'a> {
    fn transition(&mut self, event: WorkerEvent) {
        let next = self.state.on(event);
        debug_assert!(
            next.is_some(),
            "invalid worker transition {:?} on {:?}",
            self.state,
            event
        );
        if let Some(next) = next {
            trace!("worker {} {:?} -> {:?}", self.id, self.state, next);
            self.state = next;
        }
    }

    /// Removes this worker's record from the registry, keeping its join
    /// handle for the pool to reap, and wakes anyone waiting for workers to
    /// exit.
    fn deregister(&self, state: &mut PoolState) {
        if let Some(record) = state.workers.remove(&self.id) {
            state.exited.push(record.handle);
        }
        self.shared.all_exited.notify_all();
    }

    /// Blocks until there is a job to run, or until this worker should leave
    /// the pool (in which case this returns `None`).
    fn next_job(&mut self) -> Option<JobBox> {
        let shared = self.shared;
        let mut state = shared.lock();

        if self.state == WorkerState::Busy {
            self.transition(WorkerEvent::Completed);
            shared.idle_workers.fetch_add(1, Ordering::Relaxed);
        }

        let mut timed_out = false;
        loop {
            let check = IdleCheck {
                mode: state.config.mode(),
                running: state.running,
                queue_empty: state.queue.is_empty(),
                timed_out,
                idle_for: self.last_active.elapsed(),
                idle_timeout: state.config.timings.idle_timeout,
                current_workers: shared.current_workers.load(Ordering::Relaxed),
                initial_workers: state.initial_workers,
            };

            match check.decide() {
                IdleDecision::Take => {
                    let Some(job) = state.queue.pop() else {
                        continue;
                    };
                    shared.queued_tasks.fetch_sub(1, Ordering::Relaxed);
                    shared.idle_workers.fetch_sub(1, Ordering::Relaxed);

                    // Fan out, so other pending jobs don't wait behind us.
                    if !state.queue.is_empty() {
                        shared.not_empty.notify_one();
                    }
                    shared.not_full.notify_one();

                    self.transition(WorkerEvent::Dequeued);
                    return Some(job);
                }
                IdleDecision::Exit => {
                    self.transition(WorkerEvent::Shutdown);
                    self.deregister(&mut state);
                    trace!("worker {} exiting for shutdown", self.id);
                    return None;
                }
                IdleDecision::Retire => {
                    self.transition(WorkerEvent::IdleExpired);
                    shared.current_workers.fetch_sub(1, Ordering::Relaxed);
                    shared.idle_workers.fetch_sub(1, Ordering::Relaxed);
                    self.deregister(&mut state);
                    self.transition(WorkerEvent::Deregistered);
                    debug!(
                        "worker {} retired after {:?} idle",
                        self.id, check.idle_for
                    );
                    return None;
                }
                IdleDecision::Wait => match check.mode {
                    PoolMode::Fixed => {
                        state = shared.wait(&shared.not_empty, state);
                        timed_out = false;
                    }
                    PoolMode::Elastic => {
                        let poll = state.config.timings.idle_poll_interval;
                        (state, timed_out) = shared.wait_timeout(&shared.not_empty, state, poll);
                    }
                },
            }
        }
    }
}

// -----------------------------------------------------------------------------
// Worker thread data

thread_local! {
    /// The pool and id of the worker running on this thread, if any.
    static CURRENT_WORKER: Cell<Option<(*const Shared, usize)>> = const { Cell::new(None) };
}

/// Returns the id of the calling thread if it is a worker of `shared`.
pub(crate) fn current_worker(shared: &Shared) -> Option<usize> {
    CURRENT_WORKER.with(|current| match current.get() {
        Some((pool, id)) if ptr::eq(pool, shared) => Some(id),
        _ => None,
    })
}

// -----------------------------------------------------------------------------
// Main worker loop

/// This is the main loop for a worker thread. It takes jobs from the shared
/// queue and runs them, one at a time, until the worker retires or the pool
/// shuts down.
///
/// Initial workers (`check_in`) report to the pool before taking any work, so
/// that `start` can return once the whole initial population is running.
pub(crate) fn run(shared: Arc<Shared>, id: usize, check_in: bool) {
    let _span = trace_span!("worker", id).entered();
    trace!("starting worker");

    CURRENT_WORKER.with(|current| current.set(Some((Arc::as_ptr(&shared), id))));

    if check_in {
        let mut state = shared.lock();
        state.starting -= 1;
        if state.starting == 0 {
            shared.workers_started.notify_all();
        }
    }

    let mut worker = Worker {
        id,
        state: WorkerState::Idle,
        last_active: Instant::now(),
        shared: &shared,
    };

    while let Some(job) = worker.next_job() {
        // Panics are captured into the task's handle, so this always returns.
        job.execute();
        worker.last_active = Instant::now();
    }

    debug_assert!(worker.state.is_terminal());
    CURRENT_WORKER.with(|current| current.set(None));
    trace!("exiting worker");
}
