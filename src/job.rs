//! This module defines an executable unit of work called a [`Job`]. Jobs are
//! what get queued on the thread-pool. A job is a type-erased closure that,
//! when executed, runs user code and writes the outcome into a [`Signal`]
//! shared with the [`TaskHandle`] returned to the submitter.
//!
//! Each job must be resolved exactly once, by being either executed or
//! rejected. A job which is simply dropped resolves its handle as
//! [`TaskError::Abandoned`], so a handle can never wait forever.

use alloc::boxed::Box;
use core::fmt;

use crate::error::TaskError;
use crate::platform::*;
use crate::signal::Signal;
use crate::unwind;

// -----------------------------------------------------------------------------
// Job

/// A job is a unit of work that may be executed by a worker thread.
pub trait Job: Send {
    /// Runs the job, capturing any panic, and resolves its handle with the
    /// outcome.
    fn execute(self: Box<Self>);

    /// Resolves the job's handle with [`TaskError::Rejected`] without running
    /// the job.
    fn reject(self: Box<Self>);
}

/// An owned, type-erased job, as stored in the task queue.
pub type JobBox = Box<dyn Job>;

/// The outcome of a task.
pub type Outcome<T> = Result<T, TaskError>;

// -----------------------------------------------------------------------------
// Heap job

/// A job which owns a closure and the sending side of a result signal.
pub struct HeapJob<F, T>
where
    T: Send,
{
    /// The closure to run. Taken when the job is resolved.
    func: Option<F>,
    /// Where the outcome is written.
    signal: Arc<Signal<Outcome<T>>>,
}

impl<F, T> HeapJob<F, T>
where
    F: FnOnce() -> T + Send,
    T: Send,
{
    /// Allocates a new job, returning it along with the handle through which
    /// its outcome will be observed.
    pub fn new(func: F) -> (Box<Self>, TaskHandle<T>) {
        let signal = Arc::new(Signal::new());
        let handle = TaskHandle {
            signal: signal.clone(),
        };
        let job = Box::new(HeapJob {
            func: Some(func),
            signal,
        });
        (job, handle)
    }

    fn resolve(&mut self, outcome: Outcome<T>) {
        // SAFETY: The job is the only sender for this signal, and every path
        // that resolves the job takes `func` first, so this is reached at
        // most once.
        unsafe { self.signal.send(outcome) };
    }
}

impl<F, T> Job for HeapJob<F, T>
where
    F: FnOnce() -> T + Send,
    T: Send,
{
    fn execute(mut self: Box<Self>) {
        let Some(func) = self.func.take() else {
            return;
        };
        let outcome = unwind::halt_unwinding(func)
            .map_err(|payload| TaskError::Panicked(unwind::payload_message(payload)));
        self.resolve(outcome);
    }

    fn reject(mut self: Box<Self>) {
        if self.func.take().is_some() {
            self.resolve(Err(TaskError::Rejected));
        }
    }
}

impl<F, T> Drop for HeapJob<F, T>
where
    T: Send,
{
    fn drop(&mut self) {
        if self.func.take().is_some() {
            // SAFETY: See `HeapJob::resolve`; `func` was still present, so the
            // signal has not been sent.
            unsafe { self.signal.send(Err(TaskError::Abandoned)) };
        }
    }
}

// -----------------------------------------------------------------------------
// Task handle

/// The caller's side of a submitted task.
///
/// A handle is resolved exactly once, by the worker that runs the task (or by
/// the pool, if the task is shed). Handles are independent: there is no
/// ordering between the completion of different tasks.
#[must_use = "dropping a task handle discards the task's result"]
pub struct TaskHandle<T>
where
    T: Send,
{
    signal: Arc<Signal<Outcome<T>>>,
}

impl<T> TaskHandle<T>
where
    T: Send,
{
    /// Creates a handle which has already been resolved.
    #[cfg(test)]
    pub(crate) fn resolved(outcome: Outcome<T>) -> Self {
        TaskHandle {
            signal: Arc::new(Signal::ready(outcome)),
        }
    }

    /// Returns true if the task has finished (or been rejected), meaning
    /// [`TaskHandle::wait`] will not block.
    #[inline]
    pub fn is_finished(&self) -> bool {
        self.signal.is_sent()
    }

    /// Blocks the calling thread until the task finishes, returning its value
    /// or the reason it failed.
    pub fn wait(self) -> Outcome<T> {
        // SAFETY: The handle is the only receiver for this signal, and `wait`
        // consumes it.
        unsafe { self.signal.recv() }
    }

    /// Returns the outcome of the task if it has finished, or gives the
    /// handle back if it has not.
    pub fn try_wait(self) -> Result<Outcome<T>, Self> {
        // SAFETY: The handle is the only receiver for this signal, and it is
        // consumed whenever a value is returned.
        match unsafe { self.signal.try_recv() } {
            Some(outcome) => Ok(outcome),
            None => Err(self),
        }
    }

    /// Blocks until the task finishes, mapping any failure to the default
    /// value of `T`.
    ///
    /// This reproduces the "shed to zero" behavior of classic pools, where a
    /// rejected task is indistinguishable from one that produced a default
    /// value. Prefer [`TaskHandle::wait`] when the difference matters.
    pub fn wait_or_default(self) -> T
    where
        T: Default,
    {
        self.wait().unwrap_or_default()
    }
}

impl<T> fmt::Debug for TaskHandle<T>
where
    T: Send,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("finished", &self.is_finished())
            .finish()
    }
}

#[cfg(all(test, not(feature = "shuttle")))]
mod tests {
    use super::*;
    use alloc::string::String;
    use std::thread;

    #[test]
    fn execute_resolves_value() {
        let (job, handle) = HeapJob::new(|| 6 * 7);
        assert!(!handle.is_finished());
        let job: JobBox = job;
        job.execute();
        assert!(handle.is_finished());
        assert_eq!(handle.wait(), Ok(42));
    }

    #[test]
    fn execute_captures_panic() {
        let (job, handle) = HeapJob::new(|| -> u32 { panic!("bad input") });
        job.execute();
        assert_eq!(
            handle.wait(),
            Err(TaskError::Panicked(String::from("bad input")))
        );
    }

    #[test]
    fn reject_resolves_rejected() {
        let (job, handle) = HeapJob::new(|| 1_u8);
        job.reject();
        assert_eq!(handle.wait(), Err(TaskError::Rejected));
    }

    #[test]
    fn dropped_job_is_abandoned() {
        let (job, handle) = HeapJob::new(|| 1_u8);
        drop(job);
        assert_eq!(handle.wait(), Err(TaskError::Abandoned));
    }

    #[test]
    fn try_wait_returns_handle_until_ready() {
        let (job, handle) = HeapJob::new(|| "ok");
        let handle = handle.try_wait().unwrap_err();
        job.execute();
        assert_eq!(handle.try_wait().unwrap(), Ok("ok"));
    }

    #[test]
    fn wait_or_default_hides_rejection() {
        let handle = TaskHandle::<i32>::resolved(Err(TaskError::Rejected));
        assert_eq!(handle.wait_or_default(), 0);
    }

    #[test]
    fn handle_waits_across_threads() {
        let (job, handle) = HeapJob::new(|| thread::current().id());
        let job: JobBox = job;
        let runner = thread::spawn(move || {
            let id = thread::current().id();
            job.execute();
            id
        });
        let ran_on = runner.join().unwrap();
        assert_eq!(handle.wait(), Ok(ran_on));
    }
}
