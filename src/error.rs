//! Error types surfaced by the pool and by task handles.

use alloc::string::String;

/// The ways a submitted task can fail to produce a value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    /// The queue stayed full for longer than the submission timeout, so the
    /// task was shed without running.
    #[error("task queue is full, task was rejected")]
    Rejected,
    /// The task panicked while running. Holds the panic message.
    #[error("task panicked: {0}")]
    Panicked(String),
    /// The task was dropped without ever running. This only happens when the
    /// pool is dropped before it was started.
    #[error("task was dropped before it could run")]
    Abandoned,
}

/// Errors returned by pool lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// `start` was called on a pool which has already been started.
    #[error("thread pool has already been started")]
    AlreadyStarted,
    /// The operating system refused to spawn a worker thread.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}
