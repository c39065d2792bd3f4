//! Error types for scheduler operations.

use thiserror::Error;

/// Errors produced by scheduling operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The wheel or pool has been closed; scheduling after `close()` is a
    /// caller error and is rejected rather than silently accepted.
    #[error("scheduler is closed")]
    Closed,
    /// A calendar field passed to a cron constructor is out of range.
    #[error("invalid cron field: {0}")]
    InvalidCron(String),
}

/// Errors produced when handing a due callback to the dispatcher.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DispatchError {
    /// The pending-callback queue is full; the invocation is dropped.
    #[error("dispatch queue is full")]
    QueueFull,
    /// The dispatcher has been shut down.
    #[error("dispatcher has been shut down")]
    Shutdown,
}
