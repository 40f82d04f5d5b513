//! Error types for the worker pool.
//!
//! This module defines the central `Error` enum, which captures every
//! reportable failure of the pool itself. Failures inside user work are never
//! turned into pool errors: a runnable reports them through its own
//! [`Promise`](crate::Promise), or not at all.
//!
//! ## Error Cases
//! - `InvalidArgument`: The pool was configured with a non-positive worker
//!   count or queue capacity. Raised at construction only.
//! - `Shutdown`: Work was submitted after shutdown had begun.
//! - `Abandoned`: A completion was awaited but the producing side went away
//!   without publishing.
//! - `Spawn`: The operating system refused to start a worker thread.
//! - `WorkerPanicked`: A worker thread died outside of a runnable.
//! - `LockPoisoned`: The lifecycle lock was poisoned.

use crate::pool::WorkerId;

pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Unified error type for the worker pool.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The pool configuration was rejected; no pool was created.
    #[error("Invalid argument: {reason}")]
    InvalidArgument { reason: String },

    /// The pool is shutting down or has shut down and accepts no more work.
    #[error("Executor is shut down")]
    Shutdown,

    /// The producer side of a one-shot channel was dropped without a value.
    ///
    /// This is how dropped work surfaces to its submitter: either the pool
    /// discarded a queued runnable at shutdown, or the wrapped function
    /// returned without publishing.
    #[error("Work was abandoned without publishing a result")]
    Abandoned,

    /// A worker thread could not be spawned.
    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),

    /// A worker thread terminated by panicking outside of a runnable.
    #[error("Worker {worker} panicked")]
    WorkerPanicked { worker: WorkerId },

    /// The operation failed due to a poisoned lock.
    ///
    /// This can only happen with the standard library mutex, when another
    /// thread panicked while holding the lifecycle lock.
    #[error("Lock poisoned")]
    LockPoisoned,
}

impl Error {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }
}

#[cfg(not(feature = "parking-lot"))]
impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        Self::LockPoisoned
    }
}
