//! # rotary
//!
//! A fixed-size, round-robin worker pool.
//!
//! [`RoundRobinExecutor`] owns N dedicated worker threads, each with its own
//! bounded queue. Submitted [`Runnable`]s are dealt to workers in strict
//! rotation; a full queue blocks the submitter (backpressure); and the pool
//! stops as a group on [`Executor::shutdown`].
//!
//! Results travel back outside the pool, through the one-shot channel each
//! [`Task`] or [`Callable`] is created with:
//!
//! ```
//! use rotary::{Callable, Executor, RoundRobinExecutor, Signal, Task};
//!
//! let pool = RoundRobinExecutor::new(4, 32)?;
//!
//! let (task, sum) = Task::from_fn(|xs: Vec<u64>| xs.iter().sum::<u64>(), vec![1, 2, 3]);
//! let (job, done) = Callable::from_fn(|| -> Signal { Ok(()) });
//!
//! pool.submit(task)?;
//! pool.submit(job)?;
//!
//! assert_eq!(sum.wait()?, 6);
//! assert!(done.wait()?.is_ok());
//!
//! pool.shutdown()?;
//! # Ok::<(), rotary::Error>(())
//! ```
//!
//! ## Feature flags
//!
//! - `tracing`: emit lifecycle and failure events through `tracing`.
//! - `parking-lot`: use `parking_lot::Mutex` for the lifecycle lock.
//! - `serde`: derive `Serialize` for [`PoolStats`] and [`WorkerStats`].

mod callable;
mod error;
mod executor;
mod mutex;
pub mod pool;
mod promise;
mod runnable;
mod task;

pub use crate::callable::*;
pub use crate::error::*;
pub use crate::executor::*;
pub use crate::pool::{
    PoolConfig, PoolStats, RoundRobinExecutor, ShutdownPolicy, WorkerId, WorkerStats,
    current_worker,
};
pub use crate::promise::*;
pub use crate::runnable::*;
pub use crate::task::*;
