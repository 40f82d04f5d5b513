//! The round-robin worker pool.
//!
//! ## Structure
//!
//! - [`config`] - construction parameters and shutdown policy.
//! - [`manager`] - [`RoundRobinExecutor`]: dispatch, backpressure, lifecycle.
//! - [`worker`] - worker threads and their event loop.
//! - [`stats`] - counters exposed through [`RoundRobinExecutor::stats`].

pub mod config;
pub mod manager;
pub mod stats;
pub mod worker;

pub use config::{
    DEFAULT_QUEUE_CAPACITY, DEFAULT_THREAD_NAME, MAX_WORKERS, PoolConfig, ShutdownPolicy,
};
pub use manager::RoundRobinExecutor;
pub(crate) use manager::Shared;
pub use stats::{PoolStats, WorkerStats};
pub use worker::{WorkerId, current_worker};

#[cfg(test)]
mod tests;
