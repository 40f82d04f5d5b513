use crate::{Error, Result};
use tokio::sync::Semaphore;

/// Default prefix for worker thread names. Threads are named `{prefix}-{id}`.
pub const DEFAULT_THREAD_NAME: &str = "rotary-worker";

/// Default per-worker queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Largest worker count a pool accepts.
pub const MAX_WORKERS: usize = 1 << 16;

/// What [`RoundRobinExecutor::shutdown`](crate::Executor::shutdown) does with
/// runnables that are still queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShutdownPolicy {
    /// Send each worker an out-of-band stop signal.
    ///
    /// A worker that has both queued work and a pending stop signal picks
    /// between them at random, so queued runnables may be dropped without
    /// running. Their completions resolve to
    /// [`Error::Abandoned`](crate::Error::Abandoned).
    #[default]
    Abandon,

    /// Enqueue a stop marker behind the queued work.
    ///
    /// Every runnable accepted before shutdown began runs before its worker
    /// exits.
    Drain,
}

/// Construction parameters for a
/// [`RoundRobinExecutor`](crate::RoundRobinExecutor).
///
/// # Example
/// ```
/// use rotary::{PoolConfig, RoundRobinExecutor, ShutdownPolicy};
///
/// let config = PoolConfig::new(4, 64)
///     .with_thread_name("ingest")
///     .with_shutdown_policy(ShutdownPolicy::Drain);
/// let pool = RoundRobinExecutor::with_config(config).unwrap();
/// assert_eq!(pool.num_workers(), 4);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Number of worker threads. Must be at least 1.
    pub workers: usize,
    /// Bounded capacity of every worker's queue. Must be at least 1.
    pub queue_capacity: usize,
    /// Prefix for worker thread names.
    pub thread_name: String,
    /// Stack size for worker threads; the platform default when `None`.
    pub stack_size: Option<usize>,
    /// Policy applied by `shutdown` and on drop.
    pub shutdown_policy: ShutdownPolicy,
}

impl PoolConfig {
    pub fn new(workers: usize, queue_capacity: usize) -> Self {
        Self {
            workers,
            queue_capacity,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_thread_name(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name = prefix.into();
        self
    }

    #[must_use]
    pub fn with_stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }

    #[must_use]
    pub fn with_shutdown_policy(mut self, policy: ShutdownPolicy) -> Self {
        self.shutdown_policy = policy;
        self
    }

    /// Checks that the configuration describes a pool that can be built.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if:
    /// - `workers` or `queue_capacity` is zero.
    /// - `workers` exceeds [`MAX_WORKERS`].
    /// - `queue_capacity` exceeds the largest bounded queue supported.
    /// - `thread_name` contains a NUL byte.
    /// - `stack_size` is zero.
    pub fn validate(&self) -> Result<()> {
        if self.workers < 1 {
            return Err(Error::invalid("workers must be greater than 0"));
        }
        if self.workers > MAX_WORKERS {
            return Err(Error::invalid(format!(
                "workers ({}) exceeds the maximum of {MAX_WORKERS}",
                self.workers
            )));
        }
        if self.queue_capacity < 1 {
            return Err(Error::invalid("queue_capacity must be greater than 0"));
        }
        if self.queue_capacity > Semaphore::MAX_PERMITS {
            return Err(Error::invalid(format!(
                "queue_capacity ({}) exceeds the maximum of {}",
                self.queue_capacity,
                Semaphore::MAX_PERMITS
            )));
        }
        if self.thread_name.contains('\0') {
            return Err(Error::invalid("thread_name must not contain NUL bytes"));
        }
        if self.stack_size == Some(0) {
            return Err(Error::invalid("stack_size must be greater than 0"));
        }
        Ok(())
    }
}

impl Default for PoolConfig {
    /// One worker per available core, each with [`DEFAULT_QUEUE_CAPACITY`].
    fn default() -> Self {
        Self {
            workers: std::thread::available_parallelism().map_or(1, |n| n.get()),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            thread_name: String::from(DEFAULT_THREAD_NAME),
            stack_size: None,
            shutdown_policy: ShutdownPolicy::default(),
        }
    }
}
