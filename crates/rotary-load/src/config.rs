use anyhow::bail;
use clap::Parser;
use rotary::{PoolConfig, ShutdownPolicy};
use std::time::Duration;

/// Runtime configuration for the `rotary-load` binary.
///
/// Every value can come from a CLI flag or from the environment (including a
/// `.env` file). The defaults reproduce a small but busy pool: a few async
/// submitters pushing thousands of short blocking tasks through bounded
/// queues.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "rotary-load",
    version,
    about = "Drives a round-robin worker pool with synthetic load"
)]
pub struct CliArgs {
    /// Number of worker threads in the pool.
    ///
    /// Defaults to the number of logical CPUs.
    ///
    /// Environment variable: `WORKERS`
    #[arg(long, env = "WORKERS", default_value_t = num_cpus::get())]
    pub workers: usize,

    /// Capacity of each worker's queue.
    ///
    /// Submitters block once the next worker in rotation holds this many
    /// pending tasks.
    ///
    /// Environment variable: `QUEUE_CAPACITY`
    #[arg(long, env = "QUEUE_CAPACITY", default_value_t = 500)]
    pub queue_capacity: usize,

    /// Total number of tasks to submit.
    ///
    /// Environment variable: `TASKS`
    #[arg(long, env = "TASKS", default_value_t = 5000)]
    pub tasks: usize,

    /// Number of concurrent async submitters sharing the pool.
    ///
    /// Environment variable: `SUBMITTERS`
    #[arg(long, env = "SUBMITTERS", default_value_t = 4)]
    pub submitters: usize,

    /// How long each task blocks its worker, in milliseconds.
    ///
    /// Environment variable: `TASK_MILLIS`
    #[arg(long, env = "TASK_MILLIS", default_value_t = 5)]
    pub task_millis: u64,

    /// Make every n-th task panic instead of completing; 0 disables.
    ///
    /// Environment variable: `PANIC_EVERY`
    #[arg(long, env = "PANIC_EVERY", default_value_t = 0)]
    pub panic_every: usize,

    /// How long to wait for all completions before giving up, in seconds.
    ///
    /// Environment variable: `WAIT_SECS`
    #[arg(long, env = "WAIT_SECS", default_value_t = 30)]
    pub wait_secs: u64,

    /// Run every queued task before stopping instead of abandoning it.
    #[arg(long, default_value_t = false)]
    pub drain: bool,

    /// Print the final report as JSON.
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Debug, Clone)]
pub struct LoadConfig {
    pub workers: usize,
    pub queue_capacity: usize,
    pub tasks: usize,
    pub submitters: usize,
    pub task_time: Duration,
    pub panic_every: usize,
    pub wait: Duration,
    pub shutdown_policy: ShutdownPolicy,
    pub json: bool,
}

impl LoadConfig {
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig::new(self.workers, self.queue_capacity)
            .with_thread_name("rotary-load")
            .with_shutdown_policy(self.shutdown_policy)
    }

    /// Returns `true` if the task with the given 1-based sequence number
    /// should panic.
    pub fn should_panic(&self, seq: usize) -> bool {
        self.panic_every > 0 && seq % self.panic_every == 0
    }
}

impl TryFrom<CliArgs> for LoadConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.workers == 0 {
            bail!("WORKERS must be greater than 0");
        }

        if args.queue_capacity == 0 {
            bail!("QUEUE_CAPACITY must be greater than 0");
        }

        if args.submitters == 0 {
            bail!("SUBMITTERS must be greater than 0");
        }

        if args.wait_secs == 0 {
            bail!("WAIT_SECS must be greater than 0");
        }

        let shutdown_policy = if args.drain {
            ShutdownPolicy::Drain
        } else {
            ShutdownPolicy::Abandon
        };

        let config = Self {
            workers: args.workers,
            queue_capacity: args.queue_capacity,
            tasks: args.tasks,
            submitters: args.submitters,
            task_time: Duration::from_millis(args.task_millis),
            panic_every: args.panic_every,
            wait: Duration::from_secs(args.wait_secs),
            shutdown_policy,
            json: args.json,
        };
        config.pool_config().validate()?;
        Ok(config)
    }
}
