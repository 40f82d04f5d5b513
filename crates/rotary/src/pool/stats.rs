use super::WorkerId;
use core::sync::atomic::Ordering;
use portable_atomic::AtomicU64;

/// Live per-worker counters, updated by the worker and by submitters.
#[derive(Debug, Default)]
pub(crate) struct WorkerCounters {
    pub(crate) submitted: AtomicU64,
    pub(crate) executed: AtomicU64,
    pub(crate) panicked: AtomicU64,
    pub(crate) abandoned: AtomicU64,
}

impl WorkerCounters {
    pub(crate) fn snapshot(&self, id: WorkerId, queued: usize) -> WorkerStats {
        WorkerStats {
            id,
            submitted: self.submitted.load(Ordering::Relaxed),
            executed: self.executed.load(Ordering::Relaxed),
            panicked: self.panicked.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
            queued,
        }
    }
}

/// Point-in-time counters for one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct WorkerStats {
    /// The worker these counters belong to.
    pub id: WorkerId,
    /// Runnables successfully enqueued onto this worker.
    pub submitted: u64,
    /// Runnables that ran to completion.
    pub executed: u64,
    /// Runnables that panicked while running. The worker survived each one.
    pub panicked: u64,
    /// Runnables still queued when the worker stopped, dropped unexecuted.
    pub abandoned: u64,
    /// Current queue depth.
    ///
    /// While a [`ShutdownPolicy::Drain`](super::ShutdownPolicy::Drain)
    /// shutdown is pending this includes the stop marker queued behind the
    /// work, so it can exceed the number of runnables by one.
    pub queued: usize,
}

/// Point-in-time counters for the whole pool.
///
/// Counters are read one at a time without a global lock, so a snapshot
/// taken while work is in flight is only approximately consistent.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PoolStats {
    /// Worker threads that have started and not yet exited.
    pub workers_alive: usize,
    pub submitted: u64,
    pub executed: u64,
    pub panicked: u64,
    pub abandoned: u64,
    /// Per-worker breakdown, ordered by worker id.
    pub workers: Vec<WorkerStats>,
}

impl PoolStats {
    pub(crate) fn from_workers(workers_alive: usize, workers: Vec<WorkerStats>) -> Self {
        let mut stats = Self {
            workers_alive,
            submitted: 0,
            executed: 0,
            panicked: 0,
            abandoned: 0,
            workers: Vec::new(),
        };
        for w in &workers {
            stats.submitted += w.submitted;
            stats.executed += w.executed;
            stats.panicked += w.panicked;
            stats.abandoned += w.abandoned;
        }
        stats.workers = workers;
        stats
    }

    /// Runnables that were enqueued and have not yet run, panicked, or been
    /// abandoned.
    pub fn pending(&self) -> u64 {
        self.submitted
            .saturating_sub(self.executed + self.panicked + self.abandoned)
    }
}
