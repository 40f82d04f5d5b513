//! Round-robin dispatch over a fixed set of worker threads.
//!
//! This module defines [`RoundRobinExecutor`], which owns N worker threads,
//! each listening on its own bounded [`mpsc::Receiver`]. Submitted runnables
//! are assigned to workers in strict rotation `1..=N, 1..=N, ...` and a full
//! queue blocks the submitter until the worker frees a slot.
//!
//! The rotation cursor is an atomic index into the fixed array of worker
//! queues. A submitter takes its ticket (read and advance in one step) and
//! then performs the possibly blocking enqueue without holding any lock, so a
//! submitter stalled on one full queue never delays submissions to the other
//! workers.

use super::{
    PoolConfig, PoolStats, ShutdownPolicy, WorkerId,
    stats::WorkerCounters,
    worker::{self, Message, WorkerContext},
};
use crate::{
    Error, Executor, Result, Runnable,
    mutex::{Mutex, lock},
};
use core::{
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
    time::Duration,
};
use crossbeam_utils::CachePadded;
use std::{
    sync::Arc,
    thread::{self, JoinHandle},
};
use tokio::sync::{mpsc, oneshot};
#[cfg(feature = "tracing")]
use tracing::instrument;

/// How long `shutdown` sleeps between checks for in-flight submissions.
const ADMISSION_POLL: Duration = Duration::from_millis(1);

/// State shared between the executor handle and its worker threads.
pub(crate) struct Shared {
    /// Set once shutdown begins; later submissions are refused.
    closed: AtomicBool,
    /// Submissions that passed admission and have not finished enqueueing.
    submitting: AtomicUsize,
    /// Worker threads currently inside their loop.
    pub(crate) alive: AtomicUsize,
    counters: Box<[CachePadded<WorkerCounters>]>,
}

impl Shared {
    fn new(workers: usize) -> Self {
        Self {
            closed: AtomicBool::new(false),
            submitting: AtomicUsize::new(0),
            alive: AtomicUsize::new(0),
            counters: (0..workers).map(|_| CachePadded::default()).collect(),
        }
    }

    pub(crate) fn counters(&self, id: WorkerId) -> &WorkerCounters {
        &self.counters[id.index()]
    }

    /// Registers an in-flight submission, refusing it if shutdown has begun.
    ///
    /// The increment happens before the check so that `shutdown`, which sets
    /// `closed` before waiting for `submitting` to reach zero, either sees
    /// this submission or this submission sees `closed`.
    fn admit(&self) -> Result<Admission<'_>> {
        self.submitting.fetch_add(1, Ordering::SeqCst);
        let admission = Admission(&self.submitting);
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Shutdown);
        }
        Ok(admission)
    }
}

struct Admission<'a>(&'a AtomicUsize);

impl Drop for Admission<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

struct Lifecycle {
    terminated: bool,
    stops: Vec<oneshot::Sender<()>>,
    handles: Vec<JoinHandle<()>>,
}

/// A fixed-size pool of worker threads fed in round-robin order.
///
/// Each worker owns a bounded FIFO queue. Runnables land on worker
/// `((i - 1) mod N) + 1` for the i-th submission (counting across all
/// submitters in the order they take their ticket), and run in enqueue order
/// within a worker. There is no ordering across workers.
///
/// ## Backpressure
///
/// [`submit`](Self::submit) blocks while the chosen worker's queue is full;
/// [`submit_async`](Self::submit_async) waits asynchronously. There is no
/// timeout and no load shedding. Callers that need bounded waiting wrap
/// `submit_async` in their own timer.
///
/// ## Shutdown
///
/// [`shutdown`](Executor::shutdown) refuses new work, lets in-flight
/// submissions finish enqueueing, stops every worker according to the
/// configured [`ShutdownPolicy`], and joins all worker threads. It is
/// idempotent: later calls return `Ok(())` immediately. Submissions after
/// shutdown began fail with [`Error::Shutdown`]. Dropping the executor shuts
/// it down.
///
/// Shutdown must not be called from inside one of the pool's own runnables,
/// as the worker would wait on itself; that call is rejected.
///
/// # Example
/// ```
/// use rotary::{Executor, RoundRobinExecutor, Task};
///
/// let pool = RoundRobinExecutor::new(4, 16).unwrap();
/// let (task, answer) = Task::from_fn(|n: u32| n + 1, 41);
/// pool.submit(task).unwrap();
/// assert_eq!(answer.wait().unwrap(), 42);
/// pool.shutdown().unwrap();
/// ```
pub struct RoundRobinExecutor {
    queues: Vec<mpsc::Sender<Message>>,
    next_worker: AtomicUsize,
    shared: Arc<Shared>,
    lifecycle: Mutex<Lifecycle>,
    config: PoolConfig,
}

impl RoundRobinExecutor {
    /// Creates a pool of `workers` threads, each with a queue holding up to
    /// `queue_capacity` runnables.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if either argument is zero.
    /// - [`Error::Spawn`] if a worker thread could not be started.
    pub fn new(workers: usize, queue_capacity: usize) -> Result<Self> {
        Self::with_config(PoolConfig::new(workers, queue_capacity))
    }

    /// Creates a pool from a full [`PoolConfig`].
    ///
    /// Returns once every worker is running, so [`stats`](Self::stats)
    /// reports `workers_alive == config.workers` right away.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if [`PoolConfig::validate`] fails.
    /// - [`Error::Spawn`] if a worker thread could not be started. Workers
    ///   started before the failure are stopped and joined.
    pub fn with_config(config: PoolConfig) -> Result<Self> {
        config.validate()?;

        let shared = Arc::new(Shared::new(config.workers));
        let pool_key = Arc::as_ptr(&shared) as usize;
        let mut queues = Vec::with_capacity(config.workers);
        let mut stops = Vec::with_capacity(config.workers);
        let mut handles = Vec::with_capacity(config.workers);
        let mut readies = Vec::with_capacity(config.workers);

        for index in 0..config.workers {
            let id = WorkerId::from_index(index);
            let (tx, rx) = mpsc::channel(config.queue_capacity);
            let (stop_tx, stop_rx) = oneshot::channel();
            let (ready_tx, ready_rx) = oneshot::channel();

            let ctx = WorkerContext {
                id,
                pool_key,
                queue: rx,
                stop: stop_rx,
                ready: ready_tx,
                shared: Arc::clone(&shared),
            };

            match worker::spawn(ctx, &config) {
                Ok(handle) => {
                    queues.push(tx);
                    stops.push(stop_tx);
                    handles.push(handle);
                    readies.push(ready_rx);
                }
                Err(e) => {
                    #[cfg(feature = "tracing")]
                    tracing::error!("Failed to spawn worker {id}: {e}");

                    // Dropping the stop senders releases the started workers.
                    drop(stops);
                    drop(queues);
                    for handle in handles {
                        let _ = handle.join();
                    }
                    return Err(Error::Spawn(e));
                }
            }
        }

        futures::executor::block_on(async {
            for ready in readies {
                // An error means the worker exited before reporting ready,
                // which only happens if its thread was torn down early.
                let _ = ready.await;
            }
        });

        #[cfg(feature = "tracing")]
        tracing::info!(
            "Started {} workers with queue capacity {}",
            config.workers,
            config.queue_capacity
        );

        Ok(Self {
            queues,
            next_worker: AtomicUsize::new(0),
            shared,
            lifecycle: Mutex::new(Lifecycle {
                terminated: false,
                stops,
                handles,
            }),
            config,
        })
    }

    /// Number of workers in the pool.
    pub fn num_workers(&self) -> usize {
        self.queues.len()
    }

    /// Capacity of each worker's queue.
    pub fn queue_capacity(&self) -> usize {
        self.config.queue_capacity
    }

    /// The configuration this pool was built from.
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Returns `true` once shutdown has begun.
    pub fn is_shutdown(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Submissions currently between admission and a completed enqueue.
    #[cfg(test)]
    pub(crate) fn in_flight(&self) -> usize {
        self.shared.submitting.load(Ordering::SeqCst)
    }

    /// Takes the next rotation ticket and returns the worker slot it maps to.
    ///
    /// Read and advance happen in a single atomic step, so concurrent callers
    /// each receive a distinct consecutive slot.
    fn next_worker_index(&self) -> usize {
        let n = self.queues.len();
        match self
            .next_worker
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |i| Some((i + 1) % n))
        {
            Ok(index) | Err(index) => index,
        }
    }

    /// Submits `runnable` to the next worker in rotation, blocking while that
    /// worker's queue is full.
    ///
    /// Returns the id of the worker the runnable was assigned to.
    ///
    /// Do not call this from inside an async runtime; use
    /// [`submit_async`](Self::submit_async) there.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Shutdown`] if shutdown has begun. The runnable is
    /// dropped.
    pub fn submit<R: Runnable>(&self, runnable: R) -> Result<WorkerId> {
        self.dispatch(Box::new(runnable))
    }

    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip_all))]
    fn dispatch(&self, runnable: Box<dyn Runnable>) -> Result<WorkerId> {
        let _admission = self.shared.admit()?;
        let index = self.next_worker_index();
        futures::executor::block_on(self.queues[index].send(Message::Run(runnable)))
            .map_err(|_| Error::Shutdown)?;
        Ok(self.accepted(index))
    }

    /// Async counterpart of [`submit`](Self::submit).
    ///
    /// The rotation ticket is taken when the future is first polled. If the
    /// future is dropped while waiting for queue space the runnable is not
    /// enqueued, but the ticket is not returned either.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Shutdown`] if shutdown has begun.
    pub async fn submit_async<R: Runnable>(&self, runnable: R) -> Result<WorkerId> {
        let _admission = self.shared.admit()?;
        let index = self.next_worker_index();
        self.queues[index]
            .send(Message::Run(Box::new(runnable)))
            .await
            .map_err(|_| Error::Shutdown)?;
        Ok(self.accepted(index))
    }

    fn accepted(&self, index: usize) -> WorkerId {
        let id = WorkerId::from_index(index);
        self.shared
            .counters(id)
            .submitted
            .fetch_add(1, Ordering::Relaxed);
        id
    }

    /// Shuts the pool down with an explicit [`ShutdownPolicy`], overriding the
    /// configured one.
    ///
    /// Phases:
    /// 1. Refuse new submissions.
    /// 2. Wait for in-flight submissions to finish enqueueing.
    /// 3. Stop every worker: a stop signal for [`ShutdownPolicy::Abandon`], a
    ///    stop marker behind the queued work for [`ShutdownPolicy::Drain`].
    /// 4. Join every worker thread.
    ///
    /// A second call, or one that raced with the first, returns `Ok(())` once
    /// the pool has terminated.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] when called from one of the pool's own
    ///   workers.
    /// - [`Error::WorkerPanicked`] if a worker thread died outside of a
    ///   runnable. All other workers are still joined.
    /// - [`Error::LockPoisoned`] if the lifecycle lock was poisoned.
    pub fn shutdown_with(&self, policy: ShutdownPolicy) -> Result<()> {
        if worker::is_worker_of(Arc::as_ptr(&self.shared) as usize) {
            return Err(Error::invalid(
                "shutdown cannot be called from one of the pool's own workers",
            ));
        }

        let mut lifecycle = lock(&self.lifecycle)?;
        if lifecycle.terminated {
            #[cfg(feature = "tracing")]
            tracing::trace!("Worker pool already shut down");
            return Ok(());
        }

        // === Phase 1: Stop accepting new submissions ===
        #[cfg(feature = "tracing")]
        tracing::info!("Refusing new submissions ({policy:?})");
        self.shared.closed.store(true, Ordering::SeqCst);

        // === Phase 2: Let in-flight submissions land ===
        while self.shared.submitting.load(Ordering::SeqCst) > 0 {
            thread::sleep(ADMISSION_POLL);
        }

        // === Phase 3: Notify workers ===
        match policy {
            ShutdownPolicy::Abandon => {
                #[cfg(feature = "tracing")]
                tracing::debug!("Sending stop signal to all workers");
                for (_i, stop) in lifecycle.stops.drain(..).enumerate() {
                    if stop.send(()).is_err() {
                        #[cfg(feature = "tracing")]
                        tracing::warn!("Worker {} exited before its stop signal", _i + 1);
                    }
                }
            }
            ShutdownPolicy::Drain => {
                #[cfg(feature = "tracing")]
                tracing::debug!("Queueing drain marker behind pending work");
                for (_i, queue) in self.queues.iter().enumerate() {
                    if futures::executor::block_on(queue.send(Message::Drain)).is_err() {
                        #[cfg(feature = "tracing")]
                        tracing::warn!("Worker {} exited before its drain marker", _i + 1);
                    }
                }
            }
        }

        // === Phase 4: Wait for every worker to exit ===
        let mut result = Ok(());
        for (i, handle) in lifecycle.handles.drain(..).enumerate() {
            if handle.join().is_err() {
                let worker = WorkerId::from_index(i);
                #[cfg(feature = "tracing")]
                tracing::error!("Worker {worker} panicked outside of a runnable");
                if result.is_ok() {
                    result = Err(Error::WorkerPanicked { worker });
                }
            }
        }
        lifecycle.stops.clear();
        lifecycle.terminated = true;

        #[cfg(feature = "tracing")]
        tracing::info!("Worker pool shutdown complete");

        result
    }

    /// Takes a snapshot of the pool's counters.
    pub fn stats(&self) -> PoolStats {
        let workers = self
            .queues
            .iter()
            .enumerate()
            .map(|(index, queue)| {
                let id = WorkerId::from_index(index);
                let queued = queue.max_capacity() - queue.capacity();
                self.shared.counters(id).snapshot(id, queued)
            })
            .collect();
        PoolStats::from_workers(self.shared.alive.load(Ordering::SeqCst), workers)
    }
}

impl Executor for RoundRobinExecutor {
    fn execute(&self, runnable: Box<dyn Runnable>) -> Result<()> {
        self.dispatch(runnable).map(|_| ())
    }

    fn shutdown(&self) -> Result<()> {
        self.shutdown_with(self.config.shutdown_policy)
    }
}

impl Drop for RoundRobinExecutor {
    fn drop(&mut self) {
        if let Err(_e) = self.shutdown_with(self.config.shutdown_policy) {
            #[cfg(feature = "tracing")]
            tracing::error!("Error shutting down worker pool on drop: {_e}");
        }
    }
}

impl core::fmt::Debug for RoundRobinExecutor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RoundRobinExecutor")
            .field("workers", &self.queues.len())
            .field("queue_capacity", &self.config.queue_capacity)
            .field("shutdown", &self.is_shutdown())
            .finish_non_exhaustive()
    }
}
