//! Worker threads and their event loop.
//!
//! Each worker is a dedicated OS thread bound to one bounded inbound queue and
//! one single-use stop signal. It sits in a two-state machine:
//!
//! - **Waiting**: blocked until either the next [`Message`] arrives or the
//!   stop signal fires.
//! - **Stopped**: terminal. The queue is closed, anything still in it is
//!   dropped and counted as abandoned, and the thread exits.
//!
//! When a message and the stop signal are ready at the same time the choice
//! between them is random (the `tokio::select!` default). This is the
//! stop-vs-work race that [`ShutdownPolicy::Abandon`] exposes; use
//! [`ShutdownPolicy::Drain`] when queued work must run.
//!
//! Runnables execute synchronously on the worker thread, outside of any async
//! executor, so they are free to block or to submit more work.
//!
//! [`ShutdownPolicy::Abandon`]: super::ShutdownPolicy::Abandon
//! [`ShutdownPolicy::Drain`]: super::ShutdownPolicy::Drain

use super::{PoolConfig, Shared, stats::WorkerCounters};
use crate::Runnable;
use core::{any::Any, cell::Cell, fmt, sync::atomic::Ordering};
use std::{
    io,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    thread::{self, JoinHandle},
};
use tokio::sync::{mpsc, oneshot};

/// Identifier of a worker within its pool, in `1..=N`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize), serde(transparent))]
pub struct WorkerId(usize);

impl WorkerId {
    /// Converts a zero-based slot index into a worker id.
    pub(crate) const fn from_index(index: usize) -> Self {
        Self(index + 1)
    }

    pub(crate) const fn index(self) -> usize {
        self.0 - 1
    }

    /// Returns the numeric id, starting at 1.
    pub const fn get(self) -> usize {
        self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

thread_local! {
    static CURRENT: Cell<Option<(usize, WorkerId)>> = const { Cell::new(None) };
}

/// Returns the id of the worker running the current thread, if any.
///
/// Inside a runnable this tells which worker it was dispatched to.
///
/// # Example
/// ```
/// use rotary::{RoundRobinExecutor, Task, current_worker};
///
/// let pool = RoundRobinExecutor::new(2, 8).unwrap();
/// let (task, done) = Task::from_fn(|()| current_worker(), ());
/// let assigned = pool.submit(task).unwrap();
/// assert_eq!(done.wait().unwrap(), Some(assigned));
/// assert_eq!(current_worker(), None);
/// ```
pub fn current_worker() -> Option<WorkerId> {
    CURRENT.with(|c| c.get().map(|(_, id)| id))
}

/// Returns `true` if the current thread is one of the workers of the pool
/// identified by `pool_key`.
pub(crate) fn is_worker_of(pool_key: usize) -> bool {
    CURRENT.with(|c| matches!(c.get(), Some((key, _)) if key == pool_key))
}

/// A message delivered through a worker's inbound queue.
pub(crate) enum Message {
    /// Run this unit of work.
    Run(Box<dyn Runnable>),
    /// In-band stop marker: everything enqueued before it has been run.
    Drain,
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Run(_) => f.write_str("Run(..)"),
            Self::Drain => f.write_str("Drain"),
        }
    }
}

enum Event {
    Run(Box<dyn Runnable>),
    Exit(ExitReason),
}

#[derive(Debug, Clone, Copy)]
enum ExitReason {
    Stopped,
    Drained,
    Disconnected,
}

/// Everything a worker thread needs, moved into it at spawn time.
pub(crate) struct WorkerContext {
    pub(crate) id: WorkerId,
    pub(crate) pool_key: usize,
    pub(crate) queue: mpsc::Receiver<Message>,
    pub(crate) stop: oneshot::Receiver<()>,
    pub(crate) ready: oneshot::Sender<()>,
    pub(crate) shared: Arc<Shared>,
}

/// Spawns the worker thread described by `ctx`.
pub(crate) fn spawn(ctx: WorkerContext, config: &PoolConfig) -> io::Result<JoinHandle<()>> {
    let mut builder = thread::Builder::new().name(format!("{}-{}", config.thread_name, ctx.id));
    if let Some(bytes) = config.stack_size {
        builder = builder.stack_size(bytes);
    }
    builder.spawn(move || worker_loop(ctx))
}

/// Decrements the pool's live-worker count when the thread exits, however it
/// exits.
struct AliveGuard<'a>(&'a Shared);

impl<'a> AliveGuard<'a> {
    fn enter(shared: &'a Shared) -> Self {
        shared.alive.fetch_add(1, Ordering::SeqCst);
        Self(shared)
    }
}

impl Drop for AliveGuard<'_> {
    fn drop(&mut self) {
        self.0.alive.fetch_sub(1, Ordering::SeqCst);
    }
}

fn worker_loop(ctx: WorkerContext) {
    let WorkerContext {
        id,
        pool_key,
        mut queue,
        mut stop,
        ready,
        shared,
    } = ctx;

    let _alive = AliveGuard::enter(&shared);
    CURRENT.with(|c| c.set(Some((pool_key, id))));
    let counters = shared.counters(id);

    #[cfg(feature = "tracing")]
    tracing::trace!("Worker {id} started");
    let _ = ready.send(());

    let _reason = loop {
        match futures::executor::block_on(next_event(&mut queue, &mut stop)) {
            Event::Run(runnable) => run_guarded(id, runnable, counters),
            Event::Exit(reason) => break reason,
        }
    };

    #[cfg(feature = "tracing")]
    tracing::debug!("Worker {id} leaving its loop ({_reason:?})");

    let abandoned = abandon_queued(&mut queue);
    if abandoned > 0 {
        counters.abandoned.fetch_add(abandoned, Ordering::Relaxed);
        #[cfg(feature = "tracing")]
        tracing::warn!("Worker {id} abandoned {abandoned} queued runnables");
    }

    CURRENT.with(|c| c.set(None));

    #[cfg(feature = "tracing")]
    tracing::trace!("Worker {id} stopped");
}

/// Waits for whichever of the two wake-up sources is ready first.
async fn next_event(
    queue: &mut mpsc::Receiver<Message>,
    stop: &mut oneshot::Receiver<()>,
) -> Event {
    tokio::select! {
        message = queue.recv() => match message {
            Some(Message::Run(runnable)) => Event::Run(runnable),
            Some(Message::Drain) => Event::Exit(ExitReason::Drained),
            None => Event::Exit(ExitReason::Disconnected),
        },
        // A dropped stop sender means the pool is gone; treat it like a stop.
        _ = stop => Event::Exit(ExitReason::Stopped),
    }
}

/// Runs one runnable, isolating any panic so the worker survives it.
#[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
fn run_guarded(id: WorkerId, runnable: Box<dyn Runnable>, counters: &WorkerCounters) {
    match panic::catch_unwind(AssertUnwindSafe(move || runnable.run())) {
        Ok(()) => {
            counters.executed.fetch_add(1, Ordering::Relaxed);
        }
        Err(_payload) => {
            counters.panicked.fetch_add(1, Ordering::Relaxed);
            #[cfg(feature = "tracing")]
            tracing::error!(
                "Worker {id} recovered from a panicking runnable: {}",
                panic_message(_payload.as_ref())
            );
        }
    }
}

/// Closes the queue and drops everything still in it, returning how many
/// runnables were discarded. Dropping a runnable drops its promise, which
/// resolves the submitter's completion to `Error::Abandoned`.
fn abandon_queued(queue: &mut mpsc::Receiver<Message>) -> u64 {
    queue.close();
    let mut abandoned = 0;
    while let Ok(message) = queue.try_recv() {
        if let Message::Run(runnable) = message {
            abandoned += 1;
            drop(runnable);
        }
    }
    abandoned
}

#[cfg_attr(not(feature = "tracing"), allow(dead_code))]
fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic payload>"
    }
}
