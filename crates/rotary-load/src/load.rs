//! The synthetic load: async submitters feeding blocking tasks to the pool.

use crate::config::LoadConfig;
use futures::future::try_join_all;
use rotary::{Callable, Completion, Error, PoolStats, RoundRobinExecutor, Runnable, Signal};
use serde::Serialize;
use std::{sync::Arc, thread, time::Duration};

/// How the submitted tasks resolved, as seen by their submitters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Tally {
    pub submitted: usize,
    pub completed: usize,
    pub failed: usize,
    /// Tasks whose completion resolved without a result: they panicked, or
    /// were still queued when the pool stopped.
    pub abandoned: usize,
    /// Tasks still unresolved when the wait timed out.
    pub unresolved: usize,
    pub timed_out: bool,
}

impl Tally {
    fn record(&mut self, outcome: rotary::Result<Signal>) {
        match outcome {
            Ok(Ok(())) => self.completed += 1,
            Ok(Err(e)) => {
                tracing::debug!("Task failed: {e}");
                self.failed += 1;
            }
            Err(Error::Abandoned) => self.abandoned += 1,
            Err(e) => {
                tracing::warn!("Unexpected completion error: {e}");
                self.failed += 1;
            }
        }
    }
}

/// The final report printed by the binary.
#[derive(Debug, Serialize)]
pub struct Report {
    pub elapsed_ms: u128,
    pub interrupted: bool,
    pub tally: Option<Tally>,
    pub stats: PoolStats,
}

impl Report {
    pub fn log(&self) {
        tracing::info!(
            "Finished in {} ms{}",
            self.elapsed_ms,
            if self.interrupted { " (interrupted)" } else { "" }
        );
        if let Some(tally) = &self.tally {
            tracing::info!(
                "Tasks: {} submitted, {} completed, {} failed, {} abandoned, {} unresolved{}",
                tally.submitted,
                tally.completed,
                tally.failed,
                tally.abandoned,
                tally.unresolved,
                if tally.timed_out { " (timed out)" } else { "" }
            );
        }
        let stats = &self.stats;
        tracing::info!(
            "Pool: {} executed, {} panicked, {} abandoned, {} workers alive",
            stats.executed,
            stats.panicked,
            stats.abandoned,
            stats.workers_alive
        );
        for w in &stats.workers {
            tracing::debug!(
                "Worker {}: {} submitted, {} executed, {} panicked, {} abandoned",
                w.id,
                w.submitted,
                w.executed,
                w.panicked,
                w.abandoned
            );
        }
    }
}

/// Builds the blocking task with the given 1-based sequence number.
fn make_task(seq: usize, config: &LoadConfig) -> (impl Runnable, Completion<Signal>) {
    let should_panic = config.should_panic(seq);
    let task_time = config.task_time;
    Callable::from_fn(move || -> Signal {
        if should_panic {
            panic!("injected failure in task {seq}");
        }
        if task_time > Duration::ZERO {
            thread::sleep(task_time);
        }
        Ok(())
    })
}

/// Submits `config.tasks` tasks from `config.submitters` concurrent
/// submitters, then waits up to `config.wait` for all of them to resolve.
///
/// Submitter `s` (0-based) sends the tasks with sequence numbers
/// `s + 1, s + 1 + submitters, ...`.
pub async fn run(
    pool: Arc<RoundRobinExecutor>,
    config: Arc<LoadConfig>,
) -> anyhow::Result<Tally> {
    let submitters = (0..config.submitters).map(|s| {
        let pool = Arc::clone(&pool);
        let config = Arc::clone(&config);
        tokio::spawn(async move {
            let mut completions = Vec::new();
            for seq in (s + 1..=config.tasks).step_by(config.submitters) {
                let (task, done) = make_task(seq, &config);
                pool.submit_async(task).await?;
                completions.push(done);
            }
            tracing::debug!("Submitter {s} sent {} tasks", completions.len());
            Ok::<_, Error>(completions)
        })
    });

    let mut completions = Vec::with_capacity(config.tasks);
    for batch in try_join_all(submitters).await? {
        completions.extend(batch?);
    }

    let mut tally = Tally {
        submitted: completions.len(),
        ..Tally::default()
    };
    tracing::info!("Submitted {} tasks, waiting for completions", tally.submitted);

    let waited = tokio::time::timeout(config.wait, async {
        for done in completions {
            tally.record(done.await);
        }
    })
    .await;

    if waited.is_err() {
        tracing::warn!("Gave up waiting after {:?}", config.wait);
        tally.timed_out = true;
    }
    tally.unresolved = tally.submitted - tally.completed - tally.failed - tally.abandoned;
    Ok(tally)
}
