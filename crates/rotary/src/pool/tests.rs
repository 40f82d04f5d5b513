use super::*;
use crate::{Callable, Error, Executor, Promise, Signal, Task};
use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
        mpsc,
    },
    thread,
    time::Duration,
};

/// A runnable that parks its worker until released, plus the handles to
/// observe and release it.
fn gate() -> (impl FnOnce() + Send + 'static, mpsc::Receiver<()>, mpsc::Sender<()>) {
    let (started_tx, started_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let job = move || {
        started_tx.send(()).unwrap();
        let _ = release_rx.recv();
    };
    (job, started_rx, release_tx)
}

#[test]
fn construction_starts_exactly_n_workers() {
    for (workers, capacity) in [(1, 1), (3, 2), (8, 16), (32, 500)] {
        let pool = RoundRobinExecutor::new(workers, capacity).unwrap();
        assert_eq!(pool.num_workers(), workers);
        assert_eq!(pool.queue_capacity(), capacity);
        assert_eq!(pool.stats().workers_alive, workers);
        pool.shutdown().unwrap();
        assert_eq!(pool.stats().workers_alive, 0);
    }
}

#[test]
fn construction_rejects_zero_workers_or_capacity() {
    for (workers, capacity) in [(0, 4), (4, 0), (0, 0)] {
        let err = RoundRobinExecutor::new(workers, capacity).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }), "{err}");
    }
}

#[test]
fn sequential_submissions_rotate_through_workers() {
    const WORKERS: usize = 4;
    let pool = RoundRobinExecutor::new(WORKERS, 16).unwrap();

    let mut completions = Vec::new();
    for i in 1..=WORKERS * 3 {
        let (task, ran_on) = Task::from_fn(|()| current_worker(), ());
        let assigned = pool.submit(task).unwrap();
        assert_eq!(assigned.get(), ((i - 1) % WORKERS) + 1);
        completions.push((assigned, ran_on));
    }

    for (assigned, ran_on) in completions {
        assert_eq!(ran_on.wait().unwrap(), Some(assigned));
    }
}

#[test]
fn runnables_on_one_worker_run_in_submission_order() {
    let pool = RoundRobinExecutor::new(1, 64).unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));

    for i in 0..50 {
        let seen = Arc::clone(&seen);
        pool.submit(move || seen.lock().unwrap().push(i)).unwrap();
    }
    pool.shutdown_with(ShutdownPolicy::Drain).unwrap();

    assert_eq!(*seen.lock().unwrap(), (0..50).collect::<Vec<_>>());
}

#[test]
fn shutdown_returns_after_overfilled_queues() {
    const WORKERS: usize = 2;
    const CAPACITY: usize = 3;
    let pool = RoundRobinExecutor::new(WORKERS, CAPACITY).unwrap();
    let ran = Arc::new(AtomicUsize::new(0));

    let mut completions = Vec::new();
    for _ in 0..WORKERS * CAPACITY + 1 {
        let ran = Arc::clone(&ran);
        let (job, done) = Callable::from_fn(move || -> Signal {
            thread::sleep(Duration::from_millis(5));
            ran.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        pool.submit(job).unwrap();
        completions.push(done);
    }

    pool.shutdown().unwrap();

    let stats = pool.stats();
    assert_eq!(stats.workers_alive, 0);
    assert_eq!(stats.submitted, (WORKERS * CAPACITY + 1) as u64);
    assert_eq!(stats.executed + stats.abandoned, stats.submitted);
    assert_eq!(ran.load(Ordering::SeqCst) as u64, stats.executed);

    // Queued work may have lost the race against the stop signal; every
    // completion still resolves one way or the other.
    let mut completed = 0;
    for done in completions {
        match done.wait() {
            Ok(signal) => {
                signal.unwrap();
                completed += 1;
            }
            Err(Error::Abandoned) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(completed, stats.executed);
}

#[test]
fn many_concurrent_submitters_complete_every_task() {
    const TASKS: usize = 5000;
    const SUBMITTERS: usize = 8;
    let pool = RoundRobinExecutor::new(32, 500).unwrap();
    let counter = Arc::new(AtomicUsize::new(0));

    let completions: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = (0..SUBMITTERS)
            .map(|_| {
                let pool = &pool;
                let counter = &counter;
                s.spawn(move || {
                    (0..TASKS / SUBMITTERS)
                        .map(|_| {
                            let counter = Arc::clone(counter);
                            let (job, done) = Callable::from_fn(move || -> Signal {
                                thread::sleep(Duration::from_millis(1));
                                counter.fetch_add(1, Ordering::SeqCst);
                                Ok(())
                            });
                            pool.submit(job).unwrap();
                            done
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect()
    });

    assert_eq!(completions.len(), TASKS);
    for done in completions {
        done.wait().unwrap().unwrap();
    }
    pool.shutdown().unwrap();

    assert_eq!(counter.load(Ordering::SeqCst), TASKS);
    let stats = pool.stats();
    assert_eq!(stats.executed, TASKS as u64);
    assert_eq!(stats.abandoned, 0);
    // 5000 tickets over 32 workers: every worker got 156 or 157.
    for w in &stats.workers {
        assert!(w.submitted == 156 || w.submitted == 157, "{w:?}");
    }
}

#[test]
fn submissions_after_shutdown_are_rejected() {
    let pool = RoundRobinExecutor::new(2, 4).unwrap();
    pool.shutdown().unwrap();
    assert!(pool.is_shutdown());

    let (task, done) = Task::from_fn(|()| 1, ());
    assert!(matches!(pool.submit(task), Err(Error::Shutdown)));
    assert!(matches!(done.wait(), Err(Error::Abandoned)));
    assert!(matches!(pool.execute(Box::new(|| {})), Err(Error::Shutdown)));
    assert!(matches!(pool.spawn(|| {}), Err(Error::Shutdown)));
}

#[test]
fn repeated_shutdown_is_a_no_op() {
    let pool = RoundRobinExecutor::new(3, 4).unwrap();
    pool.shutdown().unwrap();
    pool.shutdown().unwrap();
    pool.shutdown_with(ShutdownPolicy::Drain).unwrap();
}

#[test]
fn concurrent_shutdowns_all_return() {
    let pool = RoundRobinExecutor::new(4, 4).unwrap();
    thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| pool.shutdown().unwrap());
        }
    });
    assert_eq!(pool.stats().workers_alive, 0);
}

#[test]
fn panicking_runnable_leaves_worker_running() {
    let pool = RoundRobinExecutor::new(1, 4).unwrap();
    fn fail() {
        panic!("runnable failure")
    }

    pool.submit(fail).unwrap();

    let (task, done) = Task::from_fn(|n: u32| n * 2, 21);
    pool.submit(task).unwrap();
    assert_eq!(done.wait().unwrap(), 42);
    assert_eq!(pool.stats().workers_alive, 1);

    // The executed counter moves after `run` returns; drain so the worker is
    // idle before reading it.
    pool.shutdown_with(ShutdownPolicy::Drain).unwrap();
    let stats = pool.stats();
    assert_eq!(stats.panicked, 1);
    assert_eq!(stats.executed, 1);
}

#[test]
fn panicking_task_abandons_its_completion() {
    let pool = RoundRobinExecutor::new(1, 4).unwrap();
    let (task, done) = Task::new(
        |_: (), _out: Promise<u8>| panic!("failed before publishing"),
        (),
    );
    pool.submit(task).unwrap();
    assert!(matches!(done.wait(), Err(Error::Abandoned)));
}

#[test]
fn drain_policy_runs_every_queued_runnable() {
    let pool = RoundRobinExecutor::new(2, 8).unwrap();
    let (job, started, release) = gate();
    pool.submit(job).unwrap();
    started.recv().unwrap();

    let mut completions = Vec::new();
    for i in 0..15_u32 {
        let (task, done) = Task::from_fn(|n: u32| n + 100, i);
        pool.submit(task).unwrap();
        completions.push((i, done));
    }

    thread::scope(|s| {
        s.spawn(|| pool.shutdown_with(ShutdownPolicy::Drain).unwrap());
        thread::sleep(Duration::from_millis(20));
        release.send(()).unwrap();
    });

    for (i, done) in completions {
        assert_eq!(done.wait().unwrap(), i + 100);
    }
    let stats = pool.stats();
    assert_eq!(stats.executed, 16);
    assert_eq!(stats.abandoned, 0);
}

#[test]
fn abandon_policy_resolves_every_completion() {
    let pool = RoundRobinExecutor::new(1, 4).unwrap();
    let (job, started, release) = gate();
    pool.submit(job).unwrap();
    started.recv().unwrap();

    let completions: Vec<_> = (0..4_u32)
        .map(|i| {
            let (task, done) = Task::from_fn(|n: u32| n, i);
            pool.submit(task).unwrap();
            done
        })
        .collect();

    thread::scope(|s| {
        s.spawn(|| pool.shutdown().unwrap());
        thread::sleep(Duration::from_millis(20));
        release.send(()).unwrap();
    });

    let mut ran = 0;
    for done in completions {
        match done.wait() {
            Ok(_) => ran += 1,
            Err(Error::Abandoned) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    let stats = pool.stats();
    assert_eq!(stats.executed, 1 + ran);
    assert_eq!(stats.abandoned, 4 - ran);
}

#[test]
fn full_queue_blocks_the_submitter() {
    let pool = RoundRobinExecutor::new(1, 1).unwrap();
    let (job, started, release) = gate();
    pool.submit(job).unwrap();
    started.recv().unwrap();

    // The worker is busy and its queue is empty: this fills it.
    pool.submit(|| {}).unwrap();

    let submitted = AtomicBool::new(false);
    thread::scope(|s| {
        s.spawn(|| {
            pool.submit(|| {}).unwrap();
            submitted.store(true, Ordering::SeqCst);
        });
        thread::sleep(Duration::from_millis(50));
        assert!(!submitted.load(Ordering::SeqCst), "queue was full");
        release.send(()).unwrap();
    });
    assert!(submitted.load(Ordering::SeqCst));
}

#[test]
fn shutdown_waits_for_blocked_submitters() {
    let pool = RoundRobinExecutor::new(1, 1).unwrap();
    let (job, started, release) = gate();
    pool.submit(job).unwrap();
    started.recv().unwrap();
    pool.submit(|| {}).unwrap();

    let shut_down = AtomicBool::new(false);
    thread::scope(|s| {
        let blocked = s.spawn(|| pool.submit(|| {}));
        while pool.in_flight() == 0 {
            thread::yield_now();
        }

        let closer = s.spawn(|| {
            pool.shutdown().unwrap();
            shut_down.store(true, Ordering::SeqCst);
        });
        while !pool.is_shutdown() {
            thread::yield_now();
        }

        // Admission is closed, but the submission already in flight is not.
        assert!(matches!(pool.submit(|| {}), Err(Error::Shutdown)));
        thread::sleep(Duration::from_millis(20));
        assert!(!shut_down.load(Ordering::SeqCst), "shutdown skipped a submitter");

        release.send(()).unwrap();
        assert_eq!(blocked.join().unwrap().unwrap().get(), 1);
        closer.join().unwrap();
    });
    assert!(shut_down.load(Ordering::SeqCst));

    let stats = pool.stats();
    assert_eq!(stats.submitted, 3);
    assert_eq!(stats.executed + stats.abandoned, stats.submitted);
    assert_eq!(stats.workers_alive, 0);
}

#[test]
fn queue_depth_counts_a_pending_drain_marker() {
    let pool = RoundRobinExecutor::new(1, 4).unwrap();
    let (job, started, release) = gate();
    pool.submit(job).unwrap();
    started.recv().unwrap();
    pool.submit(|| {}).unwrap();
    pool.submit(|| {}).unwrap();
    assert_eq!(pool.stats().workers[0].queued, 2);

    thread::scope(|s| {
        s.spawn(|| pool.shutdown_with(ShutdownPolicy::Drain).unwrap());
        while pool.stats().workers[0].queued < 3 {
            thread::yield_now();
        }
        let stats = pool.stats();
        assert_eq!(stats.workers[0].queued, 3);
        assert_eq!(stats.pending(), 3);
        release.send(()).unwrap();
    });

    let stats = pool.stats();
    assert_eq!(stats.workers[0].queued, 0);
    assert_eq!(stats.executed, 3);
}

#[test]
fn failed_thread_spawn_is_reported() {
    let config = PoolConfig::new(4, 1).with_stack_size(usize::MAX);
    let err = RoundRobinExecutor::with_config(config).unwrap_err();
    assert!(matches!(err, Error::Spawn(_)), "{err}");
}

#[test]
fn oversized_worker_counts_are_rejected_before_allocating() {
    for workers in [MAX_WORKERS + 1, usize::MAX / 2] {
        let err = RoundRobinExecutor::new(workers, 1).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }), "{err}");
    }
}

#[test]
fn blocked_submitter_does_not_stall_other_workers() {
    let pool = RoundRobinExecutor::new(2, 1).unwrap();
    let (job, started, release) = gate();

    assert_eq!(pool.submit(job).unwrap().get(), 1);
    started.recv().unwrap();
    assert_eq!(pool.submit(|| {}).unwrap().get(), 2);
    // Fills worker 1's queue.
    assert_eq!(pool.submit(|| {}).unwrap().get(), 1);
    assert_eq!(pool.submit(|| {}).unwrap().get(), 2);

    thread::scope(|s| {
        let blocked = s.spawn(|| pool.submit(|| {}).unwrap());
        while pool.in_flight() == 0 {
            thread::yield_now();
        }
        thread::sleep(Duration::from_millis(20));

        // Worker 1 is still full, yet the next ticket goes straight to 2.
        assert_eq!(pool.submit(|| {}).unwrap().get(), 2);

        release.send(()).unwrap();
        assert_eq!(blocked.join().unwrap().get(), 1);
    });
}

#[test]
fn shutdown_from_own_worker_is_rejected() {
    let pool = Arc::new(RoundRobinExecutor::new(2, 4).unwrap());
    let inner = Arc::clone(&pool);
    let (task, done) = Task::from_fn(
        move |()| matches!(inner.shutdown(), Err(Error::InvalidArgument { .. })),
        (),
    );
    pool.submit(task).unwrap();
    assert!(done.wait().unwrap());
    assert!(!pool.is_shutdown());
    pool.shutdown().unwrap();
}

#[test]
fn runnables_may_submit_more_work() {
    let pool = Arc::new(RoundRobinExecutor::new(2, 8).unwrap());
    let inner = Arc::clone(&pool);
    let (task, done) = Task::from_fn(
        move |n: u32| {
            let (child, child_done) = Task::from_fn(|n: u32| n + 1, n);
            inner.submit(child).unwrap();
            child_done.wait().unwrap()
        },
        1,
    );
    pool.submit(task).unwrap();
    assert_eq!(done.wait().unwrap(), 2);
    pool.shutdown().unwrap();
}

#[test]
fn dropping_the_pool_shuts_it_down() {
    let ran = Arc::new(AtomicUsize::new(0));
    {
        let pool = RoundRobinExecutor::with_config(
            PoolConfig::new(2, 8).with_shutdown_policy(ShutdownPolicy::Drain),
        )
        .unwrap();
        for _ in 0..6 {
            let ran = Arc::clone(&ran);
            pool.submit(move || {
                thread::sleep(Duration::from_millis(5));
                ran.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }
    }
    assert_eq!(ran.load(Ordering::SeqCst), 6);
}

#[test]
fn workers_are_named_after_the_configured_prefix() {
    let pool = RoundRobinExecutor::with_config(
        PoolConfig::new(2, 2)
            .with_thread_name("ingest")
            .with_stack_size(256 * 1024),
    )
    .unwrap();

    let names: Vec<_> = (0..2)
        .map(|_| {
            let (task, done) =
                Task::from_fn(|()| thread::current().name().map(String::from), ());
            pool.submit(task).unwrap();
            done
        })
        .collect();

    let names: Vec<_> = names.into_iter().map(|d| d.wait().unwrap()).collect();
    assert_eq!(
        names,
        vec![Some(String::from("ingest-1")), Some(String::from("ingest-2"))]
    );
}

#[test]
fn stats_track_per_worker_counters() {
    let pool = RoundRobinExecutor::new(3, 4).unwrap();
    for _ in 0..9 {
        pool.submit(|| {}).unwrap();
    }
    pool.shutdown_with(ShutdownPolicy::Drain).unwrap();

    let stats = pool.stats();
    assert_eq!(stats.workers_alive, 0);
    assert_eq!(stats.pending(), 0);
    for (i, w) in stats.workers.iter().enumerate() {
        assert_eq!(w.id.get(), i + 1);
        assert_eq!(w.submitted, 3);
        assert_eq!(w.executed, 3);
        assert_eq!(w.queued, 0);
    }
}

#[test]
fn executor_trait_objects_dispatch_work() {
    let pool: Arc<dyn Executor + Send + Sync> =
        Arc::new(RoundRobinExecutor::new(2, 4).unwrap());
    let (task, done) = Task::from_fn(|s: &'static str| s.to_uppercase(), "rr");
    pool.execute(Box::new(task)).unwrap();
    assert_eq!(done.wait().unwrap(), "RR");
    pool.shutdown().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn async_submissions_can_be_awaited_with_a_timeout() {
    let pool = Arc::new(RoundRobinExecutor::new(4, 8).unwrap());

    let mut completions = Vec::new();
    for i in 0..100_u64 {
        let (task, done) = Task::from_fn(|n: u64| n * n, i);
        let assigned = pool.submit_async(task).await.unwrap();
        assert_eq!(assigned.get(), (i as usize % 4) + 1);
        completions.push(done);
    }

    let squares = tokio::time::timeout(
        Duration::from_secs(10),
        futures::future::try_join_all(completions),
    )
    .await
    .expect("completions timed out")
    .unwrap();
    assert_eq!(squares, (0..100_u64).map(|n| n * n).collect::<Vec<_>>());

    let closer = Arc::clone(&pool);
    tokio::task::spawn_blocking(move || closer.shutdown())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(pool.submit_async(|| {}).await, Err(Error::Shutdown)));
}
