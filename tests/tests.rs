//! Integration tests for the public thread pool api, using real threads and
//! the real timing constants.

#![cfg(not(feature = "shuttle"))]

use std::sync::Arc;
use std::sync::Condvar;
use std::sync::Mutex;
use std::sync::mpsc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use tidepool::PoolConfig;
use tidepool::PoolError;
use tidepool::PoolMode;
use tidepool::SUBMIT_TIMEOUT;
use tidepool::TaskError;
use tidepool::ThreadPool;
use tracing::Level;
use tracing_subscriber::fmt::Subscriber;

// -----------------------------------------------------------------------------
// Infrastructure

/// Runs `f` with pool logging routed to the test output.
fn traced<F: FnOnce()>(f: F) {
    let subscriber = Subscriber::builder()
        .with_max_level(Level::DEBUG)
        .with_test_writer()
        .without_time()
        .finish();

    tracing::subscriber::with_default(subscriber, f);
}

/// A latch that holds tasks until the test opens it.
#[derive(Clone, Default)]
struct Gate(Arc<(Mutex<bool>, Condvar)>);

impl Gate {
    fn open(&self) {
        *self.0.0.lock().unwrap() = true;
        self.0.1.notify_all();
    }

    fn wait(&self) {
        let mut open = self.0.0.lock().unwrap();
        while !*open {
            open = self.0.1.wait(open).unwrap();
        }
    }
}

/// Polls `condition` until it holds, or panics after a few seconds.
fn eventually(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "condition never became true");
        thread::sleep(Duration::from_millis(5));
    }
}

// -----------------------------------------------------------------------------
// Lifecycle

#[test]
fn start_spawns_initial_workers() {
    traced(|| {
        let pool = ThreadPool::new();
        assert_eq!(pool.current_workers(), 0);
        pool.start(3).unwrap();

        let stats = pool.stats();
        assert!(stats.running);
        assert_eq!(stats.initial_workers, 3);
        assert_eq!(stats.current_workers, 3);
        assert_eq!(stats.idle_workers, 3);
        assert_eq!(stats.registered_workers, 3);
    });
}

#[test]
fn second_start_is_refused() {
    traced(|| {
        let pool = ThreadPool::new();
        pool.start(1).unwrap();
        assert!(matches!(pool.start(4), Err(PoolError::AlreadyStarted)));
        assert_eq!(pool.current_workers(), 1);
    });
}

#[test]
fn start_available_uses_every_core() {
    let pool = ThreadPool::new();
    let started = pool.start_available().unwrap();
    assert!(started >= 1);
    assert_eq!(pool.current_workers(), started);
}

#[test]
fn setters_are_frozen_after_start() {
    traced(|| {
        let pool = ThreadPool::new();
        assert!(pool.set_mode(PoolMode::Elastic));
        assert!(pool.set_worker_ceiling(8));
        assert!(pool.set_queue_capacity(16));
        pool.start(2).unwrap();

        assert!(!pool.set_mode(PoolMode::Fixed));
        assert!(!pool.set_worker_ceiling(2));
        assert!(!pool.set_queue_capacity(1));

        let config = pool.config();
        assert_eq!(config.mode(), PoolMode::Elastic);
        assert_eq!(config.worker_ceiling(), 8);
        assert_eq!(config.queue_capacity(), 16);
    });
}

#[test]
fn worker_ceiling_needs_elastic_mode() {
    let pool = ThreadPool::new();
    assert!(!pool.set_worker_ceiling(8));
    assert_eq!(pool.config().worker_ceiling(), tidepool::DEFAULT_WORKER_CEILING);
}

#[test]
fn ceiling_below_initial_count_is_raised() {
    let config = PoolConfig::new()
        .with_mode(PoolMode::Elastic)
        .with_worker_ceiling(1);
    let pool = ThreadPool::with_config(config);
    pool.start(3).unwrap();
    assert_eq!(pool.config().worker_ceiling(), 3);
    assert_eq!(pool.current_workers(), 3);
}

#[test]
fn tasks_submitted_before_start_run_after_start() {
    traced(|| {
        let pool = ThreadPool::new();
        let handle = pool.submit(|| "early");
        assert_eq!(pool.queued_tasks(), 1);
        assert!(!handle.is_finished());

        pool.start(1).unwrap();
        assert_eq!(handle.wait(), Ok("early"));
    });
}

#[test]
fn dropping_unstarted_pool_abandons_tasks() {
    let pool = ThreadPool::new();
    let handles: Vec<_> = (0..3).map(|i| pool.submit(move || i)).collect();
    drop(pool);
    for handle in handles {
        assert_eq!(handle.wait(), Err(TaskError::Abandoned));
    }
}

#[test]
fn shutdown_drains_queued_tasks() {
    traced(|| {
        let counter = Arc::new(AtomicUsize::new(0));
        let gate = Gate::default();
        let pool = ThreadPool::new();
        pool.start(2).unwrap();

        for _ in 0..20 {
            let counter = counter.clone();
            let gate = gate.clone();
            let _ = pool.submit(move || {
                gate.wait();
                counter.fetch_add(1, Ordering::Relaxed);
            });
        }
        assert!(pool.queued_tasks() > 0);

        let opener = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            gate.open();
        });
        pool.shutdown();
        opener.join().unwrap();

        assert_eq!(counter.load(Ordering::Relaxed), 20);
    });
}

#[test]
fn task_can_drop_the_last_pool_handle() {
    traced(|| {
        let pool = Arc::new(ThreadPool::new());
        pool.start(1).unwrap();

        let (release, released) = mpsc::channel::<()>();
        let (done, finished) = mpsc::channel();

        let inner = pool.clone();
        let owner = pool.submit(move || {
            released.recv().unwrap();
            // This is the last handle, so the pool shuts down on its own
            // worker.
            drop(inner);
            done.send(()).unwrap();
        });
        // Queued behind the task above, on the only worker.
        let follower = pool.submit(|| "after");

        drop(pool);
        release.send(()).unwrap();

        finished
            .recv_timeout(Duration::from_secs(5))
            .expect("task blocked while shutting down its own pool");
        assert_eq!(owner.wait(), Ok(()));
        assert_eq!(follower.wait(), Ok("after"));
    });
}

#[test]
fn shutdown_of_idle_pool_returns() {
    let pool = ThreadPool::new();
    pool.start(4).unwrap();
    pool.shutdown();
}

// -----------------------------------------------------------------------------
// Submission

#[test]
fn submit_returns_values() {
    let pool = ThreadPool::new();
    pool.start(4).unwrap();

    let handles: Vec<_> = (0..64).map(|i| pool.submit(move || i * 2)).collect();
    for (i, handle) in handles.into_iter().enumerate() {
        assert_eq!(handle.wait(), Ok(i * 2));
    }
}

#[test]
fn submit_with_passes_arguments() {
    let pool = ThreadPool::new();
    pool.start(1).unwrap();

    let handle = pool.submit_with(|(name, n)| str::repeat(name, n), ("ab", 3_usize));
    assert_eq!(handle.wait(), Ok(String::from("ababab")));
}

#[test]
fn single_worker_runs_tasks_in_order() {
    let order = Arc::new(Mutex::new(Vec::new()));
    let pool = ThreadPool::new();
    for i in 0..10 {
        let order = order.clone();
        let _ = pool.submit(move || order.lock().unwrap().push(i));
    }
    pool.start(1).unwrap();
    pool.shutdown();

    assert_eq!(*order.lock().unwrap(), (0..10).collect::<Vec<_>>());
}

#[test]
fn panicking_task_does_not_kill_worker() {
    traced(|| {
        let pool = ThreadPool::new();
        pool.start(1).unwrap();

        let bad = pool.submit(|| -> u32 { panic!("task failed") });
        assert_eq!(
            bad.wait(),
            Err(TaskError::Panicked(String::from("task failed")))
        );

        let good = pool.submit(|| 7);
        assert_eq!(good.wait(), Ok(7));
        assert_eq!(pool.current_workers(), 1);
    });
}

#[test]
fn full_queue_sheds_after_submit_timeout() {
    traced(|| {
        let pool = ThreadPool::new();
        pool.set_queue_capacity(2);
        pool.start(1).unwrap();

        let gate = Gate::default();
        let blocker = {
            let gate = gate.clone();
            pool.submit(move || gate.wait())
        };
        eventually(|| pool.idle_workers() == 0);

        let first = pool.submit(|| 1);
        let second = pool.submit(|| 2);
        assert_eq!(pool.queued_tasks(), 2);

        let submitted = Instant::now();
        let third = pool.submit(|| 3);
        assert!(submitted.elapsed() >= SUBMIT_TIMEOUT);
        assert_eq!(third.wait(), Err(TaskError::Rejected));

        gate.open();
        assert_eq!(blocker.wait(), Ok(()));
        assert_eq!(first.wait(), Ok(1));
        assert_eq!(second.wait(), Ok(2));
    });
}

#[test]
fn shed_task_reads_as_default() {
    let pool = ThreadPool::new();
    pool.set_queue_capacity(1);
    pool.start(1).unwrap();

    let gate = Gate::default();
    let blocker = {
        let gate = gate.clone();
        pool.submit(move || gate.wait())
    };
    eventually(|| pool.idle_workers() == 0);
    let queued = pool.submit(|| 5_u64);
    let shed = pool.submit(|| 9_u64);

    assert_eq!(shed.wait_or_default(), 0);
    gate.open();
    blocker.wait().unwrap();
    assert_eq!(queued.wait_or_default(), 5);
}

// -----------------------------------------------------------------------------
// Sizing

#[test]
fn fixed_pool_never_changes_size() {
    traced(|| {
        let gate = Gate::default();
        let pool = ThreadPool::new();
        pool.start(2).unwrap();

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let gate = gate.clone();
                pool.submit(move || gate.wait())
            })
            .collect();
        assert_eq!(pool.current_workers(), 2);

        gate.open();
        for handle in handles {
            handle.wait().unwrap();
        }
        assert_eq!(pool.current_workers(), 2);
        assert_eq!(pool.stats().registered_workers, 2);
    });
}

#[test]
fn elastic_pool_grows_to_ceiling() {
    traced(|| {
        let gate = Gate::default();
        let pool = ThreadPool::new();
        pool.set_mode(PoolMode::Elastic);
        pool.set_worker_ceiling(4);
        pool.start(2).unwrap();

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let gate = gate.clone();
                pool.submit(move || gate.wait())
            })
            .collect();

        let stats = pool.stats();
        assert!(stats.current_workers > 2);
        assert!(stats.current_workers <= 4);
        assert_eq!(stats.current_workers, stats.registered_workers);

        gate.open();
        for handle in handles {
            handle.wait().unwrap();
        }
        assert!(pool.current_workers() <= 4);
    });
}

#[test]
fn elastic_pool_does_not_grow_when_idle_workers_keep_up() {
    let pool = ThreadPool::new();
    pool.set_mode(PoolMode::Elastic);
    pool.set_worker_ceiling(8);
    pool.start(2).unwrap();

    for i in 0..10 {
        assert_eq!(pool.submit(move || i).wait(), Ok(i));
    }
    assert_eq!(pool.current_workers(), 2);
}
