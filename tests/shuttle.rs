//! Tests using the Shuttle testing framework.
//!
//! Each test runs a small pool under many randomized schedules. Shuttle
//! controls every thread, lock and condition variable the pool uses, so these
//! explore interleavings of submission, wake-up and shutdown that are hard to
//! hit with real threads.

#![cfg(feature = "shuttle")]

use shuttle::hint::black_box;
use shuttle::sync::Arc;
use shuttle::sync::atomic::AtomicUsize;
use shuttle::sync::atomic::Ordering;
use shuttle::sync::mpsc;
use tidepool::PoolMode;
use tidepool::TaskError;
use tidepool::ThreadPool;
use tracing::Level;
use tracing_subscriber::fmt::Subscriber;

// -----------------------------------------------------------------------------
// Infrastructure

const ITERATIONS: usize = 200;

/// Runs `f` under randomized schedules, with pool logging routed to the test
/// output.
fn check<F>(f: F)
where
    F: Fn() + Send + Sync + 'static,
{
    let subscriber = Subscriber::builder()
        .compact()
        .with_max_level(Level::DEBUG)
        .with_test_writer()
        .without_time()
        .with_thread_names(false)
        .finish();

    tracing::subscriber::with_default(subscriber, || {
        shuttle::check_random(f, ITERATIONS);
    });
}

// -----------------------------------------------------------------------------
// Lifecycle

/// Starts a single worker and shuts it straight back down.
#[test]
pub fn start_and_shutdown() {
    check(|| {
        let pool = ThreadPool::new();
        pool.start(1).unwrap();
        pool.shutdown();
    });
}

/// Drops a pool which was never started.
#[test]
pub fn drop_unstarted() {
    check(|| {
        let pool = ThreadPool::new();
        let handle = pool.submit(|| black_box(1));
        drop(pool);
        assert_eq!(handle.wait(), Err(TaskError::Abandoned));
    });
}

// -----------------------------------------------------------------------------
// Submission

/// Submits a single task and waits for it.
#[test]
pub fn submit_and_wait() {
    check(|| {
        let pool = ThreadPool::new();
        pool.start(2).unwrap();
        let handle = pool.submit(|| black_box(21) * 2);
        assert_eq!(handle.wait(), Ok(42));
    });
}

/// Shuts down with tasks still queued. All of them must run.
#[test]
pub fn shutdown_drains_queue() {
    check(|| {
        let counter = Arc::new(AtomicUsize::new(0));
        let pool = ThreadPool::new();
        pool.start(2).unwrap();
        for _ in 0..3 {
            let counter = counter.clone();
            let _ = pool.submit(move || counter.fetch_add(1, Ordering::Relaxed));
        }
        pool.shutdown();
        assert_eq!(counter.load(Ordering::Relaxed), 3);
    });
}

/// Submits from several threads into a one-slot queue while the only worker
/// is held, so submitters wait for each other to free a slot.
#[test]
pub fn submitters_contend_for_slots() {
    check(|| {
        let pool = Arc::new(ThreadPool::new());
        pool.set_queue_capacity(1);
        pool.start(1).unwrap();

        let (release, released) = mpsc::channel::<()>();
        let blocker = pool.submit(move || released.recv().unwrap());

        let submitters: Vec<_> = (0..3)
            .map(|i| {
                let pool = pool.clone();
                shuttle::thread::spawn(move || pool.submit(move || i).wait())
            })
            .collect();

        release.send(()).unwrap();
        assert_eq!(blocker.wait(), Ok(()));

        for (i, submitter) in submitters.into_iter().enumerate() {
            match submitter.join().unwrap() {
                Ok(value) => assert_eq!(value, i),
                Err(err) => assert_eq!(err, TaskError::Rejected),
            }
        }
    });
}

// -----------------------------------------------------------------------------
// Elastic scaling

/// Grows an elastic pool and checks it never passes its ceiling.
#[test]
pub fn elastic_respects_ceiling() {
    check(|| {
        let pool = ThreadPool::new();
        pool.set_mode(PoolMode::Elastic);
        pool.set_worker_ceiling(2);
        pool.start(1).unwrap();

        let handles: Vec<_> = (0..3).map(|i| pool.submit(move || black_box(i))).collect();
        assert!(pool.current_workers() <= 2);

        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.wait(), Ok(i));
        }

        let stats = pool.stats();
        assert!(stats.current_workers >= 1 && stats.current_workers <= 2);
        assert_eq!(stats.current_workers, stats.registered_workers);
    });
}
