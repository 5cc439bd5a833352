use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;

use emberd::server::pool::{Task, WorkerPool};
use emberd::server::queue::{BoundedTaskQueue, PushError};

enum Job {
    Count(Arc<AtomicUsize>),
    Block {
        started: Sender<()>,
        release: Receiver<()>,
    },
    Panic,
}

impl Task for Job {
    fn run(self) {
        match self {
            Job::Count(counter) => {
                counter.fetch_add(1, Ordering::SeqCst);
            }
            Job::Block { started, release } => {
                let _ = started.send(());
                let _ = release.recv();
            }
            Job::Panic => panic!("job failed"),
        }
    }
}

/// Occupies the only worker of `pool` until the returned sender is used or
/// dropped.
fn occupy_worker(pool: &WorkerPool<Job>) -> Sender<()> {
    let (started_tx, started_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    assert!(
        pool.submit(Job::Block {
            started: started_tx,
            release: release_rx,
        })
        .is_ok()
    );
    started_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("worker picked up blocking job");
    release_tx
}

#[test]
fn test_queue_is_fifo() {
    let queue = BoundedTaskQueue::new(4);
    queue.push(1).unwrap();
    queue.push(2).unwrap();
    queue.push(3).unwrap();

    assert_eq!(queue.len(), 3);
    assert_eq!(queue.pop(), Some(1));
    assert_eq!(queue.try_pop(), Some(2));
    assert_eq!(queue.pop(), Some(3));
    assert!(queue.is_empty());
    assert_eq!(queue.try_pop(), None);
}

#[test]
fn test_queue_rejects_when_full() {
    let queue = BoundedTaskQueue::new(2);
    queue.push("a").unwrap();
    queue.push("b").unwrap();

    match queue.push("c") {
        Err(PushError::Full(task)) => assert_eq!(task, "c"),
        other => panic!("expected Full, got {other:?}"),
    }
    assert_eq!(queue.len(), queue.capacity());
}

#[test]
fn test_queue_close_drains_then_ends() {
    let queue = BoundedTaskQueue::new(4);
    queue.push(10).unwrap();
    queue.close();

    assert!(queue.is_closed());
    assert!(matches!(queue.push(11), Err(PushError::Closed(11))));
    assert_eq!(queue.pop(), Some(10));
    assert_eq!(queue.pop(), None);
}

#[test]
fn test_queue_pop_wakes_on_push() {
    let queue = Arc::new(BoundedTaskQueue::new(1));
    let consumer = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || queue.pop())
    };

    thread::sleep(Duration::from_millis(50));
    queue.push(42).unwrap();
    assert_eq!(consumer.join().unwrap(), Some(42));
}

#[test]
fn test_queue_close_wakes_idle_consumers() {
    let queue: Arc<BoundedTaskQueue<u8>> = Arc::new(BoundedTaskQueue::new(1));
    let consumers: Vec<_> = (0..3)
        .map(|_| {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.pop())
        })
        .collect();

    thread::sleep(Duration::from_millis(50));
    queue.close();
    for consumer in consumers {
        assert_eq!(consumer.join().unwrap(), None);
    }
}

#[test]
fn test_pool_runs_every_task_once() {
    let counter = Arc::new(AtomicUsize::new(0));
    let mut pool = WorkerPool::new(4, 256).unwrap();
    assert_eq!(pool.worker_count(), 4);

    for _ in 0..200 {
        assert!(pool.submit(Job::Count(Arc::clone(&counter))).is_ok());
    }
    pool.shutdown();

    assert_eq!(counter.load(Ordering::SeqCst), 200);
}

#[test]
fn test_pool_rejects_when_queue_full() {
    let counter = Arc::new(AtomicUsize::new(0));
    let mut pool = WorkerPool::new(1, 1).unwrap();
    let release = occupy_worker(&pool);

    assert!(pool.submit(Job::Count(Arc::clone(&counter))).is_ok());
    assert_eq!(pool.queued(), 1);

    let rejected = pool.submit(Job::Count(Arc::clone(&counter)));
    assert!(matches!(rejected, Err(Job::Count(_))));

    release.send(()).unwrap();
    pool.shutdown();
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[test]
fn test_pool_shutdown_drains_queued_tasks() {
    let counter = Arc::new(AtomicUsize::new(0));
    let mut pool = WorkerPool::new(1, 16).unwrap();
    let release = occupy_worker(&pool);

    for _ in 0..5 {
        assert!(pool.submit(Job::Count(Arc::clone(&counter))).is_ok());
    }
    drop(release);
    pool.shutdown();

    assert_eq!(counter.load(Ordering::SeqCst), 5);
    assert_eq!(pool.worker_count(), 0);
}

#[test]
fn test_pool_submit_after_shutdown_is_rejected() {
    let counter = Arc::new(AtomicUsize::new(0));
    let mut pool = WorkerPool::new(2, 4).unwrap();
    pool.shutdown();

    assert!(pool.submit(Job::Count(Arc::clone(&counter))).is_err());
    assert_eq!(counter.load(Ordering::SeqCst), 0);
}

#[test]
fn test_pool_survives_panicking_task() {
    let counter = Arc::new(AtomicUsize::new(0));
    let mut pool = WorkerPool::new(1, 16).unwrap();

    assert!(pool.submit(Job::Panic).is_ok());
    assert!(pool.submit(Job::Panic).is_ok());
    assert!(pool.submit(Job::Count(Arc::clone(&counter))).is_ok());

    // The single worker is still alive and blocks the next job.
    let release = occupy_worker(&pool);
    drop(release);
    pool.shutdown();

    assert_eq!(counter.load(Ordering::SeqCst), 1);
}
