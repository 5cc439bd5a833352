//! Fixed-size worker pool.
//!
//! Workers block on a shared [`BoundedTaskQueue`] and run whatever they pop.
//! The reactor is the only producer; it never waits on the pool.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::error::ServerError;
use crate::server::queue::{BoundedTaskQueue, PushError};

/// A unit of work executed on a worker thread.
pub trait Task: Send + 'static {
    fn run(self);
}

pub struct WorkerPool<T: Task> {
    queue: Arc<BoundedTaskQueue<T>>,
    workers: Vec<JoinHandle<()>>,
}

impl<T: Task> WorkerPool<T> {
    /// Starts `workers` threads sharing a queue of `capacity` tasks.
    ///
    /// If any thread fails to start, the threads already started are
    /// stopped and joined before the error is returned.
    pub fn new(workers: usize, capacity: usize) -> Result<Self, ServerError> {
        Self::with_name(workers, capacity, "emberd-worker")
    }

    pub fn with_name(workers: usize, capacity: usize, name: &str) -> Result<Self, ServerError> {
        let queue = Arc::new(BoundedTaskQueue::new(capacity));
        let mut handles = Vec::with_capacity(workers);

        for index in 0..workers {
            let queue_ref = Arc::clone(&queue);
            let spawned = thread::Builder::new()
                .name(format!("{name}-{index}"))
                .spawn(move || worker_loop(index, queue_ref));

            match spawned {
                Ok(handle) => handles.push(handle),
                Err(source) => {
                    queue.close();
                    for handle in handles {
                        let _ = handle.join();
                    }
                    return Err(ServerError::WorkerSpawn { index, source });
                }
            }
        }

        tracing::info!(workers, capacity, "Worker pool started");

        Ok(Self {
            queue,
            workers: handles,
        })
    }

    /// Queues a task without blocking.
    ///
    /// A full or closed queue hands the task back; the caller decides what
    /// to do with it.
    pub fn submit(&self, task: T) -> Result<(), T> {
        self.queue.push(task).map_err(|e| {
            if let PushError::Full(_) = &e {
                tracing::warn!(capacity = self.queue.capacity(), "Task queue full");
            }
            e.into_inner()
        })
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Closes the queue and waits for the workers to drain it and exit.
    pub fn shutdown(&mut self) {
        self.queue.close();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                tracing::error!("Worker thread panicked");
            }
        }
    }
}

impl<T: Task> Drop for WorkerPool<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop<T: Task>(index: usize, queue: Arc<BoundedTaskQueue<T>>) {
    tracing::debug!(worker = index, "Worker started");
    while let Some(task) = queue.pop() {
        // A panicking task must not shrink the pool.
        if panic::catch_unwind(AssertUnwindSafe(|| task.run())).is_err() {
            tracing::error!(worker = index, "Task panicked");
        }
    }
    tracing::debug!(worker = index, "Worker stopped");
}
