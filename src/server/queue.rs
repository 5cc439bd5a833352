use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};

/// Why a push was refused. The task is handed back to the caller.
#[derive(Debug)]
pub enum PushError<T> {
    /// The queue already holds `capacity` tasks.
    Full(T),
    /// The queue has been closed for shutdown.
    Closed(T),
}

impl<T> PushError<T> {
    pub fn into_inner(self) -> T {
        match self {
            PushError::Full(task) | PushError::Closed(task) => task,
        }
    }
}

struct State<T> {
    tasks: VecDeque<T>,
    closed: bool,
}

/// Fixed-capacity FIFO shared by one producer side and many consumers.
///
/// Pushing never blocks: a full queue rejects the task. Popping blocks until
/// a task arrives or the queue is closed and drained.
pub struct BoundedTaskQueue<T> {
    state: Mutex<State<T>>,
    available: Condvar,
    capacity: usize,
}

impl<T> BoundedTaskQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(State {
                tasks: VecDeque::with_capacity(capacity.min(1024)),
                closed: false,
            }),
            available: Condvar::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.state.lock().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Enqueues `task` and wakes one waiting consumer.
    pub fn push(&self, task: T) -> Result<(), PushError<T>> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(PushError::Closed(task));
        }
        if state.tasks.len() >= self.capacity {
            return Err(PushError::Full(task));
        }
        state.tasks.push_back(task);
        drop(state);

        self.available.notify_one();
        Ok(())
    }

    /// Takes the oldest task, waiting for one if necessary.
    ///
    /// Returns `None` only once the queue is closed and empty.
    pub fn pop(&self) -> Option<T> {
        let mut state = self.state.lock();
        loop {
            if let Some(task) = state.tasks.pop_front() {
                return Some(task);
            }
            if state.closed {
                return None;
            }
            self.available.wait(&mut state);
        }
    }

    pub fn try_pop(&self) -> Option<T> {
        self.state.lock().tasks.pop_front()
    }

    /// Refuses further pushes and wakes every waiting consumer.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.available.notify_all();
    }
}
