//! Bounded FIFO task queue shared by producers and the worker

use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::sync::futures::Notified;
use tokio::sync::Notify;
use tracing::warn;

use super::task::Task;

/// What happened to a pushed task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// Queued after dropping the oldest waiting task
    ShedOldest,
    /// The queue no longer accepts tasks
    Closed,
}

struct QueueState {
    tasks: VecDeque<Task>,
    closed: bool,
}

pub struct TaskQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    capacity: usize,
}

impl TaskQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                tasks: VecDeque::new(),
                closed: false,
            }),
            notify: Notify::new(),
            capacity: capacity.max(1),
        }
    }

    /// Enqueue without blocking; sheds the oldest task when full
    pub fn push(&self, task: Task) -> PushOutcome {
        let outcome = {
            let mut state = self.state.lock();
            if state.closed {
                return PushOutcome::Closed;
            }

            let mut outcome = PushOutcome::Queued;
            if state.tasks.len() >= self.capacity {
                if let Some(dropped) = state.tasks.pop_front() {
                    warn!(
                        task = ?dropped,
                        capacity = self.capacity,
                        "task queue full, dropping oldest task"
                    );
                }
                outcome = PushOutcome::ShedOldest;
            }
            state.tasks.push_back(task);
            outcome
        };

        self.notify.notify_one();
        outcome
    }

    pub fn pop(&self) -> Option<Task> {
        self.state.lock().tasks.pop_front()
    }

    /// Stop accepting tasks; queued ones stay and are still drained
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.notify.notify_one();
    }

    /// Append `last` and close in one step.
    ///
    /// `last` is never shed, even past capacity, and nothing can be queued
    /// behind it. Returns `false` if the queue was already closed.
    pub fn close_with(&self, last: Task) -> bool {
        {
            let mut state = self.state.lock();
            if state.closed {
                return false;
            }
            state.tasks.push_back(last);
            state.closed = true;
        }
        self.notify.notify_one();
        true
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn len(&self) -> usize {
        self.state.lock().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().tasks.is_empty()
    }

    /// Wake the worker without queueing anything
    pub fn wake(&self) {
        self.notify.notify_one();
    }

    /// Resolves after the next push, or immediately if one happened since the last wait
    pub fn notified(&self) -> Notified<'_> {
        self.notify.notified()
    }
}
