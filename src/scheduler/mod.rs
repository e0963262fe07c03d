//! Worker scheduler
//!
//! Producers push [`Task`]s onto a bounded [`TaskQueue`]; a single worker
//! thread drains it in order. The periodic flush timer feeds ordinary
//! `Flush` tasks into the same queue.

mod queue;
mod rate_limit;
mod task;
mod worker;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{error, warn};

pub use queue::{PushOutcome, TaskQueue};
pub use rate_limit::{SdkErrorLimiter, SDK_ERROR_WINDOW_SECS};
pub use task::{Setting, Task};
pub use worker::{Worker, WorkerSettings};

/// Owner side of a running worker
pub struct WorkerHandle {
    queue: Arc<TaskQueue>,
    force_stop: Arc<AtomicBool>,
    /// Taken by the first shutdown
    running: Mutex<Option<(JoinHandle<()>, Receiver<()>)>>,
}

impl WorkerHandle {
    pub(crate) fn new(
        queue: Arc<TaskQueue>,
        force_stop: Arc<AtomicBool>,
        done_rx: Receiver<()>,
        thread: JoinHandle<()>,
    ) -> Self {
        Self {
            queue,
            force_stop,
            running: Mutex::new(Some((thread, done_rx))),
        }
    }

    pub fn push(&self, task: Task) -> PushOutcome {
        self.queue.push(task)
    }

    pub(crate) fn queue(&self) -> &Arc<TaskQueue> {
        &self.queue
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Ask the worker to finish queued work and stop.
    ///
    /// Returns `true` if the worker exited within `drain_timeout`. Otherwise
    /// the worker is told to stop after its current task and is detached.
    pub fn shutdown(&self, drain_timeout: Duration) -> bool {
        let Some((thread, done_rx)) = self.running.lock().take() else {
            return true;
        };

        if !self.queue.close_with(Task::Shutdown) {
            warn!("task queue was already closed before shutdown");
        }

        match done_rx.recv_timeout(drain_timeout) {
            Ok(()) => {
                if thread.join().is_err() {
                    error!("telemetry worker panicked during shutdown");
                }
                true
            }
            Err(RecvTimeoutError::Disconnected) => {
                let _ = thread.join();
                error!("telemetry worker exited unexpectedly");
                false
            }
            Err(RecvTimeoutError::Timeout) => {
                self.force_stop.store(true, Ordering::SeqCst);
                self.queue.wake();
                warn!(
                    timeout_ms = drain_timeout.as_millis() as u64,
                    "telemetry worker did not drain in time, detaching it"
                );
                false
            }
        }
    }
}
