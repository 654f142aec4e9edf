//! Worker pool for subsystem initialization and parallel AI dispatch
//!
//! Thin layer over a `rayon::ThreadPool` that adds result handles, panic
//! capture at the task boundary, and a pending-task barrier so shutdown can
//! drain the pool with a deadline instead of polling.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, TryRecvError};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

#[derive(Debug, Clone, thiserror::Error)]
pub enum ThreadPoolError {
    #[error("failed to build worker pool: {0}")]
    Build(String),
    #[error("thread pool is shut down")]
    ShutDown,
    #[error("{pending} task(s) still pending after {timeout:?}")]
    DrainTimeout { pending: usize, timeout: Duration },
}

/// Why a task produced no value
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    #[error("task panicked: {0}")]
    Panicked(String),
    #[error("task was dropped before completing")]
    Disconnected,
    #[error("task did not finish within {0:?}")]
    TimedOut(Duration),
}

/// Future-like handle for a task's result
#[derive(Debug)]
pub struct TaskHandle<T> {
    receiver: Receiver<Result<T, TaskError>>,
}

impl<T> TaskHandle<T> {
    /// Block until the task finishes
    pub fn wait(self) -> Result<T, TaskError> {
        self.receiver
            .recv()
            .unwrap_or(Err(TaskError::Disconnected))
    }

    pub fn wait_timeout(self, timeout: Duration) -> Result<T, TaskError> {
        match self.receiver.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(TaskError::TimedOut(timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(TaskError::Disconnected),
        }
    }

    /// Result if already available
    pub fn try_result(&self) -> Option<Result<T, TaskError>> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(TaskError::Disconnected)),
        }
    }
}

/// Count of submitted-but-unfinished tasks with a wakeup on zero
#[derive(Debug, Default)]
struct Pending {
    count: Mutex<usize>,
    idle: Condvar,
}

impl Pending {
    fn start(&self) {
        *self.count.lock() += 1;
    }

    fn finish(&self) {
        let mut count = self.count.lock();
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.idle.notify_all();
        }
    }

    fn get(&self) -> usize {
        *self.count.lock()
    }
}

/// Decrements the pending count even if the task unwinds
struct PendingGuard(Arc<Pending>);

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.0.finish();
    }
}

/// Task counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct PoolStats {
    pub workers: usize,
    pub submitted: u64,
    pub failed: u64,
    pub pending: usize,
}

pub struct ThreadPool {
    pool: rayon::ThreadPool,
    workers: usize,
    pending: Arc<Pending>,
    shutdown: AtomicBool,
    submitted: AtomicU64,
    failed: Arc<AtomicU64>,
}

pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

impl ThreadPool {
    pub fn new(workers: usize) -> Result<Self, ThreadPoolError> {
        let workers = workers.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|index| format!("forge-worker-{index}"))
            .build()
            .map_err(|e| ThreadPoolError::Build(e.to_string()))?;

        debug!("Worker pool started with {} threads", workers);
        Ok(Self {
            pool,
            workers,
            pending: Arc::new(Pending::default()),
            shutdown: AtomicBool::new(false),
            submitted: AtomicU64::new(0),
            failed: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Run `task` on a worker and return a handle to its result.
    /// A panic inside the task is captured as [`TaskError::Panicked`].
    pub fn enqueue_task_with_result<F, T>(&self, task: F) -> Result<TaskHandle<T>, ThreadPoolError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        if self.is_shutdown() {
            return Err(ThreadPoolError::ShutDown);
        }

        let (tx, rx) = bounded(1);
        self.pending.start();
        self.submitted.fetch_add(1, Ordering::Relaxed);
        let guard = PendingGuard(self.pending.clone());
        let failed = self.failed.clone();

        self.pool.spawn(move || {
            let _guard = guard;
            let result = catch_unwind(AssertUnwindSafe(task)).map_err(|payload| {
                failed.fetch_add(1, Ordering::Relaxed);
                TaskError::Panicked(panic_message(payload))
            });
            // Receiver may have been dropped; nothing to report then
            let _ = tx.send(result);
        });

        Ok(TaskHandle { receiver: rx })
    }

    /// Fire-and-forget variant
    pub fn enqueue_task<F>(&self, task: F) -> Result<(), ThreadPoolError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.enqueue_task_with_result(task).map(|_| ())
    }

    /// Run a (possibly parallel) closure inside the pool and wait for it
    pub fn install<OP, R>(&self, op: OP) -> R
    where
        OP: FnOnce() -> R + Send,
        R: Send,
    {
        self.pool.install(op)
    }

    pub fn is_busy(&self) -> bool {
        self.pending.get() > 0
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    pub fn pending_tasks(&self) -> usize {
        self.pending.get()
    }

    pub fn worker_count(&self) -> usize {
        self.workers
    }

    /// Block until no task is pending, or fail once `timeout` elapses
    pub fn wait_for_idle(&self, timeout: Duration) -> Result<(), ThreadPoolError> {
        let deadline = Instant::now() + timeout;
        let mut count = self.pending.count.lock();
        while *count > 0 {
            if self.pending.idle.wait_until(&mut count, deadline).timed_out() && *count > 0 {
                warn!("Worker pool drain timed out with {} pending task(s)", *count);
                return Err(ThreadPoolError::DrainTimeout {
                    pending: *count,
                    timeout,
                });
            }
        }
        Ok(())
    }

    /// Stop accepting work. Already queued tasks still run.
    pub fn clean(&self) {
        if !self.shutdown.swap(true, Ordering::AcqRel) {
            debug!("Worker pool closed to new tasks");
        }
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            workers: self.workers,
            submitted: self.submitted.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            pending: self.pending.get(),
        }
    }
}

impl std::fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadPool")
            .field("workers", &self.workers)
            .field("pending", &self.pending.get())
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}
