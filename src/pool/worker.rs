//! Fixed-size pool of OS worker threads.
//!
//! Jobs are queued on an unbounded channel shared by all workers. The caller
//! awaits a oneshot receiver, so the async task is suspended (not blocked)
//! while the job runs.

use crate::error::{OffloadError, OffloadResult};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A pool of N worker threads executing blocking calls.
///
/// Each submitted call runs start-to-finish on exactly one worker and its
/// outcome is delivered exactly once. With a single worker, calls run one at a
/// time in submission order on the same OS thread.
pub struct WorkerPool {
    name: String,
    size: usize,
    sender: mpsc::UnboundedSender<Job>,
    submitted: AtomicU64,
}

impl WorkerPool {
    /// Spawn a pool with `size` worker threads named `<name>-<n>`.
    pub fn new(name: impl Into<String>, size: usize) -> OffloadResult<Self> {
        let name = name.into();
        if size == 0 {
            return Err(OffloadError::invalid_pool_size(size));
        }

        let (sender, receiver) = mpsc::unbounded_channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));

        for idx in 0..size {
            let receiver = Arc::clone(&receiver);
            thread::Builder::new()
                .name(format!("{name}-{idx}"))
                .spawn(move || worker_loop(receiver))
                .map_err(|e| OffloadError::worker_spawn(&name, e))?;
        }

        debug!(pool = %name, size, "Started worker pool");

        Ok(Self {
            name,
            size,
            sender,
            submitted: AtomicU64::new(0),
        })
    }

    /// Pool name, also the prefix of its worker thread names.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of worker threads.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of calls dispatched to this pool so far.
    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    /// Run `f` on a worker thread and wait for it without blocking the scheduler.
    ///
    /// A panic inside `f` is caught on the worker and resumed in the caller
    /// with its original payload. Dropping the returned future does not stop
    /// the call; it runs to completion and its result is discarded.
    pub async fn submit<F, T>(&self, f: F) -> OffloadResult<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: Job = Box::new(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(f));
            // The caller may have been cancelled; nobody is left to receive.
            let _ = tx.send(outcome);
        });

        self.sender
            .send(job)
            .map_err(|_| OffloadError::pool_closed(&self.name))?;
        self.submitted.fetch_add(1, Ordering::Relaxed);
        trace!(pool = %self.name, "Dispatched call to worker");

        match rx.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(payload)) => panic::resume_unwind(payload),
            Err(_) => Err(OffloadError::pool_closed(&self.name)),
        }
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("name", &self.name)
            .field("size", &self.size)
            .field("submitted", &self.submitted())
            .finish()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Workers exit once the queue is drained and the sender is gone.
        debug!(pool = %self.name, "Shutting down worker pool");
    }
}

fn worker_loop(receiver: Arc<Mutex<mpsc::UnboundedReceiver<Job>>>) {
    loop {
        let job = {
            let mut rx = receiver.lock().unwrap_or_else(PoisonError::into_inner);
            rx.blocking_recv()
        };
        match job {
            Some(job) => job(),
            None => break,
        }
    }
    trace!(
        thread = thread::current().name().unwrap_or("unnamed"),
        "Worker thread exiting"
    );
}
