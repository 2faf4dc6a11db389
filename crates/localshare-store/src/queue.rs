//! Single-writer work queue.
//!
//! Every job submitted with [`PersistenceQueue::enqueue`] runs on one worker
//! task, one at a time, in submission order. A job that itself calls
//! `enqueue` on the same queue runs that nested work inline instead of
//! queueing it behind itself.
//!
//! "Inside the queue" is tracked with a task-local holding the queue's id, so
//! two independent queues never mistake each other's jobs for their own.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::{self, BoxFuture};
use futures::FutureExt;
use tokio::sync::{mpsc, oneshot, Notify};
use tracing::{debug, error};

use crate::error::QueueError;

tokio::task_local! {
    static QUEUE_SCOPE: u64;
}

static NEXT_QUEUE_ID: AtomicU64 = AtomicU64::new(1);

type Job = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

struct Shared {
    closed: AtomicBool,
    shutdown: Notify,
}

/// Handle to a serialized worker. Cloning shares the same worker.
#[derive(Clone)]
pub struct PersistenceQueue {
    id: u64,
    tx: mpsc::UnboundedSender<Job>,
    shared: Arc<Shared>,
}

impl PersistenceQueue {
    /// Spawn the worker on the current tokio runtime.
    pub fn new() -> Self {
        let id = NEXT_QUEUE_ID.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            closed: AtomicBool::new(false),
            shutdown: Notify::new(),
        });

        tokio::spawn(run_worker(id, rx, shared.clone()));

        Self { id, tx, shared }
    }

    /// Whether the calling task is currently executing a job of this queue.
    pub fn is_current(&self) -> bool {
        QUEUE_SCOPE.try_with(|id| *id == self.id).unwrap_or(false)
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Run `work` on the queue and wait for its output.
    ///
    /// Called from inside a job of this queue, `work` runs immediately on the
    /// calling task. Otherwise it is queued behind every earlier submission.
    /// The job is submitted when `enqueue` is called, not when the returned
    /// future is first polled. A panicking job yields [`QueueError::Panicked`]
    /// and the worker moves on to the next job.
    pub fn enqueue<F, Fut, T>(&self, work: F) -> BoxFuture<'static, Result<T, QueueError>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        if self.is_current() {
            return async move { Ok(work().await) }.boxed();
        }

        if self.is_closed() {
            return future::ready(Err(QueueError::Closed)).boxed();
        }

        let (result_tx, result_rx) = oneshot::channel();
        let job: Job = Box::new(move || {
            async move {
                let outcome = AssertUnwindSafe(work()).catch_unwind().await;
                let _ = result_tx.send(outcome.map_err(|_| QueueError::Panicked));
            }
            .boxed()
        });

        if self.tx.send(job).is_err() {
            return future::ready(Err(QueueError::Closed)).boxed();
        }

        // Sender dropped without a value means the job was discarded.
        async move { result_rx.await.unwrap_or(Err(QueueError::Closed)) }.boxed()
    }

    /// Stop accepting work. Jobs still waiting are dropped and their callers
    /// receive [`QueueError::Closed`]; the job currently running finishes.
    pub fn cancel(&self) {
        if !self.shared.closed.swap(true, Ordering::AcqRel) {
            debug!(queue = self.id, "Persistence queue cancelled");
            self.shared.shutdown.notify_one();
        }
    }
}

impl Default for PersistenceQueue {
    fn default() -> Self {
        Self::new()
    }
}

async fn run_worker(id: u64, mut rx: mpsc::UnboundedReceiver<Job>, shared: Arc<Shared>) {
    loop {
        let job = tokio::select! {
            biased;
            _ = shared.shutdown.notified() => break,
            job = rx.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };

        if shared.closed.load(Ordering::Acquire) {
            break;
        }

        QUEUE_SCOPE.scope(id, job()).await;
    }

    rx.close();
    let mut dropped = 0usize;
    while let Ok(job) = rx.try_recv() {
        drop(job);
        dropped += 1;
    }
    if dropped > 0 {
        error!(queue = id, dropped, "Persistence queue stopped with pending jobs");
    } else {
        debug!(queue = id, "Persistence queue worker stopped");
    }
}
