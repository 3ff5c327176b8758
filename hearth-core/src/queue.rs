//! Serialized job queue.
//!
//! Every handler callback runs on one dedicated worker thread, strictly in
//! the order it was enqueued. The worker owns a piece of state `S` (in
//! practice the [`Dispatcher`](crate::dispatch::Dispatcher)) and hands each
//! job a mutable reference to it, so handlers never need locks of their own.
//!
//! The queue is unbounded: the transport must never block on a slow
//! handler. Depth is tracked and a warning is logged once it passes
//! [`HIGH_WATER_MARK`].

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

pub const HIGH_WATER_MARK: usize = 1024;

type Job<S> = Box<dyn FnOnce(&mut S) -> anyhow::Result<()> + Send>;

/// Receives every error or panic a job produces.
pub type ErrorHook = Arc<dyn Fn(&anyhow::Error) + Send + Sync>;

/// Logs the failure and moves on.
pub fn log_errors() -> ErrorHook {
    Arc::new(|e| tracing::error!(error = %format!("{e:#}"), "Event queue job failed"))
}

/// Cloneable handle for enqueueing jobs.
pub struct EventQueue<S> {
    inner: Arc<Inner<S>>,
}

impl<S> Clone for EventQueue<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct Inner<S> {
    name: String,
    tx: Mutex<Option<mpsc::UnboundedSender<Job<S>>>>,
    done: Mutex<Option<oneshot::Receiver<()>>>,
    depth: Arc<AtomicUsize>,
}

/// The not-yet-started consumer half of a queue.
///
/// Jobs enqueued before [`QueueWorker::spawn`] are buffered and run first.
pub struct QueueWorker<S> {
    name: String,
    rx: mpsc::UnboundedReceiver<Job<S>>,
    done: oneshot::Sender<()>,
    depth: Arc<AtomicUsize>,
    on_error: ErrorHook,
}

impl<S: Send + 'static> EventQueue<S> {
    pub fn new(name: &str, on_error: ErrorHook) -> (Self, QueueWorker<S>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (done_tx, done_rx) = oneshot::channel();
        let depth = Arc::new(AtomicUsize::new(0));
        let queue = Self {
            inner: Arc::new(Inner {
                name: name.to_string(),
                tx: Mutex::new(Some(tx)),
                done: Mutex::new(Some(done_rx)),
                depth: depth.clone(),
            }),
        };
        let worker = QueueWorker {
            name: name.to_string(),
            rx,
            done: done_tx,
            depth,
            on_error,
        };
        (queue, worker)
    }

    /// Shorthand for [`EventQueue::new`] followed by [`QueueWorker::spawn`].
    pub fn start(name: &str, state: S, on_error: ErrorHook) -> std::io::Result<Self> {
        let (queue, worker) = Self::new(name, on_error);
        worker.spawn(state)?;
        Ok(queue)
    }

    /// Add a job. Never blocks.
    ///
    /// Returns `false` (and drops the job) once the queue is shut down.
    pub fn enqueue<F>(&self, job: F) -> bool
    where
        F: FnOnce(&mut S) -> anyhow::Result<()> + Send + 'static,
    {
        let tx = self.inner.tx.lock();
        let Some(tx) = tx.as_ref() else {
            tracing::debug!(queue = %self.inner.name, "Dropping job, queue is shut down");
            return false;
        };
        let depth = self.inner.depth.fetch_add(1, Ordering::Relaxed) + 1;
        if depth == HIGH_WATER_MARK {
            tracing::warn!(
                queue = %self.inner.name,
                depth,
                "Event queue is backing up; a handler may be stuck"
            );
        }
        if tx.send(Box::new(job)).is_err() {
            self.inner.depth.fetch_sub(1, Ordering::Relaxed);
            return false;
        }
        true
    }

    /// Resolves once every job enqueued before this call has run.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        let queued = self.enqueue(move |_| {
            let _ = tx.send(());
            Ok(())
        });
        if queued {
            let _ = rx.await;
        }
    }

    /// Stop accepting jobs, run everything already queued, then let the
    /// worker exit. Safe to call more than once.
    pub async fn shutdown(&self) {
        let done = {
            self.inner.tx.lock().take();
            self.inner.done.lock().take()
        };
        if let Some(done) = done {
            let _ = done.await;
            tracing::debug!(queue = %self.inner.name, "Event queue drained");
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.tx.lock().is_some()
    }

    /// Jobs enqueued but not yet started.
    pub fn len(&self) -> usize {
        self.inner.depth.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<S: Send + 'static> QueueWorker<S> {
    /// Start the worker thread that owns `state`.
    pub fn spawn(self, state: S) -> std::io::Result<thread::JoinHandle<()>> {
        let name = self.name.clone();
        thread::Builder::new()
            .name(name)
            .spawn(move || self.run(state))
    }

    fn run(mut self, mut state: S) {
        tracing::debug!(queue = %self.name, "Event queue worker started");
        while let Some(job) = self.rx.blocking_recv() {
            self.depth.fetch_sub(1, Ordering::Relaxed);
            match catch_unwind(AssertUnwindSafe(|| job(&mut state))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => (self.on_error)(&e),
                Err(panic) => {
                    let e = anyhow::anyhow!("job panicked: {}", panic_message(panic.as_ref()));
                    (self.on_error)(&e);
                }
            }
        }
        tracing::debug!(queue = %self.name, "Event queue worker exiting");
        drop(state);
        let _ = self.done.send(());
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
