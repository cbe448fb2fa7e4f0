// ── Serialized hardware access ──
//
// The native stack forbids concurrent inquiries and searches. Every
// hardware-facing job in the engine goes through this executor: a single
// worker task drains one queue, so at most one job runs at any instant and
// all others wait in submission order, periodic rounds included.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// A job: receives a cancellation token tied to the serializer's lifetime
/// so it can exit its rendezvous wait when the engine stops.
type Job = Box<dyn FnOnce(CancellationToken) -> BoxFuture<'static, ()> + Send>;

struct QueuedJob {
    label: &'static str,
    job: Job,
    /// Completion signal, used by the periodic scheduler to implement
    /// fixed-delay semantics.
    done: Option<oneshot::Sender<()>>,
}

/// Single-worker executor for hardware operations.
///
/// - `submit` / `submit_with_result`: one-shot jobs, queued FIFO.
/// - `schedule_periodic`: fixed-delay recurrence — the next occurrence is
///   enqueued one period after the previous one *finished*, never
///   overlapping it.
/// - A panic inside a job is caught at the worker boundary, logged, and the
///   worker moves on to the next job.
/// - `shutdown` stops intake immediately, abandons the queue, and cancels
///   the token handed to the in-flight job. Submissions after shutdown are
///   no-ops with a log side effect — callers must not depend on them.
pub struct TaskSerializer {
    queue: mpsc::UnboundedSender<QueuedJob>,
    cancel: CancellationToken,
    stopped: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl TaskSerializer {
    /// Spawn the worker. Must be called inside a tokio runtime.
    pub fn new() -> Self {
        let (queue, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let worker = spawn_worker(rx, cancel.clone());

        Self {
            queue,
            cancel,
            stopped: AtomicBool::new(false),
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Queue a one-shot job.
    pub fn submit<F>(&self, label: &'static str, job: F)
    where
        F: FnOnce(CancellationToken) -> BoxFuture<'static, ()> + Send + 'static,
    {
        self.enqueue(QueuedJob {
            label,
            job: Box::new(job),
            done: None,
        });
    }

    /// Queue a one-shot job that yields a value. The receiver resolves with
    /// an error if the job is dropped unexecuted (shutdown).
    pub fn submit_with_result<T, F>(&self, label: &'static str, job: F) -> oneshot::Receiver<T>
    where
        T: Send + 'static,
        F: FnOnce(CancellationToken) -> BoxFuture<'static, T> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.submit(label, move |cancel| {
            Box::pin(async move {
                let value = job(cancel).await;
                let _ = tx.send(value);
            })
        });
        rx
    }

    /// Register a recurring job with fixed-delay scheduling. The first
    /// occurrence is queued immediately.
    pub fn schedule_periodic<F>(&self, label: &'static str, period: Duration, factory: F)
    where
        F: Fn(CancellationToken) -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        if self.stopped.load(Ordering::SeqCst) {
            warn!(job = label, "serializer stopped, cannot schedule periodic job");
            return;
        }

        let factory = Arc::new(factory);
        let queue = self.queue.clone();
        let cancel = self.cancel.clone();

        debug!(job = label, ?period, "scheduling periodic job");
        tokio::spawn(async move {
            loop {
                let (done_tx, done_rx) = oneshot::channel();
                let factory = Arc::clone(&factory);
                let queued = QueuedJob {
                    label,
                    job: Box::new(move |token| factory(token)),
                    done: Some(done_tx),
                };
                if queue.send(queued).is_err() {
                    break;
                }

                // Wait for this occurrence to finish, then one period more.
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = done_rx => {}
                }
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(period) => {}
                }
            }
            debug!(job = label, "periodic schedule ended");
        });
    }

    /// Stop the worker: no new jobs, queued jobs abandoned, the in-flight
    /// job's token cancelled so it can observe the interruption.
    pub async fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("shutting down serializer");
        self.cancel.cancel();
        if let Some(worker) = self.worker.lock().await.take() {
            let _ = worker.await;
        }
    }

    fn enqueue(&self, queued: QueuedJob) {
        if self.stopped.load(Ordering::SeqCst) {
            warn!(job = queued.label, "serializer stopped, dropping job");
            return;
        }
        if self.queue.send(queued).is_err() {
            warn!("serializer worker gone, dropping job");
        }
    }
}

impl Default for TaskSerializer {
    fn default() -> Self {
        Self::new()
    }
}

fn spawn_worker(
    mut rx: mpsc::UnboundedReceiver<QueuedJob>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let queued = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                msg = rx.recv() => match msg {
                    Some(queued) => queued,
                    None => break,
                },
            };

            debug!(job = queued.label, "running job");
            let fut = (queued.job)(cancel.child_token());
            if let Err(payload) = AssertUnwindSafe(fut).catch_unwind().await {
                error!(
                    job = queued.label,
                    panic = panic_message(&payload),
                    "job panicked, worker continues"
                );
            }
            if let Some(done) = queued.done {
                let _ = done.send(());
            }
        }
        debug!("serializer worker exited");
    })
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic payload>")
}
