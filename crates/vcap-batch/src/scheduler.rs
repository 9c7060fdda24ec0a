//! Batch scheduler.
//!
//! Callers `submit` one request at a time and get a [`BatchHandle`] back
//! immediately. A dedicated dispatch task collects pending requests until
//! either `max_batch_size` are waiting or the oldest has waited `max_wait`,
//! hands the batch to the [`BatchProcessor`] on the blocking pool, and
//! delivers `result[i]` to the handle of `request[i]`.
//!
//! The queue mutex is held only to push or drain; results travel over
//! per-request oneshot channels, so a caller waiting on its handle never
//! contends with the scheduler.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::BatchConfig;
use crate::error::{BatchError, Result};

/// The batch operation of a backend.
///
/// Runs on the blocking thread pool. Must return exactly one output per
/// input, in input order.
pub trait BatchProcessor: Send + Sync + 'static {
    type Input: Send + 'static;
    type Output: Send + 'static;

    fn process_batch(&self, inputs: Vec<Self::Input>) -> std::result::Result<Vec<Self::Output>, String>;
}

type Reply<O> = oneshot::Sender<Result<O>>;

struct Pending<I, O> {
    input: I,
    reply: Reply<O>,
    enqueued_at: Instant,
}

struct Queue<I, O> {
    items: VecDeque<Pending<I, O>>,
    closed: bool,
}

struct Shared<I, O> {
    queue: Mutex<Queue<I, O>>,
    notify: Notify,
    stats: Counters,
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    rejected: AtomicU64,
    batches: AtomicU64,
    failed_batches: AtomicU64,
}

/// Snapshot of scheduler counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub submitted: u64,
    /// Submissions refused with `QueueSaturated` or `Closed`
    pub rejected: u64,
    pub batches: u64,
    pub failed_batches: u64,
}

/// Pending result of a submitted request.
#[must_use = "the result is only observable through the handle"]
pub struct BatchHandle<O> {
    rx: oneshot::Receiver<Result<O>>,
    timeout: Duration,
}

impl<O> BatchHandle<O> {
    /// Wait for this request's result.
    ///
    /// Resolves with `Timeout` if nothing arrives within the configured
    /// result timeout, and with `Closed` if the scheduler shut down first.
    pub async fn wait(self) -> Result<O> {
        match tokio::time::timeout(self.timeout, self.rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(BatchError::Closed),
            Err(_) => Err(BatchError::Timeout(self.timeout)),
        }
    }
}

/// Groups requests for one backend into batches.
pub struct BatchScheduler<P: BatchProcessor> {
    name: String,
    config: BatchConfig,
    shared: Arc<Shared<P::Input, P::Output>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<P: BatchProcessor> BatchScheduler<P> {
    /// Start a scheduler and its dispatch task on the current tokio runtime.
    pub fn spawn(name: impl Into<String>, processor: P, config: BatchConfig) -> Result<Self> {
        config.validate()?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| BatchError::NoRuntime)?;

        let name = name.into();
        let shared = Arc::new(Shared {
            queue: Mutex::new(Queue {
                items: VecDeque::with_capacity(config.max_queue_depth),
                closed: false,
            }),
            notify: Notify::new(),
            stats: Counters::default(),
        });

        let worker = runtime.spawn(dispatch_loop(
            name.clone(),
            Arc::new(processor),
            shared.clone(),
            config.clone(),
        ));

        info!(
            scheduler = %name,
            max_batch_size = config.max_batch_size,
            max_wait_ms = config.max_wait_ms,
            max_queue_depth = config.max_queue_depth,
            "Batch scheduler started"
        );

        Ok(Self {
            name,
            config,
            shared,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Enqueue a request. Never blocks on the dispatch loop.
    pub fn submit(&self, input: P::Input) -> Result<BatchHandle<P::Output>> {
        let (tx, rx) = oneshot::channel();
        {
            let mut queue = self.shared.queue.lock();
            if queue.closed {
                self.shared.stats.rejected.fetch_add(1, Ordering::Relaxed);
                return Err(BatchError::Closed);
            }
            if queue.items.len() >= self.config.max_queue_depth {
                self.shared.stats.rejected.fetch_add(1, Ordering::Relaxed);
                debug!(scheduler = %self.name, depth = queue.items.len(), "Queue saturated");
                return Err(BatchError::QueueSaturated {
                    depth: queue.items.len(),
                });
            }
            queue.items.push_back(Pending {
                input,
                reply: tx,
                enqueued_at: Instant::now(),
            });
        }
        self.shared.stats.submitted.fetch_add(1, Ordering::Relaxed);
        self.shared.notify.notify_one();

        Ok(BatchHandle {
            rx,
            timeout: self.config.result_timeout(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Requests waiting to be dispatched (not counting the batch in flight).
    pub fn queue_depth(&self) -> usize {
        self.shared.queue.lock().items.len()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.queue.lock().closed
    }

    pub fn stats(&self) -> SchedulerStats {
        let c = &self.shared.stats;
        SchedulerStats {
            submitted: c.submitted.load(Ordering::Relaxed),
            rejected: c.rejected.load(Ordering::Relaxed),
            batches: c.batches.load(Ordering::Relaxed),
            failed_batches: c.failed_batches.load(Ordering::Relaxed),
        }
    }

    /// Stop accepting requests. The batch in flight completes; requests still
    /// queued resolve with `Closed`.
    pub fn close(&self) {
        self.shared.queue.lock().closed = true;
        self.shared.notify.notify_one();
    }

    /// Close and wait for the dispatch task to finish.
    pub async fn shutdown(&self) {
        self.close();
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                warn!(scheduler = %self.name, "Dispatch task ended abnormally: {}", e);
            }
            info!(scheduler = %self.name, "Batch scheduler stopped");
        }
    }
}

impl<P: BatchProcessor> Drop for BatchScheduler<P> {
    fn drop(&mut self) {
        self.close();
    }
}

enum Next<I, O> {
    Dispatch(Vec<Pending<I, O>>),
    Stop(Vec<Pending<I, O>>),
}

async fn dispatch_loop<P: BatchProcessor>(
    name: String,
    processor: Arc<P>,
    shared: Arc<Shared<P::Input, P::Output>>,
    config: BatchConfig,
) {
    loop {
        match next_batch(&shared, &config).await {
            Next::Dispatch(batch) => run_batch(&name, &processor, &shared, batch).await,
            Next::Stop(rest) => {
                if !rest.is_empty() {
                    debug!(scheduler = %name, pending = rest.len(), "Rejecting queued requests on shutdown");
                }
                for pending in rest {
                    let _ = pending.reply.send(Err(BatchError::Closed));
                }
                break;
            }
        }
    }
}

/// Wait until a batch is due, then drain it.
async fn next_batch<I, O>(shared: &Shared<I, O>, config: &BatchConfig) -> Next<I, O> {
    // Wait for the first request
    let oldest = loop {
        let notified = shared.notify.notified();
        {
            let mut queue = shared.queue.lock();
            if queue.closed {
                return Next::Stop(queue.items.drain(..).collect());
            }
            if let Some(front) = queue.items.front() {
                break front.enqueued_at;
            }
        }
        notified.await;
    };

    // Collect until the batch is full or the oldest request is due
    let deadline = oldest + config.max_wait();
    loop {
        let notified = shared.notify.notified();
        {
            let queue = shared.queue.lock();
            if queue.closed || queue.items.len() >= config.max_batch_size {
                break;
            }
        }
        tokio::select! {
            _ = notified => {}
            _ = tokio::time::sleep_until(deadline) => break,
        }
    }

    let mut queue = shared.queue.lock();
    if queue.closed {
        return Next::Stop(queue.items.drain(..).collect());
    }
    let n = queue.items.len().min(config.max_batch_size);
    Next::Dispatch(queue.items.drain(..n).collect())
}

async fn run_batch<P: BatchProcessor>(
    name: &str,
    processor: &Arc<P>,
    shared: &Shared<P::Input, P::Output>,
    batch: Vec<Pending<P::Input, P::Output>>,
) {
    let size = batch.len();
    let (inputs, replies): (Vec<_>, Vec<_>) = batch.into_iter().map(|p| (p.input, p.reply)).unzip();

    let worker = processor.clone();
    let outcome = match tokio::task::spawn_blocking(move || worker.process_batch(inputs)).await {
        Ok(Ok(outputs)) if outputs.len() == size => Ok(outputs),
        Ok(Ok(outputs)) => Err(BatchError::ResultMismatch {
            expected: size,
            got: outputs.len(),
        }),
        Ok(Err(message)) => Err(BatchError::Backend(message)),
        Err(e) => Err(BatchError::Backend(format!("batch task failed: {}", e))),
    };

    shared.stats.batches.fetch_add(1, Ordering::Relaxed);
    match outcome {
        Ok(outputs) => {
            debug!(scheduler = %name, size, "Batch dispatched");
            for (reply, output) in replies.into_iter().zip(outputs) {
                let _ = reply.send(Ok(output));
            }
        }
        Err(e) => {
            shared.stats.failed_batches.fetch_add(1, Ordering::Relaxed);
            warn!(scheduler = %name, size, "Batch failed: {}", e);
            for reply in replies {
                let _ = reply.send(Err(e.clone()));
            }
        }
    }
}
