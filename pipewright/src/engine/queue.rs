//! Bounded execution queue and the worker pool that drains it.
//!
//! Enqueueing never waits: a full queue is reported to the caller at once.
//! Workers are long-lived tasks sharing one receiver; each takes one run at a
//! time and owns it until it finishes.

use crate::cancellation::CancellationToken;
use crate::definition::RunPlan;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// One execution waiting for a worker.
#[derive(Debug)]
pub(crate) struct QueuedRun {
    pub execution_id: String,
    pub plan: RunPlan,
    pub token: Arc<CancellationToken>,
}

/// Why an enqueue was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EnqueueError {
    /// The queue holds `capacity` runs already.
    Full,
    /// The queue was shut down.
    Closed,
}

type SharedReceiver = Arc<tokio::sync::Mutex<mpsc::Receiver<QueuedRun>>>;

pub(crate) struct WorkQueue {
    sender: Mutex<Option<mpsc::Sender<QueuedRun>>>,
    receiver: SharedReceiver,
    capacity: usize,
    started: AtomicBool,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for WorkQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkQueue")
            .field("capacity", &self.capacity)
            .field("started", &self.is_started())
            .finish_non_exhaustive()
    }
}

impl WorkQueue {
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity);
        Self {
            sender: Mutex::new(Some(sender)),
            receiver: Arc::new(tokio::sync::Mutex::new(receiver)),
            capacity,
            started: AtomicBool::new(false),
            workers: Mutex::new(Vec::new()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Runs currently waiting for a worker.
    pub fn pending(&self) -> usize {
        self.sender
            .lock()
            .as_ref()
            .map_or(0, |s| self.capacity - s.capacity())
    }

    /// Adds a run without waiting. On rejection the run is handed back.
    pub fn try_enqueue(&self, run: QueuedRun) -> Result<(), (EnqueueError, QueuedRun)> {
        let guard = self.sender.lock();
        let Some(sender) = guard.as_ref() else {
            return Err((EnqueueError::Closed, run));
        };
        sender.try_send(run).map_err(|e| match e {
            TrySendError::Full(run) => (EnqueueError::Full, run),
            TrySendError::Closed(run) => (EnqueueError::Closed, run),
        })
    }

    /// Spawns `count` workers on the current runtime. Later calls do nothing.
    pub fn start<F, Fut>(&self, count: usize, process: F)
    where
        F: Fn(QueuedRun) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        let mut workers = self.workers.lock();
        for worker_id in 0..count {
            let receiver = self.receiver.clone();
            let process = process.clone();
            workers.push(tokio::spawn(async move {
                debug!(worker_id, "Worker started");
                loop {
                    // Only one idle worker waits on the channel at a time.
                    let next = receiver.lock().await.recv().await;
                    let Some(run) = next else {
                        break;
                    };
                    debug!(
                        worker_id,
                        execution_id = %run.execution_id,
                        "Worker picked up execution"
                    );
                    process(run).await;
                }
                debug!(worker_id, "Worker stopped");
            }));
        }
        info!(workers = count, capacity = self.capacity, "Worker pool started");
    }

    /// Closes the queue and waits for the workers to drain it.
    pub async fn shutdown(&self) {
        self.sender.lock().take();
        let workers: Vec<JoinHandle<()>> = std::mem::take(&mut *self.workers.lock());
        for handle in workers {
            if let Err(e) = handle.await {
                warn!(error = %e, "Worker task ended abnormally");
            }
        }
        info!("Worker pool stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{Definition, Workflow};
    use std::time::Duration;

    fn run(id: &str) -> QueuedRun {
        QueuedRun {
            execution_id: id.to_string(),
            plan: Workflow::new("w").into_plan(),
            token: Arc::new(CancellationToken::new()),
        }
    }

    #[test]
    fn test_try_enqueue_full_is_immediate() {
        let queue = WorkQueue::new(2);
        assert!(queue.try_enqueue(run("a")).is_ok());
        assert!(queue.try_enqueue(run("b")).is_ok());
        assert_eq!(queue.pending(), 2);

        let (err, rejected) = queue.try_enqueue(run("c")).unwrap_err();
        assert_eq!(err, EnqueueError::Full);
        assert_eq!(rejected.execution_id, "c");
    }

    #[tokio::test]
    async fn test_workers_drain_and_shutdown() {
        let queue = WorkQueue::new(8);
        let seen = Arc::new(Mutex::new(Vec::new()));

        for id in ["a", "b", "c"] {
            queue.try_enqueue(run(id)).unwrap();
        }

        let sink = seen.clone();
        queue.start(2, move |run| {
            let sink = sink.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                sink.lock().push(run.execution_id);
            }
        });
        assert!(queue.is_started());

        queue.shutdown().await;
        let mut seen = seen.lock().clone();
        seen.sort();
        assert_eq!(seen, vec!["a", "b", "c"]);

        let (err, _) = queue.try_enqueue(run("d")).unwrap_err();
        assert_eq!(err, EnqueueError::Closed);
    }
}
