//! Bounded work queue drained by a fixed pool of workers
//!
//! Both inbound updates and download requests flow through a [`WorkQueue`].
//! Submission never blocks: when the queue is full the item is handed back to
//! the caller. Each worker handles one item at a time and survives panics in
//! the handler.

use async_trait::async_trait;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Processes items pulled from a [`WorkQueue`]
#[async_trait]
pub trait WorkHandler<T: Send + 'static>: Send + Sync + 'static {
    /// Handle one item
    async fn handle(&self, worker_id: usize, item: T);
}

/// Why an item was not admitted; carries the item back
#[derive(Debug)]
pub enum EnqueueError<T> {
    /// Queue at capacity
    Full(T),
    /// Queue shut down
    Closed(T),
}

impl<T> EnqueueError<T> {
    /// Recover the rejected item
    pub fn into_inner(self) -> T {
        match self {
            EnqueueError::Full(item) | EnqueueError::Closed(item) => item,
        }
    }
}

/// Fixed-capacity queue with N long-lived workers
pub struct WorkQueue<T> {
    name: &'static str,
    sender: mpsc::Sender<T>,
    receiver: Arc<Mutex<mpsc::Receiver<T>>>,
    capacity: usize,
    workers: usize,
    handles: std::sync::Mutex<Vec<JoinHandle<()>>>,
    shutdown: CancellationToken,
}

impl<T: Send + 'static> WorkQueue<T> {
    /// Spawn `workers` workers (at least one) over a queue holding twice that many items
    pub fn start<H>(name: &'static str, workers: usize, handler: Arc<H>) -> Self
    where
        H: WorkHandler<T>,
    {
        let workers = workers.max(1);
        let capacity = workers * 2;
        let (sender, receiver) = mpsc::channel(capacity);
        let receiver = Arc::new(Mutex::new(receiver));
        let shutdown = CancellationToken::new();

        let handles = (1..=workers)
            .map(|worker_id| {
                tokio::spawn(worker_loop(
                    name,
                    worker_id,
                    receiver.clone(),
                    handler.clone(),
                    shutdown.clone(),
                ))
            })
            .collect();

        tracing::info!(queue = name, workers, capacity, "Worker pool started");

        Self {
            name,
            sender,
            receiver,
            capacity,
            workers,
            handles: std::sync::Mutex::new(handles),
            shutdown,
        }
    }

    /// Admit an item without waiting
    pub fn try_enqueue(&self, item: T) -> Result<(), EnqueueError<T>> {
        if self.shutdown.is_cancelled() {
            return Err(EnqueueError::Closed(item));
        }
        self.sender.try_send(item).map_err(|e| match e {
            mpsc::error::TrySendError::Full(item) => EnqueueError::Full(item),
            mpsc::error::TrySendError::Closed(item) => EnqueueError::Closed(item),
        })
    }

    /// Maximum number of pending items
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of workers
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Number of items waiting to be picked up
    pub fn pending(&self) -> usize {
        self.capacity - self.sender.capacity()
    }

    /// Whether [`WorkQueue::shutdown`] has been called
    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Stop admitting, let workers finish their current item, and join them
    ///
    /// Returns the items that were still waiting in the queue.
    pub async fn shutdown(&self) -> Vec<T> {
        self.shutdown.cancel();

        let handles = {
            let mut guard = self
                .handles
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            std::mem::take(&mut *guard)
        };
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(queue = self.name, error = %e, "Worker task failed");
            }
        }

        let mut receiver = self.receiver.lock().await;
        receiver.close();
        let mut leftover = Vec::new();
        while let Ok(item) = receiver.try_recv() {
            leftover.push(item);
        }

        tracing::info!(
            queue = self.name,
            leftover = leftover.len(),
            "Worker pool stopped"
        );
        leftover
    }
}

async fn worker_loop<T, H>(
    name: &'static str,
    worker_id: usize,
    receiver: Arc<Mutex<mpsc::Receiver<T>>>,
    handler: Arc<H>,
    shutdown: CancellationToken,
) where
    T: Send + 'static,
    H: WorkHandler<T>,
{
    tracing::debug!(queue = name, worker_id, "Worker started");

    loop {
        let item = {
            let mut receiver = receiver.lock().await;
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => None,
                item = receiver.recv() => item,
            }
        };
        let Some(item) = item else {
            break;
        };

        if let Err(panic) = AssertUnwindSafe(handler.handle(worker_id, item))
            .catch_unwind()
            .await
        {
            tracing::error!(
                queue = name,
                worker_id,
                panic = %panic_message(&*panic),
                "Panic recovered in worker"
            );
        }
    }

    tracing::debug!(queue = name, worker_id, "Worker stopped");
}

/// Best-effort text of a caught panic payload
pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
