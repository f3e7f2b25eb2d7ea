//! Long-poll loop feeding inbound updates to a bounded worker pool.

use crate::queue::{EnqueueError, WorkHandler, WorkQueue};
use crate::transport::{Transport, Update};
use crate::types::Event;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Pause after a failed poll before trying again
const POLL_ERROR_PAUSE: Duration = Duration::from_secs(3);

/// Polls the transport and hands updates to the update workers
pub(crate) struct Dispatcher {
    transport: Arc<dyn Transport>,
    queue: WorkQueue<Update>,
    event_tx: broadcast::Sender<Event>,
    poll_timeout: Duration,
    error_pause: Duration,
}

impl Dispatcher {
    pub(crate) fn start<H: WorkHandler<Update>>(
        workers: usize,
        handler: Arc<H>,
        transport: Arc<dyn Transport>,
        event_tx: broadcast::Sender<Event>,
        poll_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            queue: WorkQueue::start("updates", workers, handler),
            event_tx,
            poll_timeout,
            error_pause: POLL_ERROR_PAUSE,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_error_pause(mut self, pause: Duration) -> Self {
        self.error_pause = pause;
        self
    }

    pub(crate) fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    pub(crate) fn workers(&self) -> usize {
        self.queue.workers()
    }

    /// Hand one update to the workers; drops it when the queue is full
    pub(crate) fn offer(&self, update: Update) -> bool {
        let update_id = update.update_id;
        match self.queue.try_enqueue(update) {
            Ok(()) => true,
            Err(EnqueueError::Full(_)) => {
                tracing::warn!(
                    update_id,
                    queue_size = self.queue.capacity(),
                    "Update queue is full, dropping update"
                );
                self.event_tx.send(Event::UpdateDropped { update_id }).ok();
                false
            }
            Err(EnqueueError::Closed(_)) => {
                tracing::debug!(update_id, "Update queue closed, dropping update");
                self.event_tx.send(Event::UpdateDropped { update_id }).ok();
                false
            }
        }
    }

    /// Poll until `shutdown` fires
    ///
    /// The offset only moves past updates that were actually received, so a
    /// failed poll is retried from the same place.
    pub(crate) async fn run(&self, shutdown: CancellationToken) {
        let mut offset: i64 = 0;
        tracing::info!(
            poll_timeout_secs = self.poll_timeout.as_secs(),
            "Polling for updates"
        );

        loop {
            let polled = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                polled = self.transport.poll_updates(offset, self.poll_timeout) => polled,
            };

            match polled {
                Ok(updates) => {
                    for update in updates {
                        offset = offset.max(update.update_id + 1);
                        self.offer(update);
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        retry_in_secs = self.error_pause.as_secs(),
                        "Failed to poll updates"
                    );
                    tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(self.error_pause) => {}
                    }
                }
            }
        }

        tracing::info!("Stopped polling for updates");
    }

    /// Stop the update workers; pending updates are discarded
    pub(crate) async fn shutdown(&self) {
        let leftover = self.queue.shutdown().await;
        if !leftover.is_empty() {
            tracing::info!(
                dropped = leftover.len(),
                "Discarded pending updates at shutdown"
            );
        }
    }
}
