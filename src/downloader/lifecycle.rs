//! Shutdown coordination.

use super::DownloadOrchestrator;
use crate::error::{Error, FailureCategory};
use crate::types::Event;
use std::sync::atomic::Ordering;
use std::time::Duration;

/// How long shutdown waits for workers to finish their current request
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

impl DownloadOrchestrator {
    /// Gracefully shut down the orchestrator
    ///
    /// 1. Stops admitting requests
    /// 2. Cancels every in-flight request
    /// 3. Waits (up to 30 seconds) for workers to wind down
    /// 4. Fails whatever was still waiting in the queue and deletes its
    ///    status message
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down download orchestrator");

        self.shared.accepting_new.store(false, Ordering::SeqCst);

        let in_flight: Vec<_> = match self.shared.active.lock() {
            Ok(active) => active.iter().map(|(id, token)| (*id, token.clone())).collect(),
            Err(_) => Vec::new(),
        };
        for (id, token) in in_flight {
            tracing::debug!(request_id = id.0, "Cancelling in-flight request");
            token.cancel();
        }

        match tokio::time::timeout(SHUTDOWN_TIMEOUT, self.queue.shutdown()).await {
            Ok(leftover) => {
                for request in leftover {
                    request.cancel.cancel();
                    tracing::info!(
                        request_id = request.id.0,
                        chat_id = request.chat.0,
                        "Dropping queued request at shutdown"
                    );
                    if let Some(status) = request.status_message
                        && let Err(e) = self
                            .shared
                            .transport
                            .delete_message(request.chat, status)
                            .await
                    {
                        tracing::warn!(
                            request_id = request.id.0,
                            chat_id = request.chat.0,
                            message_id = status.0,
                            error = %e,
                            "Failed to delete status message"
                        );
                    }
                    self.shared.emit_event(Event::RequestFailed {
                        id: request.id,
                        error: Error::ShuttingDown.to_string(),
                        category: FailureCategory::Admission.as_str().to_string(),
                    });
                }
            }
            Err(_) => {
                tracing::warn!("Timeout waiting for download workers, proceeding with shutdown");
            }
        }

        tracing::info!("Download orchestrator stopped");
    }
}
