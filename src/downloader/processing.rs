//! Per-request pipeline run by download workers.

use super::{DownloadRequest, Shared};
use crate::backends::Downloader;
use crate::bot::text;
use crate::error::{DownloadError, Error, FailureCategory};
use crate::queue::{WorkHandler, panic_message};
use crate::types::{Event, RequestStage};
use async_trait::async_trait;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;

/// An error together with the reply the user should see
struct Failure {
    error: Error,
    reply: String,
}

impl Failure {
    fn new(error: Error, reply: impl Into<String>) -> Self {
        Self {
            error,
            reply: reply.into(),
        }
    }
}

/// Download queue handler
pub(crate) struct RequestProcessor {
    shared: Arc<Shared>,
}

#[async_trait]
impl WorkHandler<DownloadRequest> for RequestProcessor {
    async fn handle(&self, worker_id: usize, mut request: DownloadRequest) {
        let id = request.id;
        // Cancelling the scope on drop releases the backend on every exit path
        let _scope = request.cancel.clone().drop_guard();
        self.register(&request);

        tracing::info!(
            request_id = id.0,
            worker_id,
            chat_id = request.chat.0,
            url = %request.url,
            origin = request.origin.as_str(),
            "Processing download request"
        );

        let outcome = AssertUnwindSafe(self.process(&mut request))
            .catch_unwind()
            .await;

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(panic) => {
                let message = panic_message(&*panic);
                tracing::error!(
                    request_id = id.0,
                    worker_id,
                    panic = %message,
                    "Panic recovered while processing request"
                );
                Err(Failure::new(
                    Error::Other(format!("panic: {}", message)),
                    text::internal_error(),
                ))
            }
        };

        match outcome {
            Ok(size_bytes) => {
                tracing::info!(
                    request_id = id.0,
                    chat_id = request.chat.0,
                    url = %request.url,
                    size_bytes,
                    "Video delivered successfully"
                );
                self.shared
                    .emit_event(Event::RequestCompleted { id, size_bytes });
            }
            Err(failure) => self.fail(&mut request, failure).await,
        }

        self.unregister(&request);
    }
}

impl RequestProcessor {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    fn register(&self, request: &DownloadRequest) {
        if let Ok(mut active) = self.shared.active.lock() {
            active.insert(request.id, request.cancel.clone());
        }
    }

    fn unregister(&self, request: &DownloadRequest) {
        if let Ok(mut active) = self.shared.active.lock() {
            active.remove(&request.id);
        }
    }

    fn stage(&self, request: &DownloadRequest, stage: RequestStage) {
        tracing::debug!(request_id = request.id.0, stage = ?stage, "Stage changed");
        self.shared.emit_event(Event::StageChanged {
            id: request.id,
            stage,
        });
    }

    async fn process(&self, request: &mut DownloadRequest) -> Result<u64, Failure> {
        self.stage(request, RequestStage::Dequeued);

        if !self.shared.accepting_new.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(Failure::new(Error::ShuttingDown, text::shutting_down()));
        }

        let (platform, backend) = self.shared.registry.resolve(&request.url).ok_or_else(|| {
            Failure::new(
                Error::UnsupportedUrl(request.url.clone()),
                text::unsupported_platform(&request.url),
            )
        })?;

        self.stage(request, RequestStage::Downloading);
        let downloaded = self.download(request, backend.as_ref()).await;
        self.clear_status_message(request).await;

        let path = downloaded.map_err(|e| {
            tracing::error!(
                request_id = request.id.0,
                url = %request.url,
                platform = %platform,
                backend = backend.name(),
                error = %e,
                "Failed to download video"
            );
            let reply = text::download_failed(&e);
            Failure::new(e, reply)
        })?;
        let artifact = self.shared.artifacts.adopt(path);

        self.stage(request, RequestStage::SizeChecking);
        let size = match artifact.size().await {
            Ok(size) => size,
            Err(e) => {
                let error = if e.kind() == std::io::ErrorKind::NotFound {
                    DownloadError::ArtifactMissing {
                        path: artifact.path().to_path_buf(),
                    }
                    .into()
                } else {
                    Error::Io(e)
                };
                return Err(Failure::new(error, text::size_check_failed()));
            }
        };

        let limit = self.shared.size_limit;
        if size > limit {
            return Err(Failure::new(
                DownloadError::TooLarge { size, limit }.into(),
                text::too_large(size, limit),
            ));
        }

        self.stage(request, RequestStage::Delivering);
        let send = self
            .shared
            .transport
            .send_video(request.chat, artifact.path(), true);
        // Every delivery failure is a transport failure, whatever raised it
        let delivered = match tokio::time::timeout_at(request.deadline, send).await {
            Ok(result) => result,
            Err(_) => {
                request.cancel.cancel();
                Err(DownloadError::TimedOut {
                    timeout: self.shared.request_timeout,
                }
                .into())
            }
        };
        if let Err(e) = delivered {
            let reply = text::send_failed(&e);
            return Err(Failure::new(Error::delivery(e), reply));
        }

        if let Some(original) = request.original_message.take()
            && let Err(e) = self
                .shared
                .transport
                .delete_message(request.chat, original)
                .await
        {
            tracing::warn!(
                request_id = request.id.0,
                chat_id = request.chat.0,
                message_id = original.0,
                error = %e,
                "Failed to delete original message"
            );
        }

        Ok(size)
    }

    /// Run the backend, bounded by the request's deadline and cancellation scope
    ///
    /// The backend future is dropped as soon as either fires, whether or not
    /// the backend itself watches the token.
    async fn download(
        &self,
        request: &DownloadRequest,
        backend: &dyn Downloader,
    ) -> crate::Result<PathBuf> {
        let cancel = request.cancel.clone();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(DownloadError::Cancelled.into()),
            _ = tokio::time::sleep_until(request.deadline) => {
                cancel.cancel();
                tracing::warn!(
                    request_id = request.id.0,
                    url = %request.url,
                    "Download deadline exceeded"
                );
                Err(DownloadError::TimedOut {
                    timeout: self.shared.request_timeout,
                }
                .into())
            }
            result = backend.download(&cancel, &request.url) => result,
        }
    }

    async fn clear_status_message(&self, request: &mut DownloadRequest) {
        if let Some(status) = request.status_message.take()
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
    }

    async fn fail(&self, request: &mut DownloadRequest, failure: Failure) {
        let category = failure.error.category();
        match category {
            FailureCategory::SizeViolation | FailureCategory::Admission => {
                tracing::warn!(
                    request_id = request.id.0,
                    chat_id = request.chat.0,
                    category = category.as_str(),
                    error = %failure.error,
                    "Request failed"
                );
            }
            _ => {
                tracing::error!(
                    request_id = request.id.0,
                    chat_id = request.chat.0,
                    category = category.as_str(),
                    error = %failure.error,
                    "Request failed"
                );
            }
        }

        self.clear_status_message(request).await;
        if let Err(e) = self
            .shared
            .transport
            .send_text(request.chat, &failure.reply)
            .await
        {
            tracing::error!(
                request_id = request.id.0,
                chat_id = request.chat.0,
                error = %e,
                "Failed to send failure reply"
            );
        }

        self.shared.emit_event(Event::RequestFailed {
            id: request.id,
            error: failure.error.to_string(),
            category: category.as_str().to_string(),
        });
    }
}
