//! Download orchestration split into focused submodules.
//!
//! The [`DownloadOrchestrator`] admits requests into a bounded queue and a fixed
//! pool of workers carries each one to a terminal state:
//! - [`artifact`] - Temp directory containment and file cleanup guards
//! - [`processing`] - Per-request pipeline (download, size check, delivery)
//! - [`lifecycle`] - Shutdown coordination

pub mod artifact;
mod lifecycle;
mod processing;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use artifact::{ArtifactStore, TempArtifact};

use crate::config::{DownloadConfig, TELEGRAM_MAX_VIDEO_SIZE_MB};
use crate::error::{Error, Result};
use crate::queue::{EnqueueError, WorkQueue};
use crate::router::BackendRegistry;
use crate::transport::Transport;
use crate::types::{ChatId, Event, MessageId, Platform, RequestId, RequestOrigin};
use processing::RequestProcessor;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

const MIB: u64 = 1024 * 1024;

/// Size ceiling in bytes for a configured limit in megabytes
///
/// Telegram refuses bot uploads above 50 MB, so non-positive or larger values
/// fall back to that.
pub fn effective_size_limit(configured_mb: i64) -> u64 {
    let telegram_limit = TELEGRAM_MAX_VIDEO_SIZE_MB as u64 * MIB;
    match u64::try_from(configured_mb) {
        Ok(mb) if mb > 0 && mb.saturating_mul(MIB) <= telegram_limit => mb * MIB,
        _ => telegram_limit,
    }
}

/// A single download job
#[derive(Debug)]
pub struct DownloadRequest {
    /// Process-local id
    pub id: RequestId,
    /// Chat the video goes to
    pub chat: ChatId,
    /// Source URL
    pub url: String,
    /// Routed platform
    pub platform: Platform,
    /// Where the request came from
    pub origin: RequestOrigin,
    /// Absolute deadline for the whole request
    pub deadline: Instant,
    /// Cancellation scope; cancelled on deadline, rejection, shutdown and completion
    pub cancel: CancellationToken,
    /// "Downloading..." status message to remove once the download settles
    pub status_message: Option<MessageId>,
    /// Triggering message, deleted after a successful delivery
    pub original_message: Option<MessageId>,
}

/// State shared between the orchestrator handle and its workers
pub(crate) struct Shared {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) registry: BackendRegistry,
    pub(crate) artifacts: ArtifactStore,
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
    /// Cancellation tokens of requests currently held by a worker
    pub(crate) active: std::sync::Mutex<HashMap<RequestId, CancellationToken>>,
    pub(crate) accepting_new: AtomicBool,
    pub(crate) size_limit: u64,
    pub(crate) request_timeout: Duration,
}

impl Shared {
    pub(crate) fn emit_event(&self, event: Event) {
        // send() returns Err if there are no receivers, which is fine - we just drop the event
        self.event_tx.send(event).ok();
    }
}

/// Bounded, concurrent download pipeline (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct DownloadOrchestrator {
    pub(crate) shared: Arc<Shared>,
    queue: Arc<WorkQueue<DownloadRequest>>,
    next_id: Arc<AtomicU64>,
}

impl DownloadOrchestrator {
    /// Create the orchestrator and start its workers
    ///
    /// Creates the temp directory if needed. The queue holds twice as many
    /// requests as there are workers.
    pub fn new(
        config: &DownloadConfig,
        registry: BackendRegistry,
        transport: Arc<dyn Transport>,
        event_tx: tokio::sync::broadcast::Sender<Event>,
    ) -> Result<Self> {
        let artifacts = ArtifactStore::open(&config.temp_dir)?;

        let shared = Arc::new(Shared {
            transport,
            registry,
            artifacts,
            event_tx,
            active: std::sync::Mutex::new(HashMap::new()),
            accepting_new: AtomicBool::new(true),
            size_limit: effective_size_limit(config.max_video_size_mb),
            request_timeout: config.request_timeout,
        });

        let processor = Arc::new(RequestProcessor::new(shared.clone()));
        let queue = WorkQueue::start("downloads", config.worker_pool_size, processor);

        tracing::info!(
            temp_dir = %shared.artifacts.root().display(),
            size_limit = shared.size_limit,
            timeout_secs = shared.request_timeout.as_secs(),
            "Download orchestrator started"
        );

        Ok(Self {
            shared,
            queue: Arc::new(queue),
            next_id: Arc::new(AtomicU64::new(1)),
        })
    }

    /// Subscribe to request lifecycle events
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.shared.event_tx.subscribe()
    }

    /// Effective size ceiling in bytes
    pub fn size_limit(&self) -> u64 {
        self.shared.size_limit
    }

    /// Maximum number of waiting requests
    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Number of requests currently held by a worker
    pub fn active_count(&self) -> usize {
        self.shared
            .active
            .lock()
            .map(|active| active.len())
            .unwrap_or(0)
    }

    /// Whether new requests are admitted
    pub fn is_accepting(&self) -> bool {
        self.shared.accepting_new.load(Ordering::SeqCst)
    }

    /// Build a request for `url`, routed and with its deadline set from now
    pub fn new_request(
        &self,
        chat: ChatId,
        url: &str,
        origin: RequestOrigin,
        status_message: Option<MessageId>,
        original_message: Option<MessageId>,
    ) -> Result<DownloadRequest> {
        let (platform, _) = self
            .shared
            .registry
            .resolve(url)
            .ok_or_else(|| Error::UnsupportedUrl(url.to_string()))?;

        Ok(DownloadRequest {
            id: RequestId(self.next_id.fetch_add(1, Ordering::Relaxed)),
            chat,
            url: url.to_string(),
            platform,
            origin,
            deadline: Instant::now() + self.shared.request_timeout,
            cancel: CancellationToken::new(),
            status_message,
            original_message,
        })
    }

    /// Admit a request without blocking
    ///
    /// Returns false when the queue is full or shutting down; the request's
    /// cancellation scope is released and the caller should tell the user.
    pub fn enqueue(&self, request: DownloadRequest) -> bool {
        let (id, chat, platform, origin) =
            (request.id, request.chat, request.platform, request.origin);

        if !self.is_accepting() {
            request.cancel.cancel();
            tracing::warn!(request_id = id.0, chat_id = chat.0, "Rejected request during shutdown");
            self.shared.emit_event(Event::RequestRejected { id, chat });
            return false;
        }

        match self.queue.try_enqueue(request) {
            Ok(()) => {
                tracing::info!(
                    request_id = id.0,
                    chat_id = chat.0,
                    platform = %platform,
                    origin = origin.as_str(),
                    "Download request enqueued"
                );
                self.shared.emit_event(Event::RequestEnqueued {
                    id,
                    chat,
                    platform,
                    origin,
                });
                true
            }
            Err(rejected) => {
                let closed = matches!(rejected, EnqueueError::Closed(_));
                let request = rejected.into_inner();
                request.cancel.cancel();
                tracing::warn!(
                    request_id = id.0,
                    chat_id = chat.0,
                    queue_capacity = self.queue.capacity(),
                    closed,
                    url = %request.url,
                    "Download queue is full"
                );
                self.shared.emit_event(Event::RequestRejected { id, chat });
                false
            }
        }
    }

    /// Route, build and enqueue a request in one step
    ///
    /// # Errors
    ///
    /// [`Error::UnsupportedUrl`] when no backend serves the URL,
    /// [`Error::ShuttingDown`] after [`DownloadOrchestrator::shutdown`], and
    /// [`Error::QueueFull`] when the queue is at capacity.
    pub fn submit(
        &self,
        chat: ChatId,
        url: &str,
        origin: RequestOrigin,
        status_message: Option<MessageId>,
        original_message: Option<MessageId>,
    ) -> Result<RequestId> {
        if !self.is_accepting() {
            return Err(Error::ShuttingDown);
        }

        let request = self.new_request(chat, url, origin, status_message, original_message)?;
        let id = request.id;

        if self.enqueue(request) {
            Ok(id)
        } else if self.is_accepting() {
            Err(Error::QueueFull {
                capacity: self.queue.capacity(),
            })
        } else {
            Err(Error::ShuttingDown)
        }
    }
}
