//! Shared test helpers: an in-memory transport and scripted backends.

use crate::backends::Downloader;
use crate::config::DownloadConfig;
use crate::downloader::DownloadOrchestrator;
use crate::error::{DownloadError, Error, Result};
use crate::router::BackendRegistry;
use crate::transport::{
    Chat, ChatKind, ChosenInlineResult, InlineAnswer, InlineQuery, Message, MessageEntity,
    Transport, Update, User,
};
use crate::types::{ChatId, Event, MessageId, Platform, UserId};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// One call made through [`RecordingTransport`]
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Call {
    Text {
        chat: ChatId,
        text: String,
        id: MessageId,
    },
    Video {
        chat: ChatId,
        path: PathBuf,
        size: u64,
        supports_streaming: bool,
    },
    Delete {
        chat: ChatId,
        message: MessageId,
    },
    Inline(InlineAnswer),
}

/// Transport fake that records every call and replays scripted update batches
pub(crate) struct RecordingTransport {
    username: String,
    calls: Mutex<Vec<Call>>,
    next_message_id: AtomicI64,
    updates: Mutex<VecDeque<Result<Vec<Update>>>>,
    offsets: Mutex<Vec<i64>>,
    pub(crate) polls: AtomicUsize,
    pub(crate) fail_video: AtomicBool,
    pub(crate) video_delay: Mutex<Option<Duration>>,
}

impl RecordingTransport {
    pub(crate) fn new() -> Arc<Self> {
        Self::with_username("reels_bot")
    }

    pub(crate) fn with_username(username: &str) -> Arc<Self> {
        Arc::new(Self {
            username: username.to_string(),
            calls: Mutex::new(Vec::new()),
            next_message_id: AtomicI64::new(1000),
            updates: Mutex::new(VecDeque::new()),
            offsets: Mutex::new(Vec::new()),
            polls: AtomicUsize::new(0),
            fail_video: AtomicBool::new(false),
            video_delay: Mutex::new(None),
        })
    }

    /// Queue a batch (or an error) for the next poll
    pub(crate) fn push_updates(&self, batch: Result<Vec<Update>>) {
        self.updates.lock().unwrap().push_back(batch);
    }

    /// Offsets passed to each poll, in order
    pub(crate) fn offsets(&self) -> Vec<i64> {
        self.offsets.lock().unwrap().clone()
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn texts(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Text { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn videos(&self) -> Vec<(ChatId, PathBuf, u64)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Video {
                    chat, path, size, ..
                } => Some((chat, path, size)),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn deleted(&self) -> Vec<MessageId> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Delete { message, .. } => Some(message),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn inline_answers(&self) -> Vec<InlineAnswer> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Inline(answer) => Some(answer),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn bot_username(&self) -> Result<String> {
        Ok(self.username.clone())
    }

    async fn poll_updates(&self, offset: i64, timeout: Duration) -> Result<Vec<Update>> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        self.offsets.lock().unwrap().push(offset);
        let next = self.updates.lock().unwrap().pop_front();
        match next {
            Some(batch) => batch,
            None => {
                tokio::time::sleep(timeout.min(Duration::from_millis(20))).await;
                Ok(Vec::new())
            }
        }
    }

    async fn send_text(&self, chat: ChatId, text: &str) -> Result<MessageId> {
        let id = MessageId(self.next_message_id.fetch_add(1, Ordering::SeqCst));
        self.record(Call::Text {
            chat,
            text: text.to_string(),
            id,
        });
        Ok(id)
    }

    async fn send_video(&self, chat: ChatId, path: &Path, supports_streaming: bool) -> Result<()> {
        let delay = *self.video_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_video.load(Ordering::SeqCst) {
            return Err(Error::Telegram {
                method: "sendVideo".into(),
                description: "Request Entity Too Large".into(),
                code: Some(413),
            });
        }
        let size = std::fs::metadata(path)?.len();
        self.record(Call::Video {
            chat,
            path: path.to_path_buf(),
            size,
            supports_streaming,
        });
        Ok(())
    }

    async fn delete_message(&self, chat: ChatId, message: MessageId) -> Result<()> {
        self.record(Call::Delete { chat, message });
        Ok(())
    }

    async fn answer_inline_query(&self, answer: &InlineAnswer) -> Result<()> {
        self.record(Call::Inline(answer.clone()));
        Ok(())
    }
}

/// Writes a sparse file of a fixed size into the temp dir
pub(crate) struct FileBackend {
    pub(crate) dir: PathBuf,
    pub(crate) size: u64,
    pub(crate) calls: AtomicUsize,
}

impl FileBackend {
    pub(crate) fn new(dir: &Path, size: u64) -> Arc<Self> {
        Arc::new(Self {
            dir: dir.to_path_buf(),
            size,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Downloader for FileBackend {
    async fn download(&self, _cancel: &CancellationToken, _url: &str) -> Result<PathBuf> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let path = self
            .dir
            .join(format!("fake_{}.mp4", uuid::Uuid::new_v4().simple()));
        let file = std::fs::File::create(&path)?;
        file.set_len(self.size)?;
        Ok(path)
    }

    fn name(&self) -> &'static str {
        "fake-file"
    }
}

/// Always fails with the given reason
pub(crate) struct FailingBackend(pub(crate) &'static str);

#[async_trait]
impl Downloader for FailingBackend {
    async fn download(&self, _cancel: &CancellationToken, _url: &str) -> Result<PathBuf> {
        Err(DownloadError::Backend {
            platform: Platform::YouTube,
            reason: self.0.to_string(),
        }
        .into())
    }

    fn name(&self) -> &'static str {
        "fake-failing"
    }
}

/// Sleeps far past any test deadline and never looks at the token
pub(crate) struct StubbornBackend;

#[async_trait]
impl Downloader for StubbornBackend {
    async fn download(&self, _cancel: &CancellationToken, _url: &str) -> Result<PathBuf> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Err(Error::Other("stubborn backend woke up".into()))
    }

    fn name(&self) -> &'static str {
        "fake-stubborn"
    }
}

/// Blocks until a permit is released, then writes a small file
pub(crate) struct GatedBackend {
    pub(crate) dir: PathBuf,
    pub(crate) release: Semaphore,
    pub(crate) started: AtomicUsize,
    pub(crate) saw_cancel: AtomicBool,
}

impl GatedBackend {
    pub(crate) fn new(dir: &Path) -> Arc<Self> {
        Arc::new(Self {
            dir: dir.to_path_buf(),
            release: Semaphore::new(0),
            started: AtomicUsize::new(0),
            saw_cancel: AtomicBool::new(false),
        })
    }

    pub(crate) async fn wait_started(&self, expected: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.started.load(Ordering::SeqCst) < expected {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("backend was not invoked in time");
    }
}

#[async_trait]
impl Downloader for GatedBackend {
    async fn download(&self, cancel: &CancellationToken, _url: &str) -> Result<PathBuf> {
        self.started.fetch_add(1, Ordering::SeqCst);
        tokio::select! {
            _ = cancel.cancelled() => {
                self.saw_cancel.store(true, Ordering::SeqCst);
                Err(DownloadError::Cancelled.into())
            }
            permit = self.release.acquire() => {
                permit.map_err(|e| Error::Other(e.to_string()))?.forget();
                let path = self.dir.join(format!("gated_{}.mp4", uuid::Uuid::new_v4().simple()));
                std::fs::write(&path, b"gated")?;
                Ok(path)
            }
        }
    }

    fn name(&self) -> &'static str {
        "fake-gated"
    }
}

/// Panics on every call
pub(crate) struct PanickingBackend;

#[async_trait]
impl Downloader for PanickingBackend {
    async fn download(&self, _cancel: &CancellationToken, _url: &str) -> Result<PathBuf> {
        panic!("backend exploded");
    }

    fn name(&self) -> &'static str {
        "fake-panicking"
    }
}

/// Returns a path that is not inside the temp dir
pub(crate) struct OutsideBackend {
    pub(crate) path: PathBuf,
}

#[async_trait]
impl Downloader for OutsideBackend {
    async fn download(&self, _cancel: &CancellationToken, _url: &str) -> Result<PathBuf> {
        Ok(self.path.clone())
    }

    fn name(&self) -> &'static str {
        "fake-outside"
    }
}

/// Settings for [`create_test_orchestrator`]
pub(crate) struct TestSetup {
    pub(crate) workers: usize,
    pub(crate) timeout: Duration,
    pub(crate) max_video_size_mb: i64,
}

impl Default for TestSetup {
    fn default() -> Self {
        Self {
            workers: 2,
            timeout: Duration::from_secs(10),
            max_video_size_mb: 50,
        }
    }
}

/// Temp dir used by orchestrators built with [`create_test_orchestrator`]
pub(crate) fn temp_dir_of(dir: &tempfile::TempDir) -> PathBuf {
    dir.path().join("tmp")
}

/// Registry that routes YouTube links to `backend`
pub(crate) fn youtube_only(backend: Arc<dyn Downloader>) -> BackendRegistry {
    BackendRegistry::new().with(Platform::YouTube, backend)
}

/// Build an orchestrator over `registry`.
/// Returns the orchestrator, the transport and the tempdir (which must be kept alive).
pub(crate) fn create_test_orchestrator(
    dir: tempfile::TempDir,
    registry: BackendRegistry,
    setup: TestSetup,
) -> (DownloadOrchestrator, Arc<RecordingTransport>, tempfile::TempDir) {
    let transport = RecordingTransport::new();
    let config = DownloadConfig {
        temp_dir: temp_dir_of(&dir),
        max_video_size_mb: setup.max_video_size_mb,
        worker_pool_size: setup.workers,
        request_timeout: setup.timeout,
        ..DownloadConfig::default()
    };
    let (event_tx, _rx) = tokio::sync::broadcast::channel(1000);

    let orchestrator =
        DownloadOrchestrator::new(&config, registry, transport.clone(), event_tx).unwrap();
    (orchestrator, transport, dir)
}

/// A fresh tempdir with the orchestrator's temp subdirectory already created
pub(crate) fn prepared_dir() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(temp_dir_of(&dir)).unwrap();
    dir
}

/// Collect events until `done` matches one, or panic after five seconds
pub(crate) async fn collect_until(
    events: &mut tokio::sync::broadcast::Receiver<Event>,
    mut done: impl FnMut(&Event) -> bool,
) -> Vec<Event> {
    let mut seen = Vec::new();
    let finished = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let finished = done(&event);
                    seen.push(event);
                    if finished {
                        break;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    })
    .await;
    if finished.is_err() {
        panic!("timed out waiting for event; saw {:?}", seen);
    }
    seen
}

// -----------------------------------------------------------------------
// Update builders
// -----------------------------------------------------------------------

pub(crate) fn user(id: i64) -> User {
    User {
        id: UserId(id),
        is_bot: false,
        first_name: format!("user{}", id),
        username: Some(format!("user{}", id)),
    }
}

fn message_in(chat: Chat, from: i64, message_id: i64, text: &str) -> Message {
    let mut entities = Vec::new();
    if text.starts_with('/') {
        let length = text
            .split_whitespace()
            .next()
            .map(|cmd| cmd.encode_utf16().count())
            .unwrap_or(0);
        entities.push(MessageEntity {
            kind: "bot_command".into(),
            offset: 0,
            length,
        });
    }
    Message {
        message_id: MessageId(message_id),
        from: Some(user(from)),
        chat,
        text: Some(text.to_string()),
        entities,
    }
}

/// Private-chat message; the chat id equals the sender id
pub(crate) fn private_message(from: i64, message_id: i64, text: &str) -> Message {
    let chat = Chat {
        id: ChatId(from),
        kind: ChatKind::Private,
    };
    message_in(chat, from, message_id, text)
}

/// Supergroup message with `mention` entities computed from the text
pub(crate) fn group_message(chat: i64, from: i64, message_id: i64, text: &str) -> Message {
    let chat = Chat {
        id: ChatId(chat),
        kind: ChatKind::Supergroup,
    };
    let mut message = message_in(chat, from, message_id, text);
    let mut offset = 0;
    for word in text.split(' ') {
        let length = word.encode_utf16().count();
        if word.starts_with('@') {
            message.entities.push(MessageEntity {
                kind: "mention".into(),
                offset,
                length,
            });
        }
        offset += length + 1;
    }
    message
}

pub(crate) fn message_update(update_id: i64, message: Message) -> Update {
    Update {
        update_id,
        message: Some(message),
        inline_query: None,
        chosen_inline_result: None,
    }
}

pub(crate) fn inline_update(update_id: i64, from: i64, query: &str) -> Update {
    Update {
        update_id,
        message: None,
        inline_query: Some(InlineQuery {
            id: format!("q{}", update_id),
            from: user(from),
            query: query.to_string(),
        }),
        chosen_inline_result: None,
    }
}

pub(crate) fn chosen_update(update_id: i64, from: i64, query: &str) -> Update {
    Update {
        update_id,
        message: None,
        inline_query: None,
        chosen_inline_result: Some(ChosenInlineResult {
            result_id: format!("q{}-download", update_id),
            from: user(from),
            query: query.to_string(),
        }),
    }
}

/// Update with no payload the bot understands
pub(crate) fn empty_update(update_id: i64) -> Update {
    Update {
        update_id,
        message: None,
        inline_query: None,
        chosen_inline_result: None,
    }
}
