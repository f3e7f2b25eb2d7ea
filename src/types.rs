//! Core types and events for reelser-bot

use serde::{Deserialize, Serialize};

/// Telegram chat identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub i64);

/// Telegram user identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

/// Telegram message identifier, unique within a chat
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub i64);

/// Process-local identifier for a download request
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub u64);

impl std::fmt::Display for ChatId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<UserId> for ChatId {
    /// A user's private chat shares the user's id
    fn from(user: UserId) -> Self {
        ChatId(user.0)
    }
}

impl std::str::FromStr for UserId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// Supported video platforms, in routing priority order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// youtube.com, youtu.be
    YouTube,
    /// tiktok.com
    TikTok,
    /// instagram.com (reels, posts)
    Instagram,
}

impl Platform {
    /// All platforms in routing priority order
    pub const ALL: [Platform; 3] = [Platform::YouTube, Platform::TikTok, Platform::Instagram];

    /// Stable lowercase tag used in logs and file names
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::YouTube => "youtube",
            Platform::TikTok => "tiktok",
            Platform::Instagram => "instagram",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a download request came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestOrigin {
    /// A link sent in a private chat or a group mention
    DirectMessage,
    /// A chosen inline-mode result
    InlineMode,
}

impl RequestOrigin {
    /// Stable tag for log fields
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestOrigin::DirectMessage => "direct_message",
            RequestOrigin::InlineMode => "inline_mode",
        }
    }
}

/// Processing stage of a download request
///
/// `Enqueued -> Dequeued -> Downloading -> SizeChecking -> Delivering -> Done`,
/// with `Failed` reachable from every non-terminal stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStage {
    /// Admitted to the download queue
    Enqueued,
    /// Picked up by a worker
    Dequeued,
    /// Backend call in flight
    Downloading,
    /// Artifact being measured against the ceiling
    SizeChecking,
    /// Artifact being sent through the transport
    Delivering,
    /// Delivered successfully
    Done,
    /// Ended with an error
    Failed,
}

impl RequestStage {
    /// Whether no further transitions can happen
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestStage::Done | RequestStage::Failed)
    }
}

/// Events emitted by the bot
///
/// Subscribe via [`crate::ReelserBot::subscribe`] or
/// [`crate::downloader::DownloadOrchestrator::subscribe`].
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Request admitted to the download queue
    RequestEnqueued {
        /// Request identifier
        id: RequestId,
        /// Destination chat
        chat: ChatId,
        /// Routed platform
        platform: Platform,
        /// Where the request came from
        origin: RequestOrigin,
    },

    /// Request refused because the download queue was full
    RequestRejected {
        /// Request identifier
        id: RequestId,
        /// Destination chat
        chat: ChatId,
    },

    /// Request moved to a new non-terminal stage
    StageChanged {
        /// Request identifier
        id: RequestId,
        /// The new stage
        stage: RequestStage,
    },

    /// Request delivered
    RequestCompleted {
        /// Request identifier
        id: RequestId,
        /// Size of the delivered artifact in bytes
        size_bytes: u64,
    },

    /// Request ended with an error
    RequestFailed {
        /// Request identifier
        id: RequestId,
        /// Error message
        error: String,
        /// Failure class (see [`crate::error::FailureCategory`])
        category: String,
    },

    /// Inbound update dropped because the update queue was full
    UpdateDropped {
        /// Telegram update id
        update_id: i64,
    },
}
