//! Messaging transport
//!
//! The bot talks to Telegram only through the [`Transport`] trait, so the
//! dispatcher and the download orchestrator can be driven by an in-memory fake
//! in tests. [`TelegramClient`] is the Bot API implementation.
//!
//! The inbound types below mirror the subset of Bot API objects the bot reads
//! and deserialize straight from `getUpdates` responses.

mod telegram;

pub use telegram::TelegramClient;

use crate::error::Result;
use crate::types::{ChatId, MessageId, UserId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// A Telegram user or bot
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// User id (also the id of the private chat with the bot)
    pub id: UserId,
    /// Whether this is a bot account
    #[serde(default)]
    pub is_bot: bool,
    /// First name
    #[serde(default)]
    pub first_name: String,
    /// Username without the leading `@`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

/// Kind of chat a message was sent in
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    /// One-to-one chat with the bot
    Private,
    /// Basic group
    Group,
    /// Supergroup
    Supergroup,
    /// Broadcast channel
    Channel,
    /// Anything newer than this client knows about
    #[serde(other)]
    Unknown,
}

impl ChatKind {
    /// Group chats require the bot to be mentioned
    pub fn is_group(&self) -> bool {
        matches!(self, ChatKind::Group | ChatKind::Supergroup)
    }
}

/// The chat a message belongs to
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    /// Chat id
    pub id: ChatId,
    /// Chat kind
    #[serde(rename = "type")]
    pub kind: ChatKind,
}

/// A formatting or mention span inside message text
///
/// `offset` and `length` count UTF-16 code units.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEntity {
    /// Entity type, e.g. "mention" or "bot_command"
    #[serde(rename = "type")]
    pub kind: String,
    /// Start, in UTF-16 code units
    pub offset: usize,
    /// Length, in UTF-16 code units
    pub length: usize,
}

/// An inbound message
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Message id within the chat
    pub message_id: MessageId,
    /// Sender (absent for channel posts)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<User>,
    /// Chat the message was sent in
    pub chat: Chat,
    /// Text body
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Mentions, commands and formatting spans
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entities: Vec<MessageEntity>,
}

impl Message {
    /// Whether the text starts with a bot command
    pub fn is_command(&self) -> bool {
        self.entities
            .iter()
            .any(|e| e.kind == "bot_command" && e.offset == 0)
            || self.text.as_deref().is_some_and(|t| t.starts_with('/'))
    }
}

/// An inline query typed in any chat as `@bot <query>`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineQuery {
    /// Query id used to answer
    pub id: String,
    /// Querying user
    pub from: User,
    /// Query text
    #[serde(default)]
    pub query: String,
}

/// An inline result the user picked
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChosenInlineResult {
    /// Id of the picked result
    pub result_id: String,
    /// User who picked it
    pub from: User,
    /// Query that produced the result
    #[serde(default)]
    pub query: String,
}

/// One entry from `getUpdates`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Update {
    /// Monotonic update id
    pub update_id: i64,
    /// New message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
    /// New inline query
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_query: Option<InlineQuery>,
    /// Picked inline result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chosen_inline_result: Option<ChosenInlineResult>,
}

/// An inline "article" result that posts a text message when picked
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineArticle {
    /// Result id, unique within the answer
    pub id: String,
    /// Title shown in the result list
    pub title: String,
    /// Text posted when the result is picked
    pub message_text: String,
    /// Secondary line shown under the title
    pub description: Option<String>,
}

/// Answer to an inline query
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineAnswer {
    /// Query being answered
    pub query_id: String,
    /// Results to show
    pub results: Vec<InlineArticle>,
    /// Seconds Telegram may cache the answer
    pub cache_time: u32,
    /// Cache per user rather than globally
    pub is_personal: bool,
}

/// Operations the bot needs from a messaging platform
#[async_trait]
pub trait Transport: Send + Sync {
    /// Username of the bot account, without `@`
    async fn bot_username(&self) -> Result<String>;

    /// Long-poll for updates with id >= `offset`
    async fn poll_updates(&self, offset: i64, timeout: Duration) -> Result<Vec<Update>>;

    /// Send an HTML-formatted text message and return its id
    async fn send_text(&self, chat: ChatId, text: &str) -> Result<MessageId>;

    /// Upload a video file
    async fn send_video(&self, chat: ChatId, path: &Path, supports_streaming: bool) -> Result<()>;

    /// Delete a message
    async fn delete_message(&self, chat: ChatId, message: MessageId) -> Result<()>;

    /// Answer an inline query
    async fn answer_inline_query(&self, answer: &InlineAnswer) -> Result<()>;
}
