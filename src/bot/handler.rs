//! Update classification: messages, commands, inline queries and picked inline results.

use super::text;
use crate::auth::AuthGate;
use crate::downloader::{DownloadOrchestrator, DownloadRequest};
use crate::queue::WorkHandler;
use crate::router::{contains_url, extract_url};
use crate::transport::{
    ChosenInlineResult, InlineAnswer, InlineArticle, InlineQuery, Message, Transport, Update,
};
use crate::types::{ChatId, MessageId, RequestOrigin, UserId};
use async_trait::async_trait;
use std::sync::Arc;

/// Turns inbound updates into replies and download requests
pub(crate) struct UpdateHandler {
    transport: Arc<dyn Transport>,
    auth: Arc<AuthGate>,
    orchestrator: DownloadOrchestrator,
    bot_username: String,
}

#[async_trait]
impl WorkHandler<Update> for UpdateHandler {
    async fn handle(&self, worker_id: usize, update: Update) {
        tracing::debug!(update_id = update.update_id, worker_id, "Handling update");
        self.dispatch(update).await;
    }
}

impl UpdateHandler {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        auth: Arc<AuthGate>,
        orchestrator: DownloadOrchestrator,
        bot_username: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            auth,
            orchestrator,
            bot_username: bot_username.into(),
        }
    }

    pub(crate) async fn dispatch(&self, update: Update) {
        if let Some(message) = update.message {
            self.handle_message(message).await;
        } else if let Some(query) = update.inline_query {
            self.handle_inline_query(query).await;
        } else if let Some(chosen) = update.chosen_inline_result {
            self.handle_chosen_inline_result(chosen).await;
        } else {
            tracing::trace!(update_id = update.update_id, "Ignoring update");
        }
    }

    async fn is_unauthorized(&self, user: UserId) -> bool {
        self.auth.is_enabled() && !self.auth.is_authorized(user).await
    }

    // -----------------------------------------------------------------------
    // Messages
    // -----------------------------------------------------------------------

    async fn handle_message(&self, message: Message) {
        let chat = message.chat.id;
        let Some(from) = message.from.as_ref() else {
            tracing::warn!(chat_id = chat.0, "Received message without sender");
            return;
        };
        let user = from.id;

        tracing::info!(
            chat_id = chat.0,
            user_id = user.0,
            username = from.username.as_deref().unwrap_or(""),
            chat_type = ?message.chat.kind,
            "Received message"
        );

        if message.chat.kind.is_group() && !is_bot_mentioned(&message, &self.bot_username) {
            return;
        }

        let text = strip_bot_mention(
            message.text.as_deref().unwrap_or("").trim(),
            &self.bot_username,
        );
        let is_command = message.is_command() || text.starts_with('/');

        if self.is_unauthorized(user).await {
            self.handle_auth_flow(chat, user, &text, is_command).await;
            return;
        }

        if is_command {
            self.handle_command(chat, &text).await;
            return;
        }

        if !text.is_empty() {
            self.handle_text(chat, message.message_id, &text).await;
        }
    }

    async fn handle_auth_flow(&self, chat: ChatId, user: UserId, text: &str, is_command: bool) {
        if text.is_empty() || is_command {
            self.send(chat, text::token_required()).await;
            return;
        }

        match self.auth.authorize(user, text).await {
            Ok(()) => {
                self.send(chat, text::authorized()).await;
            }
            Err(e) => {
                tracing::debug!(
                    user_id = user.0,
                    category = e.category().as_str(),
                    error = %e,
                    "Token rejected"
                );
                self.send(chat, text::invalid_token()).await;
            }
        }
    }

    async fn handle_command(&self, chat: ChatId, text: &str) {
        let Some(command) = parse_command(text, &self.bot_username) else {
            tracing::debug!(chat_id = chat.0, "Ignoring command addressed to another bot");
            return;
        };

        let reply = match command.as_str() {
            "start" => text::greeting(),
            "help" => text::help(),
            _ => text::unknown_command(),
        };
        self.send(chat, reply).await;
    }

    async fn handle_text(&self, chat: ChatId, message_id: MessageId, text: &str) {
        if !contains_url(text) {
            self.send(chat, text::send_valid_link()).await;
            return;
        }

        let Some(url) = extract_url(text) else {
            self.send(chat, text::could_not_extract()).await;
            return;
        };

        let request = match self.orchestrator.new_request(
            chat,
            url,
            RequestOrigin::DirectMessage,
            None,
            Some(message_id),
        ) {
            Ok(request) => request,
            Err(e) => {
                tracing::info!(chat_id = chat.0, url, error = %e, "Refusing unsupported link");
                self.send(chat, &text::unsupported_platform(url)).await;
                return;
            }
        };

        self.start_download(request, text::accepted()).await;
    }

    // -----------------------------------------------------------------------
    // Inline mode
    // -----------------------------------------------------------------------

    async fn handle_inline_query(&self, query: InlineQuery) {
        let text = query.query.trim();
        let user = query.from.id;

        tracing::info!(
            query_id = %query.id,
            user_id = user.0,
            username = query.from.username.as_deref().unwrap_or(""),
            "Received inline query"
        );

        let results = if self.is_unauthorized(user).await {
            vec![InlineArticle {
                id: format!("{}-auth", query.id),
                title: text::inline_auth_title().to_string(),
                message_text: text::inline_auth_body().to_string(),
                description: None,
            }]
        } else {
            build_inline_results(&query.id, text)
        };

        let answer = InlineAnswer {
            query_id: query.id.clone(),
            results,
            cache_time: 0,
            is_personal: true,
        };
        if let Err(e) = self.transport.answer_inline_query(&answer).await {
            tracing::error!(query_id = %query.id, error = %e, "Failed to answer inline query");
        }
    }

    async fn handle_chosen_inline_result(&self, chosen: ChosenInlineResult) {
        let Some(url) = extract_url(&chosen.query) else {
            tracing::warn!(
                user_id = chosen.from.id.0,
                result_id = %chosen.result_id,
                "Chosen inline result without URL"
            );
            return;
        };

        // Inline results are delivered to the user's private chat
        let user = chosen.from.id;
        let chat = ChatId(user.0);

        if self.is_unauthorized(user).await {
            tracing::warn!(
                user_id = user.0,
                "Unauthorized user picked an inline result"
            );
            self.send(chat, text::protected_bot()).await;
            return;
        }

        let request =
            match self
                .orchestrator
                .new_request(chat, url, RequestOrigin::InlineMode, None, None)
            {
                Ok(request) => request,
                Err(e) => {
                    tracing::info!(chat_id = chat.0, url, error = %e, "Refusing unsupported link");
                    self.send(chat, &text::unsupported_platform(url)).await;
                    return;
                }
            };

        self.start_download(request, text::inline_accepted()).await;
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// Post the status message and hand the request to the download queue
    async fn start_download(&self, mut request: DownloadRequest, status_text: &str) {
        let chat = request.chat;
        let status = self.send(chat, status_text).await;
        request.status_message = status;

        if self.orchestrator.enqueue(request) {
            return;
        }

        if let Some(status) = status {
            self.delete(chat, status).await;
        }
        let reply = if self.orchestrator.is_accepting() {
            text::overloaded()
        } else {
            text::shutting_down()
        };
        self.send(chat, reply).await;
    }

    async fn send(&self, chat: ChatId, text: &str) -> Option<MessageId> {
        match self.transport.send_text(chat, text).await {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::error!(chat_id = chat.0, error = %e, "Failed to send message");
                None
            }
        }
    }

    async fn delete(&self, chat: ChatId, message: MessageId) {
        if let Err(e) = self.transport.delete_message(chat, message).await {
            tracing::warn!(
                chat_id = chat.0,
                message_id = message.0,
                error = %e,
                "Failed to delete message"
            );
        }
    }
}

/// Whether a group message addresses the bot
///
/// Checks `mention` entities first (offsets are UTF-16 code units), then falls
/// back to a case-insensitive search of the text.
pub(crate) fn is_bot_mentioned(message: &Message, bot_username: &str) -> bool {
    if bot_username.is_empty() {
        return false;
    }
    let Some(text) = message.text.as_deref().filter(|t| !t.is_empty()) else {
        return false;
    };

    let target = format!("@{}", bot_username);
    let by_entity = message
        .entities
        .iter()
        .filter(|entity| entity.kind == "mention")
        .filter_map(|entity| utf16_slice(text, entity.offset, entity.length))
        .any(|mention| mention.eq_ignore_ascii_case(&target));

    by_entity || text.to_lowercase().contains(&target.to_lowercase())
}

/// Remove standalone `@bot` words and collapse whitespace
pub(crate) fn strip_bot_mention(text: &str, bot_username: &str) -> String {
    if bot_username.is_empty() {
        return text.to_string();
    }
    let target = format!("@{}", bot_username);
    text.split_whitespace()
        .filter(|word| !word.eq_ignore_ascii_case(&target))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Command name without the slash or `@bot` suffix
///
/// Returns `None` when the command is addressed to a different bot.
pub(crate) fn parse_command(text: &str, bot_username: &str) -> Option<String> {
    let first = text.split_whitespace().next()?;
    let name = first.strip_prefix('/')?;
    let command = match name.split_once('@') {
        Some((command, target)) => {
            if !target.eq_ignore_ascii_case(bot_username) {
                return None;
            }
            command
        }
        None => name,
    };
    Some(command.to_lowercase())
}

fn build_inline_results(query_id: &str, query: &str) -> Vec<InlineArticle> {
    let description = Some(text::inline_description().to_string());
    match extract_url(query).filter(|url| contains_url(url)) {
        Some(url) => vec![InlineArticle {
            id: format!("{}-download", query_id),
            title: text::inline_download_title().to_string(),
            message_text: text::inline_download_body(url),
            description,
        }],
        None => vec![InlineArticle {
            id: format!("{}-help", query_id),
            title: text::inline_help_title().to_string(),
            message_text: text::inline_help_body().to_string(),
            description,
        }],
    }
}

fn utf16_slice(text: &str, offset: usize, length: usize) -> Option<String> {
    let units: Vec<u16> = text.encode_utf16().collect();
    let end = offset.checked_add(length)?;
    units.get(offset..end).map(String::from_utf16_lossy)
}
