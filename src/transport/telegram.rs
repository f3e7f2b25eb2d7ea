//! Telegram Bot API client over reqwest

use super::{InlineAnswer, Transport, Update, User};
use crate::error::{Error, Result};
use crate::types::{ChatId, MessageId};
use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::path::Path;
use std::time::Duration;

/// Timeout for ordinary (non-polling, non-upload) calls
const CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Slack added on top of the long-poll timeout for the HTTP request itself
const POLL_SLACK: Duration = Duration::from_secs(10);

/// Update kinds requested from getUpdates
const ALLOWED_UPDATES: [&str; 3] = ["message", "inline_query", "chosen_inline_result"];

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: MessageId,
}

/// Bot API client
///
/// The bot token is part of every request URL, so network errors are stripped
/// of their URL before they are returned.
#[derive(Clone)]
pub struct TelegramClient {
    client: reqwest::Client,
    base_url: String,
}

impl TelegramClient {
    /// Create a client for `{api_url}/bot{token}/`
    pub fn new(api_url: &str, token: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Network(e.without_url()))?;

        Ok(Self {
            client,
            base_url: format!("{}/bot{}", api_url.trim_end_matches('/'), token),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{}", self.base_url, method)
    }

    async fn parse<T: DeserializeOwned>(method: &str, response: reqwest::Response) -> Result<T> {
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::Network(e.without_url()))?;

        let parsed: ApiResponse<T> = serde_json::from_slice(&body).map_err(|_| Error::Telegram {
            method: method.to_string(),
            description: format!("unexpected response with HTTP status {}", status.as_u16()),
            code: Some(i64::from(status.as_u16())),
        })?;

        match parsed {
            ApiResponse {
                ok: true,
                result: Some(result),
                ..
            } => Ok(result),
            ApiResponse {
                description,
                error_code,
                ..
            } => Err(Error::Telegram {
                method: method.to_string(),
                description: description.unwrap_or_else(|| "no description".to_string()),
                code: error_code,
            }),
        }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        payload: &serde_json::Value,
        timeout: Duration,
    ) -> Result<T> {
        let response = self
            .client
            .post(self.method_url(method))
            .json(payload)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| Error::Network(e.without_url()))?;

        Self::parse(method, response).await
    }

    /// Fetch the bot account (`getMe`)
    pub async fn get_me(&self) -> Result<User> {
        self.call("getMe", &json!({}), CALL_TIMEOUT).await
    }
}

#[async_trait]
impl Transport for TelegramClient {
    async fn bot_username(&self) -> Result<String> {
        let me = self.get_me().await?;
        me.username.ok_or_else(|| Error::Telegram {
            method: "getMe".to_string(),
            description: "bot account has no username".to_string(),
            code: None,
        })
    }

    async fn poll_updates(&self, offset: i64, timeout: Duration) -> Result<Vec<Update>> {
        let payload = json!({
            "offset": offset,
            "timeout": timeout.as_secs(),
            "allowed_updates": ALLOWED_UPDATES,
        });
        self.call("getUpdates", &payload, timeout + POLL_SLACK).await
    }

    async fn send_text(&self, chat: ChatId, text: &str) -> Result<MessageId> {
        let payload = json!({
            "chat_id": chat,
            "text": text,
            "parse_mode": "HTML",
            "disable_web_page_preview": true,
        });
        let sent: SentMessage = self.call("sendMessage", &payload, CALL_TIMEOUT).await?;
        Ok(sent.message_id)
    }

    async fn send_video(&self, chat: ChatId, path: &Path, supports_streaming: bool) -> Result<()> {
        let bytes = tokio::fs::read(path).await?;
        let size = bytes.len();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "video.mp4".to_string());

        tracing::info!(chat_id = chat.0, file = %path.display(), size, "Sending video");

        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("video/mp4")
            .map_err(|e| Error::Network(e.without_url()))?;
        let form = reqwest::multipart::Form::new()
            .text("chat_id", chat.0.to_string())
            .text("supports_streaming", supports_streaming.to_string())
            .part("video", part);

        let response = self
            .client
            .post(self.method_url("sendVideo"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::Network(e.without_url()))?;

        let _: SentMessage = Self::parse("sendVideo", response).await?;
        Ok(())
    }

    async fn delete_message(&self, chat: ChatId, message: MessageId) -> Result<()> {
        let payload = json!({ "chat_id": chat, "message_id": message });
        let _: bool = self.call("deleteMessage", &payload, CALL_TIMEOUT).await?;
        Ok(())
    }

    async fn answer_inline_query(&self, answer: &InlineAnswer) -> Result<()> {
        let results: Vec<serde_json::Value> = answer
            .results
            .iter()
            .map(|article| {
                let mut result = json!({
                    "type": "article",
                    "id": article.id,
                    "title": article.title,
                    "input_message_content": { "message_text": article.message_text },
                });
                if let Some(description) = &article.description {
                    result["description"] = json!(description);
                }
                result
            })
            .collect();

        let payload = json!({
            "inline_query_id": answer.query_id,
            "results": results,
            "cache_time": answer.cache_time,
            "is_personal": answer.is_personal,
        });
        let _: bool = self.call("answerInlineQuery", &payload, CALL_TIMEOUT).await?;
        Ok(())
    }
}

impl std::fmt::Debug for TelegramClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramClient").finish_non_exhaustive()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::InlineArticle;
    use crate::types::UserId;
    use wiremock::matchers::{body_json, body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TOKEN: &str = "123:secret";

    async fn client(server: &MockServer) -> TelegramClient {
        TelegramClient::new(&server.uri(), TOKEN).unwrap()
    }

    #[tokio::test]
    async fn bot_username_comes_from_get_me() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:secret/getMe"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": {"id": 1, "is_bot": true, "first_name": "Reels", "username": "reels_bot"}
            })))
            .mount(&server)
            .await;

        let client = client(&server).await;
        assert_eq!(client.bot_username().await.unwrap(), "reels_bot");
        assert_eq!(client.get_me().await.unwrap().id, UserId(1));
    }

    #[tokio::test]
    async fn poll_updates_sends_offset_and_allowed_updates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:secret/getUpdates"))
            .and(body_json(json!({
                "offset": 41,
                "timeout": 1,
                "allowed_updates": ["message", "inline_query", "chosen_inline_result"],
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": [
                    {"update_id": 41, "inline_query": {"id": "q1", "from": {"id": 7, "first_name": "A"}, "query": "x"}},
                    {"update_id": 42, "message": {"message_id": 3, "chat": {"id": 7, "type": "private"}, "text": "hi"}}
                ]
            })))
            .mount(&server)
            .await;

        let updates = client(&server)
            .await
            .poll_updates(41, Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].inline_query.as_ref().unwrap().id, "q1");
        assert_eq!(
            updates[1].message.as_ref().unwrap().text.as_deref(),
            Some("hi")
        );
    }

    #[tokio::test]
    async fn send_text_uses_html_and_returns_message_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:secret/sendMessage"))
            .and(body_json(json!({
                "chat_id": 55,
                "text": "<b>hi</b>",
                "parse_mode": "HTML",
                "disable_web_page_preview": true,
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": {"message_id": 901, "chat": {"id": 55, "type": "private"}}
            })))
            .mount(&server)
            .await;

        let id = client(&server)
            .await
            .send_text(ChatId(55), "<b>hi</b>")
            .await
            .unwrap();
        assert_eq!(id, MessageId(901));
    }

    #[tokio::test]
    async fn api_errors_carry_method_and_description() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:secret/deleteMessage"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "ok": false,
                "error_code": 400,
                "description": "Bad Request: message to delete not found"
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .await
            .delete_message(ChatId(1), MessageId(2))
            .await
            .unwrap_err();

        match err {
            Error::Telegram {
                method,
                description,
                code,
            } => {
                assert_eq!(method, "deleteMessage");
                assert!(description.contains("not found"));
                assert_eq!(code, Some(400));
            }
            other => panic!("expected telegram error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn non_json_response_is_a_telegram_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("<html>bad gateway</html>"))
            .mount(&server)
            .await;

        let err = client(&server).await.get_me().await.unwrap_err();
        assert!(matches!(err, Error::Telegram { code: Some(502), .. }), "{:?}", err);
    }

    #[tokio::test]
    async fn inline_answer_wire_format() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:secret/answerInlineQuery"))
            .and(body_json(json!({
                "inline_query_id": "q9",
                "results": [{
                    "type": "article",
                    "id": "q9-download",
                    "title": "Download video",
                    "input_message_content": {"message_text": "queued"},
                    "description": "YouTube, TikTok, Instagram"
                }],
                "cache_time": 0,
                "is_personal": true,
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true, "result": true})))
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .await
            .answer_inline_query(&InlineAnswer {
                query_id: "q9".into(),
                results: vec![InlineArticle {
                    id: "q9-download".into(),
                    title: "Download video".into(),
                    message_text: "queued".into(),
                    description: Some("YouTube, TikTok, Instagram".into()),
                }],
                cache_time: 0,
                is_personal: true,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn send_video_uploads_multipart_file() {
        let server = MockServer::start().await;
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("clip.mp4");
        std::fs::write(&file, b"fake-mp4-bytes").unwrap();

        Mock::given(method("POST"))
            .and(path("/bot123:secret/sendVideo"))
            .and(body_string_contains("name=\"supports_streaming\""))
            .and(body_string_contains("filename=\"clip.mp4\""))
            .and(body_string_contains("fake-mp4-bytes"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": {"message_id": 5, "chat": {"id": 9, "type": "private"}}
            })))
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .await
            .send_video(ChatId(9), &file, true)
            .await
            .unwrap();
    }

    #[test]
    fn debug_output_hides_token() {
        let client = TelegramClient::new("https://api.telegram.org", TOKEN).unwrap();
        assert!(!format!("{:?}", client).contains("secret"));
    }
}
