use super::{Channel, ChannelMessage};
use crate::error::TransportError;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

const DEFAULT_BASE_URL: &str = "https://api.telegram.org";
const LONG_POLL_SECS: u64 = 30;
const POLL_RETRY_SECS: u64 = 5;
const IMAGE_FALLBACK_TEXT: &str = "What's in this image?";

/// Telegram Bot API front end: long-polled `getUpdates` in, `sendMessage`
/// out, `sendChatAction` for typing feedback while tools run.
pub struct TelegramChannel {
    bot_token: String,
    allowed_users: Vec<String>,
    broadcast_chat_ids: Vec<String>,
    client: reqwest::Client,
    base_url: String,
}

impl TelegramChannel {
    pub fn new(
        bot_token: String,
        allowed_users: Vec<String>,
        broadcast_chat_ids: Vec<String>,
    ) -> anyhow::Result<Self> {
        // Request timeout must outlast the long poll.
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(LONG_POLL_SECS + 20))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| TransportError::Connection {
                channel: "telegram".to_string(),
                message: e.to_string(),
            })?;

        Ok(Self {
            bot_token,
            allowed_users,
            broadcast_chat_ids,
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    #[cfg(test)]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.base_url, self.bot_token)
    }

    fn file_url(&self, file_path: &str) -> String {
        format!("{}/file/bot{}/{file_path}", self.base_url, self.bot_token)
    }

    /// Empty allowlist means everyone is allowed.
    fn is_any_user_allowed<'a, I>(&self, identities: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        if self.allowed_users.is_empty() {
            return true;
        }
        identities
            .into_iter()
            .any(|id| self.allowed_users.iter().any(|allowed| allowed == id))
    }

    async fn poll_updates(&self, offset: i64) -> anyhow::Result<Vec<Value>> {
        let body = json!({
            "offset": offset,
            "timeout": LONG_POLL_SECS,
            "allowed_updates": ["message"],
        });
        let reply: Value = self
            .client
            .post(self.api_url("getUpdates"))
            .json(&body)
            .send()
            .await?
            .json()
            .await?;
        Ok(reply
            .get("result")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }

    /// Resolve the largest photo size to a downloadable file URL.
    async fn resolve_photo_url(&self, message: &Value) -> Option<String> {
        let file_id = message
            .get("photo")
            .and_then(Value::as_array)
            .and_then(|sizes| sizes.last())
            .and_then(|size| size.get("file_id"))
            .and_then(Value::as_str)?;

        let reply: Value = self
            .client
            .post(self.api_url("getFile"))
            .json(&json!({"file_id": file_id}))
            .send()
            .await
            .ok()?
            .json()
            .await
            .ok()?;

        reply
            .get("result")
            .and_then(|r| r.get("file_path"))
            .and_then(Value::as_str)
            .map(|path| self.file_url(path))
    }

    /// Turn one update into a message for the agent, applying the user
    /// allowlist. Non-message updates and unsupported content are skipped.
    async fn message_from_update(&self, update: &Value) -> Option<ChannelMessage> {
        let message = update.get("message")?;

        let username = message
            .get("from")
            .and_then(|f| f.get("username"))
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        let user_id = message
            .get("from")
            .and_then(|f| f.get("id"))
            .and_then(Value::as_i64)
            .map(|id| id.to_string());

        let mut identities = vec![username];
        if let Some(ref id) = user_id {
            identities.push(id.as_str());
        }
        if !self.is_any_user_allowed(identities) {
            tracing::warn!(
                username,
                user_id = user_id.as_deref().unwrap_or("unknown"),
                "ignoring message from unauthorized user"
            );
            return None;
        }

        let chat_id = message
            .get("chat")
            .and_then(|c| c.get("id"))
            .and_then(Value::as_i64)?
            .to_string();

        let (text, image_url) = if message.get("photo").is_some() {
            let caption = message
                .get("caption")
                .and_then(Value::as_str)
                .unwrap_or(IMAGE_FALLBACK_TEXT);
            (caption.to_string(), self.resolve_photo_url(message).await)
        } else {
            let text = message.get("text").and_then(Value::as_str)?;
            (text.to_string(), None)
        };

        Some(ChannelMessage {
            id: Uuid::new_v4().to_string(),
            chat_id,
            text,
            image_url,
        })
    }

    /// Deliver scheduler-originated replies to the configured chats until
    /// the sending side closes.
    pub async fn broadcast_loop(&self, mut rx: broadcast::Receiver<String>) {
        loop {
            match rx.recv().await {
                Ok(text) => {
                    for chat_id in &self.broadcast_chat_ids {
                        if let Err(e) = self.send(&text, chat_id).await {
                            tracing::warn!(chat_id = %chat_id, error = %e, "broadcast failed");
                        }
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "broadcast receiver lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    }
}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn send(&self, message: &str, chat_id: &str) -> anyhow::Result<()> {
        let body = json!({"chat_id": chat_id, "text": message});
        let response = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response
                .text()
                .await
                .unwrap_or_else(|e| format!("<failed to read response body: {e}>"));
            return Err(TransportError::Send {
                channel: "telegram".to_string(),
                message: format!("sendMessage failed ({status}): {detail}"),
            }
            .into());
        }
        Ok(())
    }

    async fn send_typing(&self, chat_id: &str) -> anyhow::Result<()> {
        self.client
            .post(self.api_url("sendChatAction"))
            .json(&json!({"chat_id": chat_id, "action": "typing"}))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn listen(&self, tx: mpsc::Sender<ChannelMessage>) -> anyhow::Result<()> {
        let mut offset: i64 = 0;
        tracing::info!("telegram channel listening");

        loop {
            let updates = match self.poll_updates(offset).await {
                Ok(updates) => updates,
                Err(e) => {
                    tracing::warn!(error = %e, "telegram poll failed, retrying");
                    tokio::time::sleep(Duration::from_secs(POLL_RETRY_SECS)).await;
                    continue;
                }
            };

            for update in &updates {
                if let Some(update_id) = update.get("update_id").and_then(Value::as_i64) {
                    offset = update_id + 1;
                }
                let Some(message) = self.message_from_update(update).await else {
                    continue;
                };
                if tx.send(message).await.is_err() {
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn channel(server: &MockServer, allowed: Vec<String>) -> TelegramChannel {
        TelegramChannel::new("123:abc".into(), allowed, vec!["42".into()])
            .unwrap()
            .with_base_url(&server.uri())
    }

    fn text_update(update_id: i64, username: &str, text: &str) -> Value {
        json!({
            "update_id": update_id,
            "message": {
                "from": {"id": 7, "username": username},
                "chat": {"id": 42},
                "text": text
            }
        })
    }

    #[tokio::test]
    async fn text_update_becomes_channel_message() {
        let server = MockServer::start().await;
        let channel = channel(&server, vec![]);

        let message = channel
            .message_from_update(&text_update(1, "johannes", "hello"))
            .await
            .unwrap();
        assert_eq!(message.chat_id, "42");
        assert_eq!(message.text, "hello");
        assert!(message.image_url.is_none());
    }

    #[tokio::test]
    async fn disallowed_user_is_dropped() {
        let server = MockServer::start().await;
        let channel = channel(&server, vec!["someone_else".into()]);

        let message = channel
            .message_from_update(&text_update(1, "stranger", "hi"))
            .await;
        assert!(message.is_none());
    }

    #[tokio::test]
    async fn numeric_user_id_matches_allowlist() {
        let server = MockServer::start().await;
        let channel = channel(&server, vec!["7".into()]);

        let message = channel
            .message_from_update(&text_update(1, "whoever", "hi"))
            .await;
        assert!(message.is_some());
    }

    #[tokio::test]
    async fn photo_update_resolves_file_url_and_caption() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/getFile"))
            .and(body_partial_json(json!({"file_id": "big"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": {"file_path": "photos/file_9.jpg"}
            })))
            .mount(&server)
            .await;

        let channel = channel(&server, vec![]);
        let update = json!({
            "update_id": 2,
            "message": {
                "from": {"id": 7, "username": "johannes"},
                "chat": {"id": 42},
                "caption": "what plant is this?",
                "photo": [
                    {"file_id": "small", "width": 90},
                    {"file_id": "big", "width": 800}
                ]
            }
        });

        let message = channel.message_from_update(&update).await.unwrap();
        assert_eq!(message.text, "what plant is this?");
        assert_eq!(
            message.image_url.as_deref(),
            Some(format!("{}/file/bot123:abc/photos/file_9.jpg", server.uri()).as_str())
        );
    }

    #[tokio::test]
    async fn photo_without_caption_gets_fallback_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/getFile"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": {"file_path": "photos/file_1.jpg"}
            })))
            .mount(&server)
            .await;

        let channel = channel(&server, vec![]);
        let update = json!({
            "update_id": 3,
            "message": {
                "from": {"id": 7},
                "chat": {"id": 42},
                "photo": [{"file_id": "only", "width": 90}]
            }
        });

        let message = channel.message_from_update(&update).await.unwrap();
        assert_eq!(message.text, IMAGE_FALLBACK_TEXT);
    }

    #[tokio::test]
    async fn send_posts_plain_text_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendMessage"))
            .and(body_partial_json(json!({"chat_id": "42", "text": "done"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        channel(&server, vec![]).send("done", "42").await.unwrap();
    }

    #[tokio::test]
    async fn send_failure_carries_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendMessage"))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .mount(&server)
            .await;

        let err = channel(&server, vec![]).send("x", "42").await.unwrap_err();
        assert!(err.to_string().contains("403"));
    }

    #[tokio::test]
    async fn broadcast_loop_sends_to_configured_chats() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendMessage"))
            .and(body_partial_json(json!({"chat_id": "42", "text": "task done"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let channel = channel(&server, vec![]);
        let (tx, rx) = broadcast::channel(4);
        tx.send("task done".to_string()).unwrap();
        drop(tx);
        channel.broadcast_loop(rx).await;
    }

    #[tokio::test]
    async fn poll_updates_returns_result_array() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/getUpdates"))
            .and(body_partial_json(json!({"offset": 5})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": [text_update(5, "johannes", "hello")]
            })))
            .mount(&server)
            .await;

        let updates = channel(&server, vec![]).poll_updates(5).await.unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0]["update_id"], 5);
    }
}
