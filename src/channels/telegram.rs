//! Telegram channel: long-polls the Bot API for updates.
//!
//! Group chats map to conversations by chat id. The agent is mentioned via
//! its `@username`; private chats count as addressed to the agent.

use std::sync::OnceLock;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde_json::Value;

use crate::channels::{Channel, IncomingMessage, MessageStream, OutgoingResponse, StatusUpdate};
use crate::error::ChannelError;

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

/// The bot account, as reported by `getMe`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotIdentity {
    pub id: String,
    pub username: String,
}

impl BotIdentity {
    fn from_get_me(data: &Value) -> Option<Self> {
        let result = data.get("result")?;
        Some(Self {
            id: result.get("id")?.as_i64()?.to_string(),
            username: result.get("username")?.as_str()?.to_string(),
        })
    }

    pub fn mention(&self) -> String {
        format!("@{}", self.username)
    }
}

/// Telegram Bot API channel using long-polling.
pub struct TelegramChannel {
    bot_token: String,
    client: reqwest::Client,
    identity: OnceLock<BotIdentity>,
}

impl TelegramChannel {
    pub fn new(bot_token: String) -> Self {
        Self {
            bot_token,
            client: reqwest::Client::new(),
            identity: OnceLock::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!("https://api.telegram.org/bot{}/{method}", self.bot_token)
    }

    fn send_failed(reason: impl Into<String>) -> ChannelError {
        ChannelError::SendFailed {
            name: "telegram".into(),
            reason: reason.into(),
        }
    }

    /// Look up the bot account.
    async fn get_me(&self) -> Result<BotIdentity, ChannelError> {
        let startup_failed = |reason: String| ChannelError::StartupFailed {
            name: "telegram".into(),
            reason,
        };

        let resp = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| startup_failed(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(startup_failed(format!("getMe returned {}", resp.status())));
        }
        let data: Value = resp
            .json()
            .await
            .map_err(|e| startup_failed(e.to_string()))?;
        BotIdentity::from_get_me(&data)
            .ok_or_else(|| startup_failed("getMe response has no id/username".into()))
    }

    /// Send a text message, trying Markdown first with plain text fallback.
    /// Splits long messages that exceed Telegram's 4096 char limit.
    async fn send_message(
        &self,
        chat_id: &str,
        text: &str,
        reply_to: Option<i64>,
    ) -> Result<(), ChannelError> {
        let chunks = split_message(text, TELEGRAM_MAX_MESSAGE_LENGTH);

        // Only the first chunk is threaded as a reply.
        for (i, chunk) in chunks.iter().enumerate() {
            let reply_to = if i == 0 { reply_to } else { None };
            self.send_message_chunk(chat_id, chunk, reply_to).await?;
        }
        Ok(())
    }

    /// Send a single message chunk (≤4096 chars), Markdown-first with fallback.
    async fn send_message_chunk(
        &self,
        chat_id: &str,
        text: &str,
        reply_to: Option<i64>,
    ) -> Result<(), ChannelError> {
        let markdown_body = message_body(chat_id, text, reply_to, Some("Markdown"));

        let markdown_resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&markdown_body)
            .send()
            .await
            .map_err(|e| Self::send_failed(e.to_string()))?;

        if markdown_resp.status().is_success() {
            return Ok(());
        }

        let markdown_status = markdown_resp.status();
        tracing::warn!(
            status = ?markdown_status,
            "Telegram sendMessage with Markdown failed; retrying without parse_mode"
        );

        let plain_body = message_body(chat_id, text, reply_to, None);
        let plain_resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&plain_body)
            .send()
            .await
            .map_err(|e| Self::send_failed(e.to_string()))?;

        if !plain_resp.status().is_success() {
            let plain_err = plain_resp.text().await.unwrap_or_default();
            return Err(Self::send_failed(format!(
                "sendMessage failed (markdown: {markdown_status}, plain: {plain_err})"
            )));
        }

        Ok(())
    }

    /// Upload a photo from memory.
    async fn send_photo_bytes(
        &self,
        chat_id: &str,
        file_bytes: Vec<u8>,
        file_name: &str,
    ) -> Result<(), ChannelError> {
        let part = Part::bytes(file_bytes).file_name(file_name.to_string());
        let form = Form::new()
            .text("chat_id", chat_id.to_string())
            .part("photo", part);

        let resp = self
            .client
            .post(self.api_url("sendPhoto"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| Self::send_failed(e.to_string()))?;

        if !resp.status().is_success() {
            let err = resp.text().await.unwrap_or_default();
            return Err(Self::send_failed(format!("sendPhoto failed: {err}")));
        }

        tracing::info!(chat_id = %chat_id, file_name = %file_name, "Telegram photo sent");
        Ok(())
    }
}

fn chat_id_of(msg: &IncomingMessage) -> Result<&str, ChannelError> {
    msg.metadata
        .get("chat_id")
        .and_then(Value::as_str)
        .ok_or_else(|| TelegramChannel::send_failed("No chat_id in message metadata"))
}

// ── Channel trait implementation ────────────────────────────────────

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    fn self_id(&self) -> Option<String> {
        self.identity.get().map(|identity| identity.id.clone())
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let identity = self.get_me().await?;
        tracing::info!(username = %identity.username, id = %identity.id, "Telegram bot identity");
        let identity = self.identity.get_or_init(|| identity).clone();

        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let url = self.api_url("getUpdates");
        let client = self.client.clone();

        tokio::spawn(async move {
            let mut offset: i64 = 0;

            tracing::info!("Telegram channel listening for messages...");

            loop {
                let body = serde_json::json!({
                    "offset": offset,
                    "timeout": 30,
                    "allowed_updates": ["message"]
                });

                let resp = match client.post(&url).json(&body).send().await {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!("Telegram poll error: {e}");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        continue;
                    }
                };

                let data: Value = match resp.json().await {
                    Ok(d) => d,
                    Err(e) => {
                        tracing::warn!("Telegram parse error: {e}");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        continue;
                    }
                };

                let Some(results) = data.get("result").and_then(Value::as_array) else {
                    continue;
                };

                for update in results {
                    // Advance offset past this update
                    if let Some(uid) = update.get("update_id").and_then(Value::as_i64) {
                        offset = uid + 1;
                    }

                    let Some(incoming) = parse_update(update, &identity) else {
                        continue;
                    };

                    if tx.send(incoming).is_err() {
                        tracing::info!("Telegram listener channel closed");
                        return;
                    }
                }
            }
        });

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn respond(
        &self,
        msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError> {
        let chat_id = chat_id_of(msg)?;
        let reply_to = msg.metadata.get("message_id").and_then(Value::as_i64);
        self.send_message(chat_id, &response.content, reply_to).await
    }

    async fn send_image(
        &self,
        msg: &IncomingMessage,
        image: Vec<u8>,
        file_name: &str,
    ) -> Result<(), ChannelError> {
        let chat_id = chat_id_of(msg)?;
        self.send_photo_bytes(chat_id, image, file_name).await
    }

    async fn send_status(&self, status: StatusUpdate, metadata: &Value) -> Result<(), ChannelError> {
        if let Some(chat_id) = metadata.get("chat_id").and_then(Value::as_str) {
            match status {
                StatusUpdate::Typing => {
                    // Best effort; a missing indicator isn't worth failing the turn.
                    let _ = self
                        .client
                        .post(self.api_url("sendChatAction"))
                        .json(&serde_json::json!({
                            "chat_id": chat_id,
                            "action": "typing"
                        }))
                        .send()
                        .await;
                }
                StatusUpdate::Status(ref msg) if !msg.is_empty() => {
                    let _ = self.send_message(chat_id, &format!("ℹ️ {msg}"), None).await;
                }
                StatusUpdate::Status(_) => {}
            }
        }
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        self.get_me().await.map(|_| ())
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        tracing::info!("Telegram channel shutting down");
        Ok(())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn message_body(chat_id: &str, text: &str, reply_to: Option<i64>, parse_mode: Option<&str>) -> Value {
    let mut body = serde_json::json!({
        "chat_id": chat_id,
        "text": text,
    });
    if let Some(mode) = parse_mode {
        body["parse_mode"] = Value::from(mode);
    }
    if let Some(message_id) = reply_to {
        body["reply_to_message_id"] = Value::from(message_id);
    }
    body
}

/// Convert one `getUpdates` entry into an [`IncomingMessage`].
///
/// Returns `None` for updates without a text message.
fn parse_update(update: &Value, identity: &BotIdentity) -> Option<IncomingMessage> {
    let message = update.get("message")?;
    let text = message.get("text").and_then(Value::as_str)?;

    let from = message.get("from");
    let user_id = from
        .and_then(|f| f.get("id"))
        .and_then(Value::as_i64)
        .map(|id| id.to_string())?;
    let username = from
        .and_then(|f| f.get("username"))
        .and_then(Value::as_str);
    let first_name = from
        .and_then(|f| f.get("first_name"))
        .and_then(Value::as_str);
    let is_bot = from
        .and_then(|f| f.get("is_bot"))
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let chat = message.get("chat");
    let chat_id = chat
        .and_then(|c| c.get("id"))
        .and_then(Value::as_i64)
        .map(|id| id.to_string())?;
    let is_private = chat
        .and_then(|c| c.get("type"))
        .and_then(Value::as_str)
        == Some("private");
    let chat_name = chat
        .and_then(|c| c.get("title").or_else(|| c.get("username")))
        .and_then(Value::as_str)
        .map(String::from);

    let mention = identity.mention();
    let mentioned = is_private || mentions_in(message, text).any(|m| m.eq_ignore_ascii_case(&mention));

    let mut metadata = serde_json::json!({
        "chat_id": chat_id,
        "message_id": message.get("message_id").and_then(Value::as_i64),
    });
    if let Some(username) = username {
        metadata["author_mention"] = Value::from(format!("@{username}"));
    }

    let mut incoming = IncomingMessage::new("telegram", user_id, text)
        .with_chat(chat_id, chat_name)
        .with_bot_mention(mention, mentioned)
        .from_bot(is_bot)
        .with_metadata(metadata);
    if let Some(name) = username.or(first_name) {
        incoming = incoming.with_user_name(name);
    }
    Some(incoming)
}

/// Text of every `mention` entity in a message. Entity offsets are UTF-16.
fn mentions_in<'a>(message: &'a Value, text: &'a str) -> impl Iterator<Item = String> + 'a {
    message
        .get("entities")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter(|e| e.get("type").and_then(Value::as_str) == Some("mention"))
        .filter_map(move |e| {
            let offset = e.get("offset")?.as_u64()? as usize;
            let length = e.get("length")?.as_u64()? as usize;
            let units: Vec<u16> = text.encode_utf16().skip(offset).take(length).collect();
            Some(String::from_utf16_lossy(&units))
        })
}

/// Split a message into chunks that fit Telegram's character limit.
/// Tries to split on newlines, then spaces, then hard-cuts.
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        // Largest char boundary within the limit
        let mut limit = max_len;
        while !remaining.is_char_boundary(limit) {
            limit -= 1;
        }

        let chunk = &remaining[..limit];
        let split_at = chunk
            .rfind('\n')
            .or_else(|| chunk.rfind(' '))
            .unwrap_or(limit);

        // Don't split at position 0 (infinite loop guard)
        let split_at = if split_at == 0 { limit } else { split_at };

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{TriggerSet, Triggers};
    use crate::parsing::MessageParser;

    fn identity() -> BotIdentity {
        BotIdentity {
            id: "999".into(),
            username: "agent_bot".into(),
        }
    }

    fn group_update(text: &str, entities: Value) -> Value {
        serde_json::json!({
            "update_id": 1,
            "message": {
                "message_id": 55,
                "from": {"id": 42, "is_bot": false, "first_name": "Alice", "username": "alice"},
                "chat": {"id": -100, "type": "supergroup", "title": "Friends"},
                "text": text,
                "entities": entities
            }
        })
    }

    #[test]
    fn telegram_channel_name() {
        let ch = TelegramChannel::new("fake-token".into());
        assert_eq!(ch.name(), "telegram");
        assert_eq!(ch.self_id(), None);
    }

    #[test]
    fn telegram_api_url() {
        let ch = TelegramChannel::new("123:ABC".into());
        assert_eq!(
            ch.api_url("getMe"),
            "https://api.telegram.org/bot123:ABC/getMe"
        );
        assert_eq!(
            ch.api_url("sendPhoto"),
            "https://api.telegram.org/bot123:ABC/sendPhoto"
        );
    }

    #[test]
    fn identity_from_get_me() {
        let data = serde_json::json!({
            "ok": true,
            "result": {"id": 999, "is_bot": true, "username": "agent_bot"}
        });
        assert_eq!(BotIdentity::from_get_me(&data), Some(identity()));
        assert_eq!(BotIdentity::from_get_me(&serde_json::json!({"ok": false})), None);
    }

    #[test]
    fn group_message_with_mention() {
        let update = group_update(
            "@agent_bot hello",
            serde_json::json!([{"type": "mention", "offset": 0, "length": 10}]),
        );
        let msg = parse_update(&update, &identity()).unwrap();
        assert_eq!(msg.channel, "telegram");
        assert_eq!(msg.user_id, "42");
        assert_eq!(msg.user_name.as_deref(), Some("alice"));
        assert_eq!(msg.chat_id, "-100");
        assert_eq!(msg.chat_name.as_deref(), Some("Friends"));
        assert_eq!(msg.bot_mention.as_deref(), Some("@agent_bot"));
        assert!(msg.mentions_bot);
        assert!(!msg.author_is_bot);
        assert_eq!(msg.metadata["chat_id"], "-100");
        assert_eq!(msg.metadata["message_id"], 55);
        assert_eq!(msg.author_mention(), "@alice");
    }

    #[test]
    fn mention_of_someone_else_does_not_count() {
        let update = group_update(
            "@other_bot hello",
            serde_json::json!([{"type": "mention", "offset": 0, "length": 10}]),
        );
        let msg = parse_update(&update, &identity()).unwrap();
        assert!(!msg.mentions_bot);
    }

    #[test]
    fn mention_offsets_are_utf16() {
        // "🙂" is two UTF-16 units.
        let update = group_update(
            "🙂 @agent_bot hi",
            serde_json::json!([{"type": "mention", "offset": 3, "length": 10}]),
        );
        assert!(parse_update(&update, &identity()).unwrap().mentions_bot);
    }

    #[test]
    fn private_chat_is_addressed() {
        let update = serde_json::json!({
            "update_id": 2,
            "message": {
                "message_id": 1,
                "from": {"id": 42, "is_bot": false, "first_name": "Alice"},
                "chat": {"id": 42, "type": "private", "first_name": "Alice"},
                "text": "hi"
            }
        });
        let msg = parse_update(&update, &identity()).unwrap();
        assert!(msg.mentions_bot);
        assert_eq!(msg.user_name.as_deref(), Some("Alice"));
        assert_eq!(msg.chat_name, None);
    }

    fn private_update(text: &str) -> Value {
        serde_json::json!({
            "update_id": 4,
            "message": {
                "message_id": 3,
                "from": {"id": 42, "is_bot": false, "first_name": "Alice"},
                "chat": {"id": 42, "type": "private", "first_name": "Alice"},
                "text": text
            }
        })
    }

    fn set(items: &[&str]) -> TriggerSet {
        TriggerSet::new(items.iter().map(|s| s.to_string()))
    }

    fn parser() -> MessageParser {
        MessageParser::new(
            Triggers {
                nicknames: set(&["Agent"]),
                greetings: set(&["hey"]),
                selfie: set(&["take a selfie"]),
                photo: set(&["send a photo of"]),
            },
            "Agent",
        )
    }

    #[test]
    fn private_chat_greeting_keeps_selfie_intent() {
        let msg = parse_update(&private_update("hey Agent take a selfie"), &identity()).unwrap();
        let parsed = parser().parse(&msg);
        assert!(parsed.should_respond);
        assert_eq!(parsed.command, "take a selfie");
        assert!(parsed.has_selfie_prompt());
    }

    #[test]
    fn private_chat_without_trigger_is_still_addressed() {
        let msg = parse_update(&private_update("how was your day?"), &identity()).unwrap();
        let parsed = parser().parse(&msg);
        assert!(parsed.should_respond);
        assert_eq!(parsed.command, "how was your day?");
        assert!(!parsed.has_image_prompt());
    }

    #[test]
    fn differently_cased_mention_is_stripped_from_command() {
        let update = group_update(
            "@Agent_Bot hi",
            serde_json::json!([{"type": "mention", "offset": 0, "length": 10}]),
        );
        let msg = parse_update(&update, &identity()).unwrap();
        let parsed = parser().parse(&msg);
        assert!(parsed.should_respond);
        assert_eq!(parsed.command, "hi");
        assert_eq!(parsed.content, "Agent hi");
    }

    #[test]
    fn bot_authors_are_flagged() {
        let update = serde_json::json!({
            "update_id": 3,
            "message": {
                "message_id": 2,
                "from": {"id": 7, "is_bot": true, "username": "other_bot"},
                "chat": {"id": -100, "type": "group", "title": "Friends"},
                "text": "Agent hi"
            }
        });
        let msg = parse_update(&update, &identity()).unwrap();
        assert!(msg.author_is_bot);
        assert_eq!(msg.author_mention(), "@other_bot");
    }

    #[test]
    fn non_text_updates_are_skipped() {
        let update = serde_json::json!({
            "update_id": 4,
            "message": {
                "message_id": 3,
                "from": {"id": 42, "is_bot": false},
                "chat": {"id": -100, "type": "group"},
                "photo": []
            }
        });
        assert!(parse_update(&update, &identity()).is_none());
        assert!(parse_update(&serde_json::json!({"update_id": 5}), &identity()).is_none());
    }

    #[test]
    fn message_body_fields() {
        let body = message_body("1", "hi", Some(9), Some("Markdown"));
        assert_eq!(body["parse_mode"], "Markdown");
        assert_eq!(body["reply_to_message_id"], 9);
        let body = message_body("1", "hi", None, None);
        assert!(body.get("parse_mode").is_none());
        assert!(body.get("reply_to_message_id").is_none());
    }

    #[test]
    fn chat_id_is_required_to_reply() {
        let msg = IncomingMessage::new("telegram", "42", "hi");
        assert!(chat_id_of(&msg).is_err());
    }

    // ── Message splitting tests ─────────────────────────────────────

    #[test]
    fn split_short_message_unchanged() {
        assert_eq!(split_message("hello", 4096), vec!["hello"]);
    }

    #[test]
    fn split_prefers_newlines() {
        let text = format!("{}\n{}", "a".repeat(10), "b".repeat(10));
        let chunks = split_message(&text, 15);
        assert_eq!(chunks, vec!["a".repeat(10), "b".repeat(10)]);
    }

    #[test]
    fn split_falls_back_to_spaces() {
        let text = format!("{} {}", "a".repeat(10), "b".repeat(10));
        let chunks = split_message(&text, 15);
        assert_eq!(chunks, vec!["a".repeat(10), "b".repeat(10)]);
    }

    #[test]
    fn split_hard_cuts_without_whitespace() {
        let text = "a".repeat(25);
        let chunks = split_message(&text, 10);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.len() <= 10));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn split_respects_char_boundaries() {
        let text = "é".repeat(10);
        let chunks = split_message(&text, 5);
        assert!(chunks.iter().all(|c| c.len() <= 5));
        assert_eq!(chunks.concat(), text);
    }
}
