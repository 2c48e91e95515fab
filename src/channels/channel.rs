//! Channel trait and the message types that cross it.

use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;
use uuid::Uuid;

use crate::error::ChannelError;

/// Stream of inbound messages produced by a channel.
pub type MessageStream = Pin<Box<dyn Stream<Item = IncomingMessage> + Send>>;

/// A message received from a transport.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    /// Locally generated message id.
    pub id: Uuid,
    /// Name of the channel that produced this message, e.g. "telegram".
    pub channel: String,
    /// Author id as the transport reports it.
    pub user_id: String,
    /// Author display name.
    pub user_name: Option<String>,
    /// Whether the author is itself a bot account.
    pub author_is_bot: bool,
    /// Conversation id within the transport (chat, room, channel).
    pub chat_id: String,
    /// Conversation display name.
    pub chat_name: Option<String>,
    /// Raw message text.
    pub content: String,
    /// The agent's mention token in this transport, e.g. `@agent_bot`.
    pub bot_mention: Option<String>,
    /// The transport detected a mention of the agent.
    pub mentions_bot: bool,
    pub received_at: DateTime<Utc>,
    /// Transport-specific data needed to reply.
    pub metadata: serde_json::Value,
}

impl IncomingMessage {
    pub fn new(
        channel: impl Into<String>,
        user_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            channel: channel.into(),
            user_id: user_id.into(),
            user_name: None,
            author_is_bot: false,
            chat_id: String::new(),
            chat_name: None,
            content: content.into(),
            bot_mention: None,
            mentions_bot: false,
            received_at: Utc::now(),
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_user_name(mut self, name: impl Into<String>) -> Self {
        self.user_name = Some(name.into());
        self
    }

    pub fn with_chat(mut self, id: impl Into<String>, name: Option<String>) -> Self {
        self.chat_id = id.into();
        self.chat_name = name;
        self
    }

    pub fn with_bot_mention(mut self, token: impl Into<String>, mentioned: bool) -> Self {
        self.bot_mention = Some(token.into());
        self.mentions_bot = mentioned;
        self
    }

    pub fn from_bot(mut self, is_bot: bool) -> Self {
        self.author_is_bot = is_bot;
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Text that mentions the author, used when replying to other bots.
    pub fn author_mention(&self) -> String {
        match self.metadata.get("author_mention").and_then(|v| v.as_str()) {
            Some(mention) => mention.to_string(),
            None => format!("@{}", self.user_name.as_deref().unwrap_or(&self.user_id)),
        }
    }
}

/// A reply to send back on the originating channel.
#[derive(Debug, Clone)]
pub struct OutgoingResponse {
    pub content: String,
}

impl OutgoingResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

/// Transient status shown to users while a reply is being produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusUpdate {
    /// The agent is composing a reply.
    Typing,
    /// Free-form status text.
    Status(String),
}

/// A chat transport.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Stable lowercase name, unique across registered channels.
    fn name(&self) -> &str;

    /// The agent's own user id on this transport, once known.
    fn self_id(&self) -> Option<String> {
        None
    }

    /// Start receiving messages.
    async fn start(&self) -> Result<MessageStream, ChannelError>;

    /// Send a text reply to the conversation `msg` came from.
    async fn respond(
        &self,
        msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError>;

    /// Post an image to the conversation `msg` came from.
    async fn send_image(
        &self,
        msg: &IncomingMessage,
        image: Vec<u8>,
        file_name: &str,
    ) -> Result<(), ChannelError>;

    /// Show a status indicator. Channels that can't display it ignore it.
    async fn send_status(
        &self,
        _status: StatusUpdate,
        _metadata: &serde_json::Value,
    ) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}
