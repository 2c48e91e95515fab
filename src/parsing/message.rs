//! Parsed message: the per-message classification result.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::channels::IncomingMessage;
use crate::config::{BotConfig, Triggers};
use crate::parsing::intent::{ImagePrompt, ImageRequest, Intent};
use crate::parsing::triggers::{Mention, TriggerMatch, TriggerMatcher};

/// Characters kept in names that end up in the transcript.
static DISALLOWED_NAME_CHARS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"[^a-zA-Z0-9"'!@#$%&=\s.+*()\[\]]"#).expect("name filter regex is valid")
});

/// Strip characters we don't want in the chat log.
pub fn sanitize_name(s: &str) -> String {
    DISALLOWED_NAME_CHARS.replace_all(s, "").into_owned()
}

/// An (id, sanitized display name) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: String,
    pub name: String,
}

/// Classification of one inbound message. Immutable once built.
#[derive(Debug, Clone)]
pub struct ParsedMessage<'a> {
    pub message: &'a IncomingMessage,
    /// Byte offset where the command starts.
    pub arg_pos: usize,
    pub should_respond: bool,
    pub author: Identity,
    pub channel: Identity,
    pub content: String,
    pub command: String,
    intent: Intent,
}

impl<'a> ParsedMessage<'a> {
    pub fn author_is_bot(&self) -> bool {
        self.message.author_is_bot
    }

    pub fn intent(&self) -> &Intent {
        &self.intent
    }

    pub fn selfie_prompt(&self) -> &ImagePrompt {
        &self.intent.selfie
    }

    pub fn photo_prompt(&self) -> &ImagePrompt {
        &self.intent.photo
    }

    pub fn has_selfie_prompt(&self) -> bool {
        self.intent.has_selfie_prompt()
    }

    pub fn has_photo_prompt(&self) -> bool {
        self.intent.has_photo_prompt()
    }

    pub fn has_image_prompt(&self) -> bool {
        self.intent.has_image_prompt()
    }

    pub fn image_request(&self) -> Option<ImageRequest<'_>> {
        self.intent.image_request()
    }

    /// Emit the classification as a debug event.
    pub fn log(&self) {
        debug!(
            should_respond = self.should_respond,
            author = %self.author.name,
            channel = %self.channel.name,
            content = %self.content,
            command = %self.command,
            selfie = ?self.intent.selfie,
            photo = ?self.intent.photo,
            "Parsed message"
        );
    }
}

/// Builds [`ParsedMessage`]s from inbound messages.
pub struct MessageParser {
    triggers: Triggers,
    agent_name: String,
}

impl MessageParser {
    pub fn new(triggers: Triggers, agent_name: impl Into<String>) -> Self {
        Self {
            triggers,
            agent_name: agent_name.into(),
        }
    }

    pub fn from_config(config: &BotConfig) -> Self {
        Self::new(config.triggers(), config.name.clone())
    }

    /// Classify a message. Always succeeds; unaddressed messages get
    /// `should_respond == false` and an empty command.
    pub fn parse<'a>(&self, msg: &'a IncomingMessage) -> ParsedMessage<'a> {
        let mention = Mention {
            token: msg.bot_mention.as_deref(),
            mentioned: msg.mentions_bot,
        };
        let matched = TriggerMatcher::new(&self.triggers, &self.agent_name)
            .match_text(&msg.content, mention);

        let author = Identity {
            id: msg.user_id.clone(),
            name: sanitize_name(msg.user_name.as_deref().unwrap_or(&msg.user_id)),
        };
        let channel = Identity {
            id: msg.chat_id.clone(),
            name: sanitize_name(msg.chat_name.as_deref().unwrap_or(&msg.chat_id)),
        };

        match matched {
            Some(TriggerMatch {
                offset,
                content,
                command,
                ..
            }) => {
                let intent = Intent::extract(&command, &self.triggers);
                ParsedMessage {
                    message: msg,
                    arg_pos: offset,
                    should_respond: true,
                    author,
                    channel,
                    content,
                    command,
                    intent,
                }
            }
            None => ParsedMessage {
                message: msg,
                arg_pos: 0,
                should_respond: false,
                author,
                channel,
                content: msg.content.clone(),
                command: String::new(),
                intent: Intent::default(),
            },
        }
    }
}
