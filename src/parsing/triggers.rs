//! Trigger matching: decides whether a message is addressed to the agent.
//!
//! Three checks run in strict priority order, first match wins:
//! 1. direct address via the transport's mention token
//! 2. `"{greeting} {nickname}"` prefix, greeting outer / nickname inner
//! 3. bare `"{nickname}"` prefix
//!
//! A transport mention flag whose token isn't in the text only applies after
//! all three fail.
//!
//! Prefix checks are case-insensitive and walk the longest-first
//! [`TriggerSet`](crate::config::TriggerSet) ordering.

use crate::config::Triggers;

/// How the message addressed the agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    /// Structured mention of the agent's identity.
    Mention,
    /// `"{greeting} {nickname}"` prefix.
    Greeting { greeting: String, nickname: String },
    /// Bare nickname prefix.
    Nickname(String),
}

/// Result of a successful trigger match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerMatch {
    pub address: Address,
    /// Byte offset where the command starts, past any whitespace.
    pub offset: usize,
    /// Message text as it should appear in the transcript.
    pub content: String,
    /// Message text with the trigger removed.
    pub command: String,
}

/// Mention information supplied by the transport.
#[derive(Debug, Clone, Copy, Default)]
pub struct Mention<'a> {
    /// The agent's mention token as it appears in raw text, e.g. `<@123>` or `@agent_bot`.
    pub token: Option<&'a str>,
    /// The transport saw the agent mentioned somewhere in the message.
    pub mentioned: bool,
}

/// Matches inbound text against the configured triggers.
pub struct TriggerMatcher<'a> {
    triggers: &'a Triggers,
    agent_name: &'a str,
}

impl<'a> TriggerMatcher<'a> {
    pub fn new(triggers: &'a Triggers, agent_name: &'a str) -> Self {
        Self {
            triggers,
            agent_name,
        }
    }

    /// Classify `text`. `None` means the message is not for the agent.
    ///
    /// A transport-level mention whose token doesn't appear in the text (a
    /// private chat, a reply to the agent) only applies once the greeting and
    /// nickname checks fail, so those still shape the command.
    pub fn match_text(&self, text: &str, mention: Mention<'_>) -> Option<TriggerMatch> {
        self.match_mention(text, mention)
            .or_else(|| self.match_greeting(text))
            .or_else(|| self.match_nickname(text))
            .or_else(|| mention.mentioned.then(|| whole_text_match(text)))
    }

    fn match_mention(&self, text: &str, mention: Mention<'_>) -> Option<TriggerMatch> {
        let token = mention.token.filter(|t| !t.is_empty())?;

        let prefix_rest = strip_prefix_ignore_case(text, token);
        if prefix_rest.is_none() && !contains_ignore_case(text, token) {
            return None;
        }

        // A mention that isn't a prefix still counts; the offset stays at 0.
        let offset = prefix_rest.map_or(0, |rest| text.len() - rest.len());
        Some(TriggerMatch {
            address: Address::Mention,
            offset: skip_whitespace(text, offset),
            content: replace_ignore_case(text, token, self.agent_name)
                .trim()
                .to_string(),
            command: clean_command(&replace_ignore_case(text, token, "")),
        })
    }

    fn match_greeting(&self, text: &str) -> Option<TriggerMatch> {
        for greeting in self.triggers.greetings.iter() {
            for nickname in self.triggers.nicknames.iter() {
                let phrase = format!("{greeting} {nickname}");
                if let Some(rest) = strip_prefix_ignore_case(text, &phrase) {
                    return Some(prefix_match(
                        text,
                        rest,
                        Address::Greeting {
                            greeting: greeting.to_string(),
                            nickname: nickname.to_string(),
                        },
                    ));
                }
            }
        }
        None
    }

    fn match_nickname(&self, text: &str) -> Option<TriggerMatch> {
        self.triggers.nicknames.iter().find_map(|nickname| {
            strip_prefix_ignore_case(text, nickname)
                .map(|rest| prefix_match(text, rest, Address::Nickname(nickname.to_string())))
        })
    }
}

fn prefix_match(text: &str, rest: &str, address: Address) -> TriggerMatch {
    TriggerMatch {
        address,
        offset: skip_whitespace(text, text.len() - rest.len()),
        content: text.to_string(),
        command: clean_command(rest),
    }
}

fn whole_text_match(text: &str) -> TriggerMatch {
    TriggerMatch {
        address: Address::Mention,
        offset: skip_whitespace(text, 0),
        content: text.trim().to_string(),
        command: clean_command(text),
    }
}

/// Strip `prefix` from the start of `text`, comparing case-insensitively.
///
/// Returns the remainder of `text` on a match.
pub fn strip_prefix_ignore_case<'t>(text: &'t str, prefix: &str) -> Option<&'t str> {
    let mut chars = text.char_indices();
    let mut end = 0;
    for expected in prefix.chars() {
        let (idx, actual) = chars.next()?;
        if !chars_eq_ignore_case(actual, expected) {
            return None;
        }
        end = idx + actual.len_utf8();
    }
    Some(&text[end..])
}

fn contains_ignore_case(text: &str, needle: &str) -> bool {
    text.char_indices()
        .any(|(idx, _)| strip_prefix_ignore_case(&text[idx..], needle).is_some())
}

/// Replace every case-insensitive occurrence of a non-empty `needle`.
fn replace_ignore_case(text: &str, needle: &str, with: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(c) = rest.chars().next() {
        match strip_prefix_ignore_case(rest, needle) {
            Some(after) => {
                out.push_str(with);
                rest = after;
            }
            None => {
                out.push(c);
                rest = &rest[c.len_utf8()..];
            }
        }
    }
    out
}

fn chars_eq_ignore_case(a: char, b: char) -> bool {
    a == b || a.to_lowercase().eq(b.to_lowercase())
}

/// Advance a byte offset past any whitespace.
fn skip_whitespace(text: &str, offset: usize) -> usize {
    let rest = &text[offset..];
    offset + (rest.len() - rest.trim_start().len())
}

/// Trim surrounding whitespace and separating commas, e.g. `", take a selfie "`.
pub(crate) fn clean_command(s: &str) -> String {
    s.trim().trim_matches(',').trim().to_string()
}
