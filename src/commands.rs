//! Owner commands.
//!
//! When the owner addresses the agent, the command text is checked against a
//! small fixed vocabulary before a normal reply is generated.

/// A command only the configured owner may run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnerCommand {
    /// Clear every channel's transcript.
    WipeMemory,
    /// Stop the bot.
    Sleep,
    /// Echo the given text.
    Say(String),
}

impl OwnerCommand {
    /// Parse a command string. Matching ignores case and surrounding whitespace.
    pub fn parse(command: &str) -> Option<Self> {
        let trimmed = command.trim();
        let lower = trimmed.to_lowercase();

        match lower.as_str() {
            "wipe your memory" => Some(Self::WipeMemory),
            "go to sleep" => Some(Self::Sleep),
            _ => parse_say(trimmed),
        }
    }

    /// Acknowledgement sent before the command takes effect.
    pub fn reply(&self) -> &str {
        match self {
            Self::WipeMemory => "Okay, wiping my memory!",
            Self::Sleep => "Okay, Goodnight!",
            Self::Say(text) => text,
        }
    }
}

/// `say <text>`; the text keeps its original case.
fn parse_say(trimmed: &str) -> Option<OwnerCommand> {
    let head = trimmed.get(.."say".len())?;
    if !head.eq_ignore_ascii_case("say") {
        return None;
    }
    let rest = &trimmed["say".len()..];
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let text = rest.trim();
    if text.is_empty() {
        return None;
    }
    Some(OwnerCommand::Say(text.to_string()))
}
