//! Prompt construction for the text generation backend.
//!
//! Layout, one item per line:
//!
//! ```text
//! Below is a conversation between {author} and {agent}. {persona}
//! ### INSTRUCTION: Write the next response in the conversation.
//! {transcript}
//! ({agent}): (Posts a selfie)            <- only for image turns
//! ### RESPONSE:
//! ({agent}): {lead-in }                  <- lead-in only for image turns
//! ```

use rand::RngCore;

use crate::config::BotConfig;
use crate::parsing::ImageRequest;
use crate::reply::bank::ResponseBank;

pub const INSTRUCTION_LINE: &str = "### INSTRUCTION: Write the next response in the conversation.";
pub const RESPONSE_MARKER: &str = "### RESPONSE:";
/// Terminates every prompt and transcript line.
pub const LINE_END: &str = "\n";

/// Format one transcript line.
pub fn chat_line(author: &str, content: &str) -> String {
    format!("({author}): {content}")
}

/// Synthetic line claiming the agent just posted the requested image.
pub fn image_post_line(agent_name: &str, request: ImageRequest<'_>) -> String {
    match request {
        ImageRequest::Selfie { detail: None } => chat_line(agent_name, "(Posts a selfie)"),
        ImageRequest::Selfie {
            detail: Some(detail),
        } => chat_line(agent_name, &format!("(Posts a selfie {detail})")),
        ImageRequest::Photo { detail } => {
            chat_line(agent_name, &format!("(Posts a picture of a {detail})"))
        }
    }
}

/// Everything decided before calling the generator, reused afterwards to
/// update the transcript consistently with the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyPlan {
    /// Exact payload for the text generator.
    pub prompt: String,
    /// Synthetic image-post line, for image turns.
    pub image_post: Option<String>,
    /// Canned phrase that opens the agent's reply, for image turns.
    pub lead_in: Option<String>,
}

impl ReplyPlan {
    /// Join the lead-in (if any) with generated text.
    pub fn with_lead_in(&self, text: &str) -> String {
        match self.lead_in {
            Some(ref lead_in) => format!("{lead_in} {text}"),
            None => text.to_string(),
        }
    }
}

/// Renders generation prompts from the persona and a channel transcript.
pub struct PromptBuilder {
    agent_name: String,
    persona: String,
    bank: ResponseBank,
}

impl PromptBuilder {
    pub fn new(agent_name: impl Into<String>, persona: impl Into<String>, bank: ResponseBank) -> Self {
        Self {
            agent_name: agent_name.into(),
            persona: persona.into(),
            bank,
        }
    }

    pub fn from_config(config: &BotConfig) -> Self {
        Self::new(
            config.name.clone(),
            config.persona.clone(),
            ResponseBank::from_config(config),
        )
    }

    /// Build the prompt for a turn. `transcript` must already include the
    /// user's message; it is only read.
    pub fn build(
        &self,
        author_name: &str,
        transcript: &str,
        image: Option<ImageRequest<'_>>,
        rng: &mut dyn RngCore,
    ) -> ReplyPlan {
        let image_post = image.map(|request| image_post_line(&self.agent_name, request));
        let lead_in = image
            .and_then(|request| match request {
                ImageRequest::Selfie { .. } => self.bank.random_selfie(rng),
                ImageRequest::Photo { .. } => self.bank.random_photo(rng),
            })
            .map(str::to_string);

        let mut prompt = String::new();
        prompt.push_str(&format!(
            "Below is a conversation between {author_name} and {}. {}",
            self.agent_name, self.persona
        ));
        prompt.push_str(LINE_END);
        prompt.push_str(INSTRUCTION_LINE);
        prompt.push_str(LINE_END);
        prompt.push_str(transcript);
        prompt.push_str(LINE_END);
        if let Some(ref line) = image_post {
            prompt.push_str(line);
            prompt.push_str(LINE_END);
        }
        prompt.push_str(RESPONSE_MARKER);
        prompt.push_str(LINE_END);
        prompt.push_str(&chat_line(&self.agent_name, ""));
        if let Some(ref lead_in) = lead_in {
            prompt.push_str(lead_in);
            prompt.push(' ');
        }

        ReplyPlan {
            prompt,
            image_post,
            lead_in,
        }
    }
}
