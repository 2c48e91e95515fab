//! Reply post-processing and transcript bookkeeping after generation.

use std::sync::LazyLock;

use rand::RngCore;
use regex::Regex;
use tracing::{debug, warn};

use crate::error::LlmError;
use crate::reply::bank::ResponseBank;
use crate::reply::prompt::{LINE_END, ReplyPlan, chat_line};

/// First line, followed by one or more lines that open another `(speaker)` turn.
static TRAILING_TURNS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.*)(?:\n\(.*\r?\n?)+$").expect("trailing turn regex is valid")
});

/// Drop fabricated follow-up turns the model kept writing past its own line.
///
/// Text without such a tail is returned unchanged.
pub fn sanitize_reply(reply: &str) -> String {
    TRAILING_TURNS.replace(reply, "${1}").into_owned()
}

/// Turns generator output into the final reply and records the agent's turn.
pub struct ResponsePostProcessor {
    agent_name: String,
    bank: ResponseBank,
}

impl ResponsePostProcessor {
    pub fn new(agent_name: impl Into<String>, bank: ResponseBank) -> Self {
        Self {
            agent_name: agent_name.into(),
            bank,
        }
    }

    /// Complete a turn.
    ///
    /// On success the transcript gains the image-post line (for image turns)
    /// and the agent's line carrying the lead-in plus sanitized text. On
    /// failure, or when sanitizing leaves nothing, a random error phrase is
    /// used and no image line is recorded.
    ///
    /// `bot_author_mention` is prefixed to the returned reply only; the
    /// transcript keeps the unprefixed text. An empty return means nothing
    /// should be sent.
    pub fn finish(
        &self,
        transcript: &mut String,
        plan: &ReplyPlan,
        generated: Result<String, LlmError>,
        bot_author_mention: Option<&str>,
        rng: &mut dyn RngCore,
    ) -> String {
        let text = match generated {
            Ok(raw) => {
                let cleaned = sanitize_reply(&raw);
                let cleaned = cleaned.trim();
                if cleaned.is_empty() {
                    warn!(agent = %self.agent_name, "Generated reply was empty after cleanup");
                    None
                } else {
                    if cleaned.len() != raw.trim().len() {
                        debug!(raw = %raw, cleaned = %cleaned, "Stripped trailing turns from reply");
                    }
                    Some(cleaned.to_string())
                }
            }
            Err(e) => {
                warn!(agent = %self.agent_name, error = %e, "Text generation failed");
                None
            }
        };

        let reply = match text {
            Some(text) => {
                if let Some(ref line) = plan.image_post {
                    transcript.push_str(LINE_END);
                    transcript.push_str(line);
                }
                transcript.push_str(LINE_END);
                transcript.push_str(&chat_line(&self.agent_name, ""));
                plan.with_lead_in(&text)
            }
            None => {
                transcript.push_str(LINE_END);
                transcript.push_str(&chat_line(&self.agent_name, ""));
                match self.bank.random_error(rng) {
                    Some(phrase) => phrase.to_string(),
                    None => {
                        warn!("No error responses configured; reply suppressed");
                        String::new()
                    }
                }
            }
        };

        transcript.push_str(&reply);
        transcript.push_str(LINE_END);

        match bot_author_mention {
            Some(mention) if !reply.is_empty() => format!("{mention} {reply}"),
            _ => reply,
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::mock::StepRng;

    use super::*;

    fn processor() -> ResponsePostProcessor {
        ResponsePostProcessor::new(
            "Agent",
            ResponseBank {
                selfie: vec!["Here's me".into()],
                photo: vec![],
                error: vec!["Sorry, my head hurts".into(), "What?".into()],
            },
        )
    }

    fn plain_plan() -> ReplyPlan {
        ReplyPlan {
            prompt: String::new(),
            image_post: None,
            lead_in: None,
        }
    }

    fn selfie_plan() -> ReplyPlan {
        ReplyPlan {
            prompt: String::new(),
            image_post: Some("(Agent): (Posts a selfie)".into()),
            lead_in: Some("Here's me".into()),
        }
    }

    fn rng() -> StepRng {
        StepRng::new(0, 0)
    }

    #[test]
    fn sanitize_keeps_single_line() {
        assert_eq!(sanitize_reply("This is a reply."), "This is a reply.");
    }

    #[test]
    fn sanitize_strips_one_fabricated_turn() {
        assert_eq!(
            sanitize_reply("This is a reply.\n(User1): This is another reply."),
            "This is a reply."
        );
    }

    #[test]
    fn sanitize_strips_several_fabricated_turns() {
        assert_eq!(
            sanitize_reply(
                "This is a reply.\n(User1): This is another reply.\n(User2): This is yet another reply."
            ),
            "This is a reply."
        );
        assert_eq!(
            sanitize_reply("Hello!\n(User2): something else\n(User3): more"),
            "Hello!"
        );
    }

    #[test]
    fn sanitize_tolerates_crlf_and_trailing_newline() {
        assert_eq!(sanitize_reply("Hi.\r\n(User1): x\r\n"), "Hi.\r");
        assert_eq!(sanitize_reply("Hi.\n(User1): x\n"), "Hi.");
    }

    #[test]
    fn sanitize_leaves_multiline_prose_alone() {
        let text = "Line one\nLine two";
        assert_eq!(sanitize_reply(text), text);
    }

    #[test]
    fn sanitize_is_idempotent() {
        let once = sanitize_reply("Hello!\n(User2): something else");
        assert_eq!(sanitize_reply(&once), once);
    }

    #[test]
    fn plain_success_appends_agent_line() {
        let mut transcript = String::from("(alice): hi");
        let reply = processor().finish(
            &mut transcript,
            &plain_plan(),
            Ok("Hello!\n(alice): more".into()),
            None,
            &mut rng(),
        );
        assert_eq!(reply, "Hello!");
        assert_eq!(transcript, "(alice): hi\n(Agent): Hello!\n");
    }

    #[test]
    fn image_success_records_post_line_and_lead_in() {
        let mut transcript = String::from("(alice): take a selfie");
        let reply = processor().finish(
            &mut transcript,
            &selfie_plan(),
            Ok("at the beach!".into()),
            None,
            &mut rng(),
        );
        assert_eq!(reply, "Here's me at the beach!");
        assert_eq!(
            transcript,
            "(alice): take a selfie\n(Agent): (Posts a selfie)\n(Agent): Here's me at the beach!\n"
        );
    }

    #[test]
    fn failure_uses_error_phrase_without_image_line() {
        let mut transcript = String::from("(alice): take a selfie");
        let err = LlmError::RequestFailed {
            provider: "test".into(),
            reason: "connection refused".into(),
        };
        let reply = processor().finish(&mut transcript, &selfie_plan(), Err(err), None, &mut rng());
        assert_eq!(reply, "Sorry, my head hurts");
        assert_eq!(
            transcript,
            "(alice): take a selfie\n(Agent): Sorry, my head hurts\n"
        );
    }

    #[test]
    fn blank_generation_counts_as_failure() {
        let mut transcript = String::from("(alice): hi");
        let reply = processor().finish(&mut transcript, &plain_plan(), Ok("  \n".into()), None, &mut rng());
        assert_eq!(reply, "Sorry, my head hurts");
    }

    #[test]
    fn empty_error_bank_suppresses_reply() {
        let processor = ResponsePostProcessor::new("Agent", ResponseBank::default());
        let mut transcript = String::from("(alice): hi");
        let err = LlmError::EmptyResponse {
            provider: "test".into(),
        };
        let reply = processor.finish(&mut transcript, &plain_plan(), Err(err), Some("@bot2"), &mut rng());
        assert_eq!(reply, "");
        assert_eq!(transcript, "(alice): hi\n(Agent): \n");
    }

    #[test]
    fn bot_author_gets_mention_prefix_but_transcript_does_not() {
        let mut transcript = String::from("(bot2): hi");
        let reply = processor().finish(
            &mut transcript,
            &plain_plan(),
            Ok("Hello, fellow bot.".into()),
            Some("@bot2"),
            &mut rng(),
        );
        assert_eq!(reply, "@bot2 Hello, fellow bot.");
        assert_eq!(transcript, "(bot2): hi\n(Agent): Hello, fellow bot.\n");
    }
}
