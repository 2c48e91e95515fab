//! Reply generation around the text backend.
//!
//! `PromptBuilder` renders the prompt from a locked transcript;
//! `ResponsePostProcessor` cleans the generated text and records the agent's
//! turn. Both draw canned phrases from the shared [`ResponseBank`].

pub mod bank;
pub mod postprocess;
pub mod prompt;

pub use bank::ResponseBank;
pub use postprocess::{ResponsePostProcessor, sanitize_reply};
pub use prompt::{
    INSTRUCTION_LINE, LINE_END, PromptBuilder, RESPONSE_MARKER, ReplyPlan, chat_line,
    image_post_line,
};
