//! Inbound message classification.
//!
//! Raw text flows through:
//! 1. `TriggerMatcher`: is the message addressed to the agent, and where does the command start
//! 2. `Intent::extract`: plain chat, selfie request, or photo request
//!
//! Classification is total: every message yields a [`ParsedMessage`].

pub mod intent;
pub mod message;
pub mod triggers;

pub use intent::{ImagePrompt, ImageRequest, Intent};
pub use message::{Identity, MessageParser, ParsedMessage, sanitize_name};
pub use triggers::{Address, Mention, TriggerMatch, TriggerMatcher};
