//! Configuration types.
//!
//! The bot is configured from a single JSON file whose keys match the
//! PascalCase names used by existing deployments (`Name`, `Persona`,
//! `Nicknames`, ...). A handful of values can be overridden from the
//! environment. The loaded [`BotConfig`] is immutable and shared by
//! reference with every pipeline component.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Environment variable holding the path to the JSON config file.
pub const CONFIG_PATH_ENV: &str = "PERSONA_BOT_CONFIG";

/// Config file used when [`CONFIG_PATH_ENV`] is unset.
pub const DEFAULT_CONFIG_PATH: &str = "./config.json";

const TEXT_SERVER_ENV: &str = "PERSONA_BOT_TEXT_SERVER";
const IMAGE_SERVER_ENV: &str = "PERSONA_BOT_IMAGE_SERVER";

/// Bot configuration, loaded once at startup.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BotConfig {
    /// Display name of the agent. Also acts as an implicit nickname.
    pub name: String,
    /// Persona description appended to the prompt header.
    #[serde(default)]
    pub persona: String,
    #[serde(default)]
    pub nicknames: Vec<String>,
    #[serde(default)]
    pub greeting_triggers: Vec<String>,
    #[serde(default)]
    pub selfie_triggers: Vec<String>,
    #[serde(default)]
    pub photo_triggers: Vec<String>,
    /// Lead-ins used after a selfie, e.g. "Here's a photo of me".
    #[serde(default)]
    pub selfie_responses: Vec<String>,
    /// Lead-ins used after a photo, e.g. "Here's a picture of a".
    #[serde(default)]
    pub photo_responses: Vec<String>,
    /// Canned replies used when text generation fails.
    #[serde(default)]
    pub error_responses: Vec<String>,
    /// Image prompt prefix describing the agent, used for selfies.
    #[serde(default)]
    pub selfie_prompt: String,
    /// Negative prompt sent with selfie requests.
    #[serde(default)]
    pub image_negative_prompt: String,
    /// Base URL of the text generation backend.
    #[serde(default)]
    pub text_generation_server: String,
    /// Base URL of the image generation backend. Image requests are skipped when unset.
    #[serde(default)]
    pub stable_diffusion_server: Option<String>,
    /// Author id allowed to run owner commands.
    #[serde(default)]
    pub owner: Option<String>,
    /// If non-empty, only these channel ids are served.
    #[serde(default)]
    pub allowed_channels: Vec<String>,
    #[serde(default)]
    pub sampling: SamplingParams,
}

impl BotConfig {
    /// Load and validate the config file at `path`, then apply env overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let mut config = Self::from_json(&raw)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse a config from a JSON string without touching the environment.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(raw).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(server) = std::env::var(TEXT_SERVER_ENV) {
            self.text_generation_server = server;
        }
        if let Ok(server) = std::env::var(IMAGE_SERVER_ENV) {
            self.stable_diffusion_server = Some(server);
        }
    }

    /// Check the values every component relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                key: "Name".into(),
                hint: "Set the agent's display name".into(),
            });
        }
        if self.text_generation_server.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                key: "TextGenerationServer".into(),
                hint: format!("Set it in the config file or export {TEXT_SERVER_ENV}"),
            });
        }
        if let Some(ref server) = self.stable_diffusion_server
            && server.trim().is_empty()
        {
            return Err(ConfigError::InvalidValue {
                key: "StableDiffusionServer".into(),
                message: "must not be empty when present".into(),
            });
        }
        Ok(())
    }

    /// Build the sorted trigger sets. The agent's name is added to the nicknames.
    pub fn triggers(&self) -> Triggers {
        Triggers {
            nicknames: TriggerSet::new(
                self.nicknames
                    .iter()
                    .cloned()
                    .chain(std::iter::once(self.name.clone())),
            ),
            greetings: TriggerSet::new(self.greeting_triggers.iter().cloned()),
            selfie: TriggerSet::new(self.selfie_triggers.iter().cloned()),
            photo: TriggerSet::new(self.photo_triggers.iter().cloned()),
        }
    }

    /// Whether messages from `channel_id` should be handled at all.
    pub fn is_channel_allowed(&self, channel_id: &str) -> bool {
        self.allowed_channels.is_empty() || self.allowed_channels.iter().any(|c| c == channel_id)
    }

    /// Whether `author_id` is the configured owner.
    pub fn is_owner(&self, author_id: &str) -> bool {
        self.owner.as_deref() == Some(author_id)
    }
}

/// Trigger strings, ordered longest-first.
///
/// A longer trigger is always tested before any of its prefixes, so
/// "take a selfie of" wins over "take a selfie". Empty strings are dropped
/// since they would match every message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriggerSet(Vec<String>);

impl TriggerSet {
    pub fn new(triggers: impl IntoIterator<Item = String>) -> Self {
        let mut triggers: Vec<String> = triggers.into_iter().filter(|t| !t.is_empty()).collect();
        // Stable, so equal-length triggers keep their configured order.
        triggers.sort_by_key(|t| std::cmp::Reverse(t.chars().count()));
        Self(triggers)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// All trigger sets used by message classification.
#[derive(Debug, Clone, Default)]
pub struct Triggers {
    pub nicknames: TriggerSet,
    pub greetings: TriggerSet,
    pub selfie: TriggerSet,
    pub photo: TriggerSet,
}

/// Sampling parameters sent verbatim with every text generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingParams {
    pub max_new_tokens: u32,
    pub do_sample: bool,
    pub temperature: f32,
    pub top_p: f32,
    pub typical_p: f32,
    pub repetition_penalty: f32,
    pub encoder_repetition_penalty: f32,
    pub top_k: u32,
    pub num_beams: u32,
    pub penalty_alpha: f32,
    pub min_length: u32,
    pub length_penalty: f32,
    pub no_repeat_ngram_size: u32,
    pub early_stopping: bool,
    pub stopping_strings: Vec<String>,
    pub seed: i64,
    pub add_bos_token: bool,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            max_new_tokens: 200,
            do_sample: false,
            temperature: 0.85,
            top_p: 0.9,
            typical_p: 1.0,
            repetition_penalty: 1.1,
            encoder_repetition_penalty: 1.0,
            top_k: 40,
            num_beams: 1,
            penalty_alpha: 0.0,
            min_length: 0,
            length_penalty: 1.0,
            no_repeat_ngram_size: 0,
            early_stopping: true,
            stopping_strings: vec!["\n#".into(), "\n##".into(), "\n###".into(), "(".into()],
            seed: -1,
            add_bos_token: true,
        }
    }
}
