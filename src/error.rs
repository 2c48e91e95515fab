//! Error types for persona-bot.

/// Errors that stop the bot's run loop.
///
/// Generation failures never get here: they are recovered inside a turn.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Channel-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Failed to send response on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Unknown channel: {0}")]
    UnknownChannel(String),
}

/// Text generation backend errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Provider {provider} returned no candidates")]
    EmptyResponse { provider: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Image generation backend errors.
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("Image request to {provider} failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid image response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Image payload is not valid base64: {0}")]
    Decode(#[from] base64::DecodeError),
}

/// Result type alias for the bot.
pub type Result<T> = std::result::Result<T, Error>;
