//! Registry of active channels; merges their inbound streams and routes
//! outbound traffic back to the channel a message came from.

use std::collections::HashMap;

use futures::stream;
use tracing::{error, info, warn};

use crate::channels::{Channel, IncomingMessage, MessageStream, OutgoingResponse, StatusUpdate};
use crate::error::ChannelError;

/// Channels keyed by [`Channel::name`].
#[derive(Default)]
pub struct ChannelManager {
    channels: HashMap<String, Box<dyn Channel>>,
}

impl ChannelManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a channel. A channel with the same name is replaced.
    pub fn add(&mut self, channel: Box<dyn Channel>) {
        let name = channel.name().to_string();
        info!(channel = %name, "Registering channel");
        self.channels.insert(name, channel);
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.channels.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    fn get(&self, name: &str) -> Result<&dyn Channel, ChannelError> {
        self.channels
            .get(name)
            .map(|c| c.as_ref())
            .ok_or_else(|| ChannelError::UnknownChannel(name.to_string()))
    }

    /// Whether `msg` was authored by the agent itself.
    pub fn is_self(&self, msg: &IncomingMessage) -> bool {
        self.channels
            .get(&msg.channel)
            .and_then(|c| c.self_id())
            .is_some_and(|id| id == msg.user_id)
    }

    /// Start every channel and merge their streams.
    ///
    /// A channel that fails to start is logged and skipped; it is an error
    /// only if none start.
    pub async fn start_all(&self) -> Result<MessageStream, ChannelError> {
        let mut streams = Vec::with_capacity(self.channels.len());
        for (name, channel) in &self.channels {
            match channel.start().await {
                Ok(stream) => {
                    info!(channel = %name, "Channel started");
                    streams.push(stream);
                }
                Err(e) => error!(channel = %name, error = %e, "Channel failed to start"),
            }
        }

        if streams.is_empty() {
            return Err(ChannelError::StartupFailed {
                name: "all".into(),
                reason: "no channel could be started".into(),
            });
        }

        Ok(Box::pin(stream::select_all(streams)))
    }

    /// Send a text reply on the channel `msg` came from.
    pub async fn respond(
        &self,
        msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError> {
        self.get(&msg.channel)?.respond(msg, response).await
    }

    /// Post an image on the channel `msg` came from.
    pub async fn send_image(
        &self,
        msg: &IncomingMessage,
        image: Vec<u8>,
        file_name: &str,
    ) -> Result<(), ChannelError> {
        self.get(&msg.channel)?.send_image(msg, image, file_name).await
    }

    pub async fn send_status(
        &self,
        channel_name: &str,
        status: StatusUpdate,
        metadata: &serde_json::Value,
    ) -> Result<(), ChannelError> {
        self.get(channel_name)?.send_status(status, metadata).await
    }

    /// Shut every channel down. Errors are logged and don't stop the others.
    pub async fn shutdown_all(&self) -> Result<(), ChannelError> {
        for (name, channel) in &self.channels {
            if let Err(e) = channel.shutdown().await {
                warn!(channel = %name, error = %e, "Channel shutdown failed");
            }
        }
        Ok(())
    }
}
