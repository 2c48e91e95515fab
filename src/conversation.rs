//! Conversation store: in-memory per-channel transcripts.
//!
//! Each channel owns one growing transcript string of `(author): content`
//! lines. A turn takes the channel's lock with [`ConversationStore::lock`] and
//! holds it from the user append to the agent append, so turns in one channel
//! never interleave while other channels proceed in parallel.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, info};

/// Exclusive access to one channel's transcript for the duration of a turn.
pub type Transcript = OwnedMutexGuard<String>;

/// Transcripts keyed by channel id. Not persisted across restarts.
#[derive(Default)]
pub struct ConversationStore {
    channels: RwLock<HashMap<String, Arc<Mutex<String>>>>,
}

impl ConversationStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Get the channel's slot, creating an empty transcript on first access.
    async fn slot(&self, channel_id: &str) -> Arc<Mutex<String>> {
        if let Some(slot) = self.channels.read().await.get(channel_id) {
            return Arc::clone(slot);
        }

        let mut channels = self.channels.write().await;
        let slot = channels.entry(channel_id.to_string()).or_insert_with(|| {
            debug!(channel = %channel_id, "New conversation transcript");
            Arc::new(Mutex::new(String::new()))
        });
        Arc::clone(slot)
    }

    /// Lock a channel's transcript. Waits for any turn in flight on that channel.
    pub async fn lock(&self, channel_id: &str) -> Transcript {
        self.slot(channel_id).await.lock_owned().await
    }

    /// Append `text` to a channel's transcript.
    pub async fn append(&self, channel_id: &str, text: &str) {
        self.lock(channel_id).await.push_str(text);
    }

    /// Current transcript for a channel; empty if nothing was appended yet.
    pub async fn get(&self, channel_id: &str) -> String {
        self.lock(channel_id).await.clone()
    }

    /// Clear every channel's transcript.
    ///
    /// Must not be called while holding a [`Transcript`] guard.
    pub async fn reset_all(&self) {
        let channels = self.channels.read().await;
        for slot in channels.values() {
            slot.lock().await.clear();
        }
        info!(channels = channels.len(), "Conversation transcripts reset");
    }

    /// Number of channels with a transcript.
    pub async fn len(&self) -> usize {
        self.channels.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.channels.read().await.is_empty()
    }
}
