//! The bot: ties parsing, transcripts, generation and channels together.
//!
//! One inbound message is one turn:
//! 1. drop our own messages and messages from channels not on the allowlist
//! 2. classify; stop unless the agent is addressed
//! 3. run owner commands (before any transcript lock is taken)
//! 4. lock the channel transcript, post the image if one was requested,
//!    append the user line, generate, record the agent line
//! 5. send the reply unless it is blank

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use futures::StreamExt;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use tokio::sync::{Notify, mpsc};
use tracing::{debug, error, info, warn};

use crate::backends::{ImageGenerator, TextGenerator, image_prompts};
use crate::channels::{ChannelManager, IncomingMessage, OutgoingResponse, StatusUpdate};
use crate::commands::OwnerCommand;
use crate::config::BotConfig;
use crate::conversation::ConversationStore;
use crate::error::Result;
use crate::parsing::{ImageRequest, MessageParser};
use crate::reply::{PromptBuilder, ResponseBank, ResponsePostProcessor, chat_line};

/// File name used when posting generated images.
pub const IMAGE_FILE_NAME: &str = "image.png";

/// Generation backends.
pub struct BotDeps {
    pub text: Arc<dyn TextGenerator>,
    /// Image requests are answered with text only when unset.
    pub image: Option<Arc<dyn ImageGenerator>>,
}

/// The chat bot.
pub struct Bot {
    config: Arc<BotConfig>,
    deps: BotDeps,
    channels: Arc<ChannelManager>,
    store: Arc<ConversationStore>,
    parser: MessageParser,
    prompts: PromptBuilder,
    post: ResponsePostProcessor,
    rng: Mutex<Box<dyn RngCore + Send>>,
    shutdown: Notify,
}

impl Bot {
    pub fn new(config: BotConfig, deps: BotDeps, channels: ChannelManager) -> Self {
        Self {
            parser: MessageParser::from_config(&config),
            prompts: PromptBuilder::from_config(&config),
            post: ResponsePostProcessor::new(config.name.clone(), ResponseBank::from_config(&config)),
            config: Arc::new(config),
            deps,
            channels: Arc::new(channels),
            store: ConversationStore::new(),
            rng: Mutex::new(Box::new(StdRng::from_entropy())),
            shutdown: Notify::new(),
        }
    }

    /// Replace the randomness source used for canned phrases.
    pub fn with_rng(mut self, rng: impl RngCore + Send + 'static) -> Self {
        self.rng = Mutex::new(Box::new(rng));
        self
    }

    pub fn config(&self) -> &BotConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    pub fn channels(&self) -> &Arc<ChannelManager> {
        &self.channels
    }

    /// Ask the run loop to stop.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }

    fn draw<T>(&self, f: impl FnOnce(&mut dyn RngCore) -> T) -> T {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut **rng)
    }

    // ── Main loop ───────────────────────────────────────────────────

    /// Run until Ctrl+C, an owner shutdown, or every channel stream ends.
    ///
    /// Each conversation gets its own worker task fed in arrival order, so
    /// turns in one chat run one after another while chats run in parallel.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let mut messages = self.channels.start_all().await?;
        let mut queues: HashMap<String, mpsc::UnboundedSender<IncomingMessage>> = HashMap::new();

        info!(
            agent = %self.config.name,
            channels = ?self.channels.names(),
            "Bot ready and listening"
        );

        loop {
            let message = tokio::select! {
                biased;
                _ = tokio::signal::ctrl_c() => {
                    info!("Ctrl+C received, shutting down...");
                    break;
                }
                _ = self.shutdown.notified() => {
                    info!("Shutdown requested, shutting down...");
                    break;
                }
                msg = messages.next() => {
                    match msg {
                        Some(m) => m,
                        None => {
                            info!("All channel streams ended, shutting down...");
                            break;
                        }
                    }
                }
            };

            let chat_id = message.chat_id.clone();
            let queue = queues
                .entry(chat_id.clone())
                .or_insert_with(|| self.spawn_chat_worker());
            if let Err(mpsc::error::SendError(message)) = queue.send(message) {
                // A worker only goes away if a turn panicked.
                warn!(chat_id = %chat_id, "Chat worker stopped; starting a new one");
                *queue = self.spawn_chat_worker();
                if queue.send(message).is_err() {
                    error!(chat_id = %chat_id, "Dropping message: no chat worker");
                }
            }
        }

        info!("Bot shutting down...");
        self.channels.shutdown_all().await?;
        Ok(())
    }

    fn spawn_chat_worker(self: &Arc<Self>) -> mpsc::UnboundedSender<IncomingMessage> {
        let (tx, mut rx) = mpsc::unbounded_channel::<IncomingMessage>();
        let bot = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                bot.handle_message(&message).await;
            }
        });
        tx
    }

    // ── Message handling ────────────────────────────────────────────

    /// Process one inbound message. Returns the reply that was sent, if any.
    pub async fn handle_message(&self, msg: &IncomingMessage) -> Option<String> {
        if self.channels.is_self(msg) {
            return None;
        }
        if !self.config.is_channel_allowed(&msg.chat_id) {
            debug!(chat_id = %msg.chat_id, "Ignoring message from channel not on the allowlist");
            return None;
        }

        let parsed = self.parser.parse(msg);
        parsed.log();
        if !parsed.should_respond {
            return None;
        }

        if self.config.is_owner(&msg.user_id)
            && let Some(command) = OwnerCommand::parse(&parsed.command)
        {
            info!(command = ?command, "Received command from owner");
            return Some(self.run_owner_command(msg, command).await);
        }

        if let Err(e) = self
            .channels
            .send_status(&msg.channel, StatusUpdate::Typing, &msg.metadata)
            .await
        {
            debug!(error = %e, "Typing indicator failed");
        }

        let image = parsed.image_request();
        let mut transcript = self.store.lock(&parsed.channel.id).await;

        if let Some(request) = image {
            self.post_image(msg, request).await;
        }

        transcript.push_str(&chat_line(&parsed.author.name, &parsed.content));
        let plan = self.draw(|rng| {
            self.prompts
                .build(&parsed.author.name, &transcript, image, rng)
        });
        debug!(prompt = %plan.prompt, "Sending text generation request");

        let generated = self.deps.text.generate(&plan.prompt).await;
        let mention = parsed.author_is_bot().then(|| msg.author_mention());
        let reply = self.draw(|rng| {
            self.post
                .finish(&mut transcript, &plan, generated, mention.as_deref(), rng)
        });
        drop(transcript);

        if reply.trim().is_empty() {
            debug!(channel = %parsed.channel.name, "Reply is empty; nothing sent");
            return None;
        }

        self.respond(msg, &reply).await;
        Some(reply)
    }

    async fn run_owner_command(&self, msg: &IncomingMessage, command: OwnerCommand) -> String {
        let reply = command.reply().to_string();
        self.respond(msg, &reply).await;

        match command {
            OwnerCommand::WipeMemory => self.store.reset_all().await,
            OwnerCommand::Sleep => self.shutdown(),
            OwnerCommand::Say(_) => {}
        }
        reply
    }

    /// Generate and post the requested image. Failures only cost the image.
    async fn post_image(&self, msg: &IncomingMessage, request: ImageRequest<'_>) {
        let Some(ref generator) = self.deps.image else {
            warn!("Image requested but no image server is configured");
            return;
        };

        let prompts = image_prompts(&self.config, request);
        match generator.generate(&prompts.prompt, &prompts.negative).await {
            Ok(image) => {
                if let Err(e) = self.channels.send_image(msg, image, IMAGE_FILE_NAME).await {
                    error!(error = %e, "Failed to post image");
                }
            }
            Err(e) => error!(error = %e, "Image generation failed"),
        }
    }

    async fn respond(&self, msg: &IncomingMessage, text: &str) {
        if let Err(e) = self
            .channels
            .respond(msg, OutgoingResponse::text(text))
            .await
        {
            error!(channel = %msg.channel, error = %e, "Failed to send reply");
        }
    }
}
