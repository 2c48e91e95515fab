//! CLI channel: a stdin/stdout REPL for local testing.
//!
//! Every line is a message from the local user in a single conversation.
//! Address the agent the same way as anywhere else, e.g. `@Agent hi` or
//! `hey Agent, take a selfie`.

use async_trait::async_trait;
use futures::stream;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::channels::{Channel, IncomingMessage, MessageStream, OutgoingResponse, StatusUpdate};
use crate::error::ChannelError;

const CLI_USER_ID: &str = "local-user";
const CLI_CHAT_ID: &str = "local";

/// A simple CLI channel that reads from stdin and writes to stdout.
#[derive(Clone)]
pub struct CliChannel {
    mention: String,
    user_name: String,
}

impl CliChannel {
    pub fn new(agent_name: &str) -> Self {
        let user_name = std::env::var("USER").unwrap_or_else(|_| "user".to_string());
        Self {
            mention: format!("@{agent_name}"),
            user_name,
        }
    }

    fn message(&self, line: &str) -> IncomingMessage {
        let mentioned = line.contains(&self.mention);
        IncomingMessage::new("cli", CLI_USER_ID, line)
            .with_user_name(self.user_name.clone())
            .with_chat(CLI_CHAT_ID, Some("terminal".into()))
            .with_bot_mention(self.mention.clone(), mentioned)
    }
}

#[async_trait]
impl Channel for CliChannel {
    fn name(&self) -> &str {
        "cli"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let this = self.clone();

        tokio::spawn(async move {
            let stdin = tokio::io::stdin();
            let reader = BufReader::new(stdin);
            let mut lines = reader.lines();

            eprint!("> ");

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim().to_string();
                        if line.is_empty() {
                            eprint!("> ");
                            continue;
                        }
                        if tx.send(this.message(&line)).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break, // EOF
                    Err(e) => {
                        tracing::error!("Error reading stdin: {}", e);
                        break;
                    }
                }
            }
        });

        let stream = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn respond(
        &self,
        _msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError> {
        println!("\n{}\n", response.content);
        eprint!("> ");
        Ok(())
    }

    async fn send_image(
        &self,
        _msg: &IncomingMessage,
        image: Vec<u8>,
        file_name: &str,
    ) -> Result<(), ChannelError> {
        println!("\n[image: {file_name}, {} bytes]", image.len());
        Ok(())
    }

    async fn send_status(
        &self,
        status: StatusUpdate,
        _metadata: &serde_json::Value,
    ) -> Result<(), ChannelError> {
        match status {
            StatusUpdate::Typing => eprintln!("⏳ typing..."),
            StatusUpdate::Status(msg) => eprintln!("ℹ️  {}", msg),
        }
        Ok(())
    }
}
