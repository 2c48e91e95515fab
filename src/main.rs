use std::sync::Arc;

use anyhow::Context;

use persona_bot::backends::{ImageGenerator, StableDiffusionClient, TextGenerationClient};
use persona_bot::bot::{Bot, BotDeps};
use persona_bot::channels::{ChannelManager, CliChannel, TelegramChannel};
use persona_bot::config::{BotConfig, CONFIG_PATH_ENV, DEFAULT_CONFIG_PATH};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config_path =
        std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let config = BotConfig::load(&config_path)
        .with_context(|| format!("loading configuration from {config_path}"))?;

    eprintln!("🤖 Persona Bot v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Agent: {}", config.name);
    eprintln!("   Config: {}", config_path);
    eprintln!("   Text server: {}", config.text_generation_server);

    // ── Backends ─────────────────────────────────────────────────────────
    let text = Arc::new(TextGenerationClient::new(
        &config.text_generation_server,
        config.sampling.clone(),
    ));

    let image: Option<Arc<dyn ImageGenerator>> = match config.stable_diffusion_server {
        Some(ref server) => {
            eprintln!("   Image server: {}", server);
            let client: Arc<dyn ImageGenerator> = Arc::new(StableDiffusionClient::new(server));
            Some(client)
        }
        None => {
            eprintln!("   Image server: none (image requests get text only)");
            None
        }
    };

    if !config.allowed_channels.is_empty() {
        eprintln!("   Allowed channels: {}", config.allowed_channels.join(", "));
    }

    // ── Channels ─────────────────────────────────────────────────────────
    let mut channels = ChannelManager::new();
    let mut active_channels = vec!["cli"];

    // Always add CLI
    channels.add(Box::new(CliChannel::new(&config.name)));

    // Conditionally add Telegram if bot token is set
    if let Ok(telegram_token) = std::env::var("TELEGRAM_BOT_TOKEN") {
        channels.add(Box::new(TelegramChannel::new(telegram_token)));
        active_channels.push("telegram");
    }

    eprintln!("   Channels: {}", active_channels.join(", "));
    eprintln!("   Type a message and press Enter. Ctrl+C to exit.\n");

    let bot = Arc::new(Bot::new(config, BotDeps { text, image }, channels));
    bot.run().await?;

    Ok(())
}
