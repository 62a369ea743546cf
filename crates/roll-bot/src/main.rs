//! roll-bot - Main entry point.

use anyhow::Context;
use clap::Parser;
use irc_client::{ChatTransport, IrcClient};
use module_store::Store;
use roll_bot::config::Config;
use roll_bot::mock::{run_console, MemoryTransport, MockChannelApi};
use roll_bot::{AppResult, Bot, BotSettings, ModuleRegistry};
use secrecy::ExposeSecret;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use twitch_api_client::{ChannelApi, TwitchApiClient};

#[derive(Debug, Parser)]
#[command(name = "roll-bot", version, about = "Twitch chat bot")]
struct Args {
    /// Configuration file
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    /// Chat from the console against an in-memory channel instead of
    /// connecting to Twitch
    #[arg(long)]
    mock: bool,
}

#[tokio::main]
async fn main() -> AppResult<()> {
    let args = Args::parse();

    // Load configuration
    let config = Config::load(&args.config).context("Failed to load configuration")?;

    // Initialize logging
    init_logging(&config.bot.log_level);

    info!("Starting roll-bot...");

    let store = Store::open(&config.store.path).await?;
    let registry = Arc::new(ModuleRegistry::builtin()?);
    let mut settings = BotSettings::from_config(&config);
    let console_shutdown = CancellationToken::new();

    let (chat, api): (Arc<dyn ChatTransport>, Arc<dyn ChannelApi>) = if args.mock {
        if settings.channel.is_empty() {
            settings.channel = "mock".to_string();
        }
        if settings.admin_user.is_empty() {
            settings.admin_user = "admin".to_string();
        }
        warn!("Mock mode: reading chat from stdin as {}", settings.admin_user);

        let transport = Arc::new(MemoryTransport::echoing());
        let api = MockChannelApi::new(&settings.channel);
        api.add_follower(0, &settings.admin_user);

        tokio::spawn(run_console(
            transport.clone(),
            settings.channel.clone(),
            settings.admin_user.clone(),
            console_shutdown.clone(),
        ));
        (transport, Arc::new(api))
    } else {
        config.validate()?;

        let irc = IrcClient::new(
            &config.irc.address,
            &config.irc.username,
            config.irc.oauth.expose_secret().as_str(),
        );
        let api = TwitchApiClient::new(
            &config.api.url_base,
            &config.api.client_id,
            config.api.oauth.expose_secret().as_str(),
        )?;
        info!("Chat server: {}", irc.address());
        info!("API endpoint: {}", config.api.url_base);
        (Arc::new(irc), Arc::new(api))
    };

    let mut bot = Bot::new(settings, registry, store, chat, api);
    for module in &config.modules {
        bot.add_module_by_name(&module.module_type, module.instance_name())
            .await?;
    }
    info!("Created {} modules", bot.module_names().len());

    bot.connect().await?;
    if let Some(addr) = bot.web_addr() {
        info!("Admin RPC at http://{}/rpc", addr);
    }

    if let Err(e) = signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received");

    console_shutdown.cancel();
    bot.stop().await;

    info!("Shutting down...");
    Ok(())
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
