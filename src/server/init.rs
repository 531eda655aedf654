//! Bot startup and run loop

use super::config::AppConfig;
use super::loader::load_config;
use super::shutdown::wait_for_shutdown_signal;
use anyhow::{Context, Result};
use frizz_channels::DiscordAdapter;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// How long background work gets to finish after a shutdown signal
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Build the Discord adapter from application config
fn build_adapter(config: &AppConfig) -> DiscordAdapter {
    DiscordAdapter::new(config.discord.clone())
        .with_builder_config(config.builder_config())
        .with_giveaway_config(config.giveaway_config())
        .with_webhook_config(config.webhook.clone())
}

/// Run the bot until a shutdown signal arrives or the gateway stops
pub async fn run() -> Result<()> {
    let config = load_config().context("Failed to load configuration")?;
    config.validate()?;
    config
        .discord
        .validate()
        .map_err(frizz_core::Error::from)
        .context("Discord is not configured. Set DISCORD_BOT_TOKEN in .env")?;

    info!(
        prefix = %config.discord.command_prefix,
        allowed_guilds = config.discord.allowed_guilds.len(),
        webhook = %config.webhook.name,
        "Configuration loaded"
    );

    let adapter = Arc::new(build_adapter(&config));
    let shutdown = CancellationToken::new();

    let bot_shutdown = shutdown.clone();
    let mut bot = tokio::spawn(async move {
        tokio::select! {
            result = adapter.run() => {
                if let Err(e) = result {
                    error!(error = %e, "Discord adapter stopped with an error");
                }
            }
            _ = bot_shutdown.cancelled() => {
                info!("Discord adapter shutting down");
            }
        }
    });

    tokio::select! {
        _ = wait_for_shutdown_signal() => {}
        joined = &mut bot => {
            if let Err(e) = joined {
                error!(error = %e, "Discord adapter task panicked");
            }
            warn!("Discord adapter exited, shutting down");
            return Ok(());
        }
    }

    shutdown.cancel();
    if tokio::time::timeout(SHUTDOWN_GRACE, bot).await.is_err() {
        warn!("Discord adapter did not stop in time");
    }

    info!("Frizz stopped");
    Ok(())
}
