//! Frizz - Discord card builder and giveaway bot
//!
//! CLI entry point.

#![forbid(unsafe_code)]

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod cli;
mod server;

fn init_tracing(logging: &server::config::LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.filter));

    let registry = tracing_subscriber::registry().with(filter);
    if logging.json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    let cli = cli::Cli::parse();

    // A broken config is reported by the command itself; logging falls back to defaults
    let logging = server::load_config()
        .map(|config| config.logging)
        .unwrap_or_default();
    init_tracing(&logging);

    if matches!(cli.command, Some(cli::Commands::Serve)) {
        info!("Starting Frizz v{}", env!("CARGO_PKG_VERSION"));

        if !std::path::Path::new(".env").exists() {
            warn!(".env file not found. Copy .env.example and set DISCORD_BOT_TOKEN.");
        }
    }

    cli::run(cli).await
}
