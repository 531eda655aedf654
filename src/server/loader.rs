//! Configuration loading
//!
//! Embedded defaults, then optional files, then `FRIZZ_*` environment variables.

use super::config::AppConfig;
use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};

/// Embedded default configuration (compiled into binary)
pub const DEFAULT_CONFIG: &str = include_str!("../../config/default.toml");

/// Load configuration from files and environment
pub fn load_config() -> Result<AppConfig> {
    let env_name = std::env::var("FRIZZ_ENV").unwrap_or_else(|_| "development".to_string());

    let config = Config::builder()
        .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
        .add_source(File::with_name("config/default").required(false))
        .add_source(File::with_name(&format!("config/{}", env_name)).required(false))
        .add_source(File::with_name("config/local").required(false))
        // FRIZZ_GIVEAWAY__DISPLAY_CAP=10 maps to giveaway.display_cap
        .add_source(
            Environment::with_prefix("FRIZZ")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    let mut app: AppConfig = config
        .try_deserialize()
        .context("Failed to deserialize configuration")?;

    // The token normally lives in .env under the name Discord docs use
    if app.discord.bot_token.trim().is_empty() {
        if let Ok(token) = std::env::var("DISCORD_BOT_TOKEN") {
            app.discord.bot_token = token;
        }
    }
    if app.discord.allowed_guilds.is_empty() {
        if let Ok(guilds) = std::env::var("DISCORD_ALLOWED_GUILDS") {
            app.discord.allowed_guilds = parse_guild_list(&guilds);
        }
    }

    Ok(app)
}

fn parse_guild_list(raw: &str) -> Vec<u64> {
    raw.split(',')
        .filter_map(|id| id.trim().parse().ok())
        .collect()
}
