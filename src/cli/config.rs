//! `frizz config {init,show}`

use crate::server::config::AppConfig;
use crate::server::load_config;
use anyhow::{bail, Context, Result};
use clap::Subcommand;
use std::path::Path;

const LOCAL_CONFIG_PATH: &str = "config/local.toml";

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Write config/local.toml from the built-in defaults
    Init {
        /// Overwrite an existing config/local.toml
        #[arg(long)]
        force: bool,
    },
    /// Print the effective configuration (token hidden)
    Show,
}

pub fn run(cmd: ConfigCommands) -> Result<()> {
    match cmd {
        ConfigCommands::Init { force } => cmd_init(force),
        ConfigCommands::Show => cmd_show(),
    }
}

fn cmd_init(force: bool) -> Result<()> {
    let path = Path::new(LOCAL_CONFIG_PATH);
    if path.exists() && !force {
        bail!("{} already exists. Use --force to overwrite it.", LOCAL_CONFIG_PATH);
    }

    AppConfig::default().save(path)?;
    println!("Wrote {}", LOCAL_CONFIG_PATH);
    println!("Put DISCORD_BOT_TOKEN in .env; it is never stored in config files.");
    Ok(())
}

fn cmd_show() -> Result<()> {
    let config = load_config().context("Failed to load configuration")?;
    let rendered = toml::to_string_pretty(&config).context("Failed to serialize config")?;
    println!("{}", rendered);

    let token = if config.discord.bot_token.trim().is_empty() {
        "not set"
    } else {
        "set"
    };
    println!("# bot token: {}", token);

    if let Err(e) = config.validate() {
        println!("# warning: {}", e);
    }
    Ok(())
}
