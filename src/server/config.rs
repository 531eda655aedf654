//! Application configuration types
//!
//! Mirrors the sections of `config/default.toml`.

use anyhow::{Context, Result};
use frizz_channels::{DiscordConfig, WebhookConfig};
use frizz_core::{BuilderConfig, Error, GiveawayConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Discord allows at most five buttons in one action row
const MAX_ROW_CAPACITY: usize = 5;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub discord: DiscordConfig,
    #[serde(default)]
    pub builder: BuilderSettings,
    #[serde(default)]
    pub giveaway: GiveawaySettings,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Builder session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuilderSettings {
    #[serde(default = "default_input_timeout_secs")]
    pub input_timeout_secs: u64,
    #[serde(default = "default_row_capacity")]
    pub row_capacity: usize,
}

fn default_input_timeout_secs() -> u64 {
    600
}

fn default_row_capacity() -> usize {
    MAX_ROW_CAPACITY
}

impl Default for BuilderSettings {
    fn default() -> Self {
        Self {
            input_timeout_secs: default_input_timeout_secs(),
            row_capacity: default_row_capacity(),
        }
    }
}

/// Giveaway settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GiveawaySettings {
    #[serde(default = "default_min_duration_secs")]
    pub min_duration_secs: u64,
    #[serde(default = "default_display_cap")]
    pub display_cap: usize,
    #[serde(default)]
    pub prune_after_failures: Option<u32>,
}

fn default_min_duration_secs() -> u64 {
    5
}

fn default_display_cap() -> usize {
    30
}

impl Default for GiveawaySettings {
    fn default() -> Self {
        Self {
            min_duration_secs: default_min_duration_secs(),
            display_cap: default_display_cap(),
            prune_after_failures: None,
        }
    }
}

/// Logging settings. `RUST_LOG` still wins over `filter`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_filter")]
    pub filter: String,
    #[serde(default)]
    pub json: bool,
}

fn default_filter() -> String {
    "frizz=info,frizz_core=info,frizz_channels=info,serenity=warn".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            json: false,
        }
    }
}

fn invalid(field: &str, message: &str) -> Error {
    Error::InvalidConfig {
        field: field.to_string(),
        message: message.to_string(),
    }
}

impl AppConfig {
    /// Reject values the bot cannot run with.
    ///
    /// The bot token is checked separately when the gateway starts so that
    /// `config show` works without one.
    pub fn validate(&self) -> frizz_core::Result<()> {
        if self.discord.command_prefix.trim().is_empty() {
            return Err(invalid("discord.command_prefix", "must not be empty"));
        }
        if self.discord.ticket_category_id == Some(0) {
            return Err(invalid(
                "discord.ticket_category_id",
                "must be a channel id or left unset",
            ));
        }
        if self.builder.input_timeout_secs == 0 {
            return Err(invalid("builder.input_timeout_secs", "must be positive"));
        }
        if !(1..=MAX_ROW_CAPACITY).contains(&self.builder.row_capacity) {
            return Err(invalid("builder.row_capacity", "must be between 1 and 5"));
        }
        if self.giveaway.display_cap == 0 {
            return Err(invalid("giveaway.display_cap", "must be positive"));
        }
        if self.giveaway.prune_after_failures == Some(0) {
            return Err(invalid(
                "giveaway.prune_after_failures",
                "must be positive or left unset",
            ));
        }
        if self.webhook.name.trim().is_empty() {
            return Err(invalid("webhook.name", "must not be empty"));
        }
        if self.webhook.timeout_secs == 0 {
            return Err(invalid("webhook.timeout_secs", "must be positive"));
        }
        Ok(())
    }

    /// Builder settings for new sessions
    pub fn builder_config(&self) -> BuilderConfig {
        let mut config = BuilderConfig::default()
            .with_input_timeout(Duration::from_secs(self.builder.input_timeout_secs))
            .with_webhook_identity(self.webhook.name.clone(), self.webhook.avatar_url.clone());
        config.row_capacity = self.builder.row_capacity;
        config
    }

    /// Giveaway manager settings
    pub fn giveaway_config(&self) -> GiveawayConfig {
        GiveawayConfig {
            min_duration: Duration::from_secs(self.giveaway.min_duration_secs),
            display_cap: self.giveaway.display_cap,
            prune_after_failures: self.giveaway.prune_after_failures,
        }
    }

    /// Write the configuration as TOML. The bot token is never written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        fs::write(path, content).context("Failed to write config file")?;
        Ok(())
    }
}
