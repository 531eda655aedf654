use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Discord bot configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    /// Bot token (from DISCORD_BOT_TOKEN env); never written back to disk
    #[serde(default, skip_serializing)]
    pub bot_token: String,
    /// Prefix for text commands, in addition to mentioning the bot
    #[serde(default = "default_prefix")]
    pub command_prefix: String,
    /// Allowed guild (server) IDs (empty = allow all)
    #[serde(default)]
    pub allowed_guilds: Vec<u64>,
    /// Category that new ticket channels are created under (unset = top level)
    #[serde(default)]
    pub ticket_category_id: Option<u64>,
}

fn default_prefix() -> String {
    "-".to_string()
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self::new("")
    }
}

impl DiscordConfig {
    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        let bot_token = std::env::var("DISCORD_BOT_TOKEN")
            .map_err(|_| Error::Discord("DISCORD_BOT_TOKEN not set".to_string()))?;

        let allowed_guilds: Vec<u64> = std::env::var("DISCORD_ALLOWED_GUILDS")
            .ok()
            .map(|s| {
                s.split(',')
                    .filter_map(|id| id.trim().parse().ok())
                    .collect()
            })
            .unwrap_or_default();

        let command_prefix = std::env::var("DISCORD_COMMAND_PREFIX")
            .ok()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(default_prefix);

        let ticket_category_id = std::env::var("DISCORD_TICKET_CATEGORY_ID")
            .ok()
            .and_then(|id| id.trim().parse().ok());

        Ok(Self {
            bot_token,
            command_prefix,
            allowed_guilds,
            ticket_category_id,
        })
    }

    /// Create with a bot token
    #[must_use]
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            command_prefix: default_prefix(),
            allowed_guilds: Vec::new(),
            ticket_category_id: None,
        }
    }

    /// Set allowed guilds
    #[must_use]
    pub fn with_allowed_guilds(mut self, guilds: Vec<u64>) -> Self {
        self.allowed_guilds = guilds;
        self
    }

    /// Set the ticket category
    #[must_use]
    pub fn with_ticket_category(mut self, category_id: u64) -> Self {
        self.ticket_category_id = Some(category_id);
        self
    }

    /// Set the command prefix
    #[must_use]
    pub fn with_command_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.command_prefix = prefix.into();
        self
    }

    /// Fail early on settings the gateway would reject
    pub fn validate(&self) -> Result<()> {
        if self.bot_token.trim().is_empty() {
            return Err(Error::Discord("bot token is empty".to_string()));
        }
        if self.command_prefix.trim().is_empty() {
            return Err(Error::Parse("command prefix is empty".to_string()));
        }
        if self.ticket_category_id == Some(0) {
            return Err(Error::Parse("ticket category id must not be 0".to_string()));
        }
        Ok(())
    }
}
