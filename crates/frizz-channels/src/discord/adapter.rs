use super::config::DiscordConfig;
use super::handler::DiscordHandler;
use super::webhook::{WebhookClient, WebhookConfig};
use crate::error::{Error, Result};
use frizz_core::{BuilderConfig, GiveawayConfig, GiveawayManager, SessionRegistry};
use serenity::all::{Client, GatewayIntents, Http, ShardId, ShardManager};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, instrument};

/// Discord bot adapter
pub struct DiscordAdapter {
    pub(crate) config: DiscordConfig,
    pub(crate) builder: BuilderConfig,
    pub(crate) giveaway: GiveawayConfig,
    pub(crate) webhook: WebhookConfig,
    pub(crate) bot_user_id: AtomicU64,
    pub(crate) shard_manager: RwLock<Option<Arc<ShardManager>>>,
    pub(crate) sessions: Arc<SessionRegistry>,
}

impl DiscordAdapter {
    /// Create a new Discord adapter
    #[must_use]
    pub fn new(config: DiscordConfig) -> Self {
        Self {
            config,
            builder: BuilderConfig::default(),
            giveaway: GiveawayConfig::default(),
            webhook: WebhookConfig::default(),
            bot_user_id: AtomicU64::new(0),
            shard_manager: RwLock::new(None),
            sessions: SessionRegistry::new(),
        }
    }

    /// Create from environment
    pub fn from_env() -> Result<Self> {
        let config = DiscordConfig::from_env()?;
        Ok(Self::new(config))
    }

    /// Set builder settings
    #[must_use]
    pub fn with_builder_config(mut self, builder: BuilderConfig) -> Self {
        self.builder = builder;
        self
    }

    /// Set giveaway settings
    #[must_use]
    pub fn with_giveaway_config(mut self, giveaway: GiveawayConfig) -> Self {
        self.giveaway = giveaway;
        self
    }

    /// Set webhook settings
    #[must_use]
    pub fn with_webhook_config(mut self, webhook: WebhookConfig) -> Self {
        self.webhook = webhook;
        self
    }

    /// Check if a guild is allowed
    pub fn is_guild_allowed(&self, guild_id: u64) -> bool {
        self.config.allowed_guilds.is_empty() || self.config.allowed_guilds.contains(&guild_id)
    }

    /// Get the bot user ID
    pub fn bot_user_id(&self) -> u64 {
        self.bot_user_id.load(Ordering::SeqCst)
    }

    /// Builder settings with the webhook identity filled in
    pub fn builder_config(&self) -> BuilderConfig {
        self.builder
            .clone()
            .with_webhook_identity(self.webhook.name.clone(), self.webhook.avatar_url.clone())
    }

    /// Strip the command prefix or a leading bot mention.
    ///
    /// Returns `None` when the message is not addressed to the bot.
    pub fn strip_command_prefix<'a>(&self, content: &'a str) -> Option<&'a str> {
        let content = content.trim_start();
        if let Some(rest) = content.strip_prefix(self.config.command_prefix.as_str()) {
            return Some(rest.trim_start());
        }

        let bot_id = self.bot_user_id();
        if bot_id == 0 {
            return None;
        }
        [format!("<@{}>", bot_id), format!("<@!{}>", bot_id)]
            .iter()
            .find_map(|mention| content.strip_prefix(mention.as_str()))
            .map(str::trim_start)
    }

    /// Heartbeat latency of a shard, once measured
    pub async fn gateway_latency(&self, shard_id: ShardId) -> Option<Duration> {
        let manager = self.shard_manager.read().await.clone()?;
        let runners = manager.runners.lock().await;
        runners.get(&shard_id)?.latency
    }

    /// Start the bot
    #[instrument(skip(self))]
    pub async fn run(self: Arc<Self>) -> Result<()> {
        info!("Starting Discord bot");
        self.config.validate()?;

        let intents = GatewayIntents::GUILDS
            | GatewayIntents::GUILD_MESSAGES
            | GatewayIntents::MESSAGE_CONTENT;

        // Giveaway timers announce outside of any gateway event, so the
        // webhook client keeps its own REST handle.
        let http = Arc::new(Http::new(&self.config.bot_token));
        let webhooks = Arc::new(WebhookClient::new(http, self.webhook.clone())?);
        let giveaways = GiveawayManager::new(webhooks.clone(), self.giveaway.clone());

        let handler = DiscordHandler::new(self.clone(), webhooks, giveaways);

        let mut client = Client::builder(&self.config.bot_token, intents)
            .event_handler(handler)
            .await
            .map_err(|e| Error::Discord(format!("Failed to create client: {}", e)))?;

        {
            let mut manager_guard = self.shard_manager.write().await;
            *manager_guard = Some(client.shard_manager.clone());
        }

        client
            .start()
            .await
            .map_err(|e| Error::Discord(format!("Client error: {}", e)))?;

        Ok(())
    }
}
