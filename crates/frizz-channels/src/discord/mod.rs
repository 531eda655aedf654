//! Discord - serenity adapter

pub mod adapter;
pub mod commands;
pub mod config;
pub mod handler;
pub mod tickets;
pub mod transport;
pub mod webhook;

pub use adapter::DiscordAdapter;
pub use config::DiscordConfig;
pub use transport::ChannelTransport;
pub use webhook::{WebhookClient, WebhookConfig};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discord_config() {
        let config = DiscordConfig::new("test_token")
            .with_allowed_guilds(vec![123, 456])
            .with_command_prefix("!");

        assert_eq!(config.bot_token, "test_token");
        assert_eq!(config.allowed_guilds, vec![123, 456]);
        assert_eq!(config.command_prefix, "!");
        tokio_test::assert_ok!(config.validate());
    }

    #[test]
    fn test_config_validation() {
        assert!(DiscordConfig::new("").validate().is_err());
        assert!(DiscordConfig::new("token")
            .with_command_prefix(" ")
            .validate()
            .is_err());
        assert!(DiscordConfig::new("token")
            .with_ticket_category(0)
            .validate()
            .is_err());
        tokio_test::assert_ok!(DiscordConfig::new("token").with_ticket_category(42).validate());
    }

    #[test]
    fn test_guild_allowed() {
        let config = DiscordConfig::new("token").with_allowed_guilds(vec![123, 456]);
        let adapter = DiscordAdapter::new(config);

        assert!(adapter.is_guild_allowed(123));
        assert!(adapter.is_guild_allowed(456));
        assert!(!adapter.is_guild_allowed(789));
    }

    #[test]
    fn test_empty_allowlist_allows_all() {
        let config = DiscordConfig::new("token");
        let adapter = DiscordAdapter::new(config);

        assert!(adapter.is_guild_allowed(123));
        assert!(adapter.is_guild_allowed(999999));
    }
}
