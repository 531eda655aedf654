use crate::error::Error;
use crate::util::{mask_for_logging, split_message, DISCORD_MESSAGE_LIMIT};
use async_trait::async_trait;
use frizz_core::ChatTransport;
use serenity::all::{ChannelId, CreateMessage, Http, MessageCollector, ShardMessenger, UserId};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Builder conversation with one operator in one text channel
pub struct ChannelTransport {
    http: Arc<Http>,
    shard: ShardMessenger,
    channel_id: ChannelId,
    user_id: UserId,
}

impl ChannelTransport {
    /// Listen to `user_id` in `channel_id`
    pub fn new(http: Arc<Http>, shard: ShardMessenger, channel_id: u64, user_id: u64) -> Self {
        Self {
            http,
            shard,
            channel_id: ChannelId::new(channel_id),
            user_id: UserId::new(user_id),
        }
    }
}

#[async_trait]
impl ChatTransport for ChannelTransport {
    async fn next_line(&mut self, timeout: Duration) -> Option<String> {
        let message = MessageCollector::new(&self.shard)
            .channel_id(self.channel_id)
            .author_id(self.user_id)
            .timeout(timeout)
            .next()
            .await?;

        debug!(
            channel_id = %self.channel_id,
            user_id = %self.user_id,
            text = %mask_for_logging(&message.content),
            "Builder line received"
        );
        Some(message.content)
    }

    async fn reply(&mut self, text: &str) -> frizz_core::Result<()> {
        for chunk in split_message(text, DISCORD_MESSAGE_LIMIT) {
            self.channel_id
                .send_message(&self.http, CreateMessage::new().content(chunk))
                .await
                .map_err(Error::from)?;
        }
        Ok(())
    }
}
