//! Collaborator seams
//!
//! The core never talks to Discord directly. Everything it needs from the
//! outside world goes through [`MessagingApi`] (webhooks, message fetch and
//! edit, plain announcements) and [`ChatTransport`] (one operator's line-based
//! conversation with the builder).

use crate::blocks::{Block, Card};
use crate::error::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

/// Message flag enabling the components-v2 layout
pub const COMPONENTS_V2_FLAG: u64 = 1 << 15;

/// Text shown when a card is published with no content at all
pub const EMPTY_CARD_PLACEHOLDER: &str = "*(empty card)*";

/// Mention parsing rules attached to a published message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AllowedMentions {
    /// Mention kinds to resolve; empty disables all pings
    pub parse: Vec<String>,
}

/// Body of a webhook execution
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebhookPayload {
    /// Message flags
    pub flags: u64,
    /// Card tree
    pub components: Vec<Block>,
    /// Display name of the webhook
    pub username: String,
    /// Display avatar of the webhook
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    /// Mention rules
    pub allowed_mentions: AllowedMentions,
}

impl WebhookPayload {
    /// Components-v2 payload for a finished card.
    ///
    /// An empty card is replaced with a single placeholder text block since
    /// Discord refuses messages without content.
    pub fn card(
        components: Vec<Block>,
        username: impl Into<String>,
        avatar_url: Option<String>,
    ) -> Self {
        let components = if components.is_empty() {
            vec![Block::text(EMPTY_CARD_PLACEHOLDER)]
        } else {
            components
        };

        Self {
            flags: COMPONENTS_V2_FLAG,
            components,
            username: username.into(),
            avatar_url,
            allowed_mentions: AllowedMentions::default(),
        }
    }
}

/// Remote messaging operations
#[async_trait]
pub trait MessagingApi: Send + Sync {
    /// Find or create the delivery webhook of a channel; returns its URL
    async fn ensure_delivery_endpoint(&self, channel_id: u64) -> Result<String>;

    /// Fetch the card of a message sent through `endpoint`
    async fn fetch_message(&self, endpoint: &str, message_id: u64) -> Result<Card>;

    /// Replace the card of a message sent through `endpoint`
    async fn edit_message(&self, endpoint: &str, message_id: u64, card: &Card) -> Result<()>;

    /// Execute `endpoint` with a payload
    async fn publish(&self, endpoint: &str, payload: &WebhookPayload) -> Result<()>;

    /// Post plain text to a channel as the bot itself
    async fn announce(&self, channel_id: u64, content: &str) -> Result<()>;
}

/// Line-based conversation with a single operator
#[async_trait]
pub trait ChatTransport: Send {
    /// Wait for the operator's next line; `None` once `timeout` elapses
    async fn next_line(&mut self, timeout: Duration) -> Option<String>;

    /// Send a reply to the operator
    async fn reply(&mut self, text: &str) -> Result<()>;
}
