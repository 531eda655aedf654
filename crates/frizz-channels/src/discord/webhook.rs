//! Webhook client
//!
//! Cards are published and edited through a per-channel webhook owned by the
//! bot, since only webhook messages can later be rewritten by the bot with
//! components-v2 content. Webhook discovery and creation go through
//! serenity; the components-v2 requests themselves are plain reqwest calls
//! because they need the `with_components` query flag.

use crate::error::{Error, Result};
use crate::util::redact_webhook_url;
use async_trait::async_trait;
use frizz_core::{AllowedMentions, Card, MessagingApi, WebhookPayload};
use serde::{Deserialize, Serialize};
use serenity::all::{ChannelId, CreateAttachment, CreateMessage, CreateWebhook, Http, UserId};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument, warn};

/// Webhook identity and HTTP settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Name of the bot-owned webhook in each channel
    #[serde(default = "default_name")]
    pub name: String,
    /// Avatar image uploaded when the webhook is created
    #[serde(default)]
    pub avatar_url: Option<String>,
    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_name() -> String {
    "Frizz".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            avatar_url: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct FetchedMessage {
    #[serde(default)]
    components: Card,
}

#[derive(Debug, Serialize)]
struct TextPayload<'a> {
    content: &'a str,
    username: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    avatar_url: Option<&'a str>,
    allowed_mentions: AllowedMentions,
}

fn message_url(endpoint: &str, message_id: u64) -> String {
    format!("{}/messages/{}", endpoint.trim_end_matches('/'), message_id)
}

/// Discord webhook client
pub struct WebhookClient {
    http: Arc<Http>,
    client: reqwest::Client,
    config: WebhookConfig,
    bot_user_id: OnceCell<UserId>,
}

impl WebhookClient {
    /// Create a client sharing the bot's REST handle
    pub fn new(http: Arc<Http>, config: WebhookConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            client,
            config,
            bot_user_id: OnceCell::new(),
        })
    }

    /// Webhook settings in use
    pub fn config(&self) -> &WebhookConfig {
        &self.config
    }

    async fn bot_user_id(&self) -> Result<UserId> {
        self.bot_user_id
            .get_or_try_init(|| async {
                let me = self.http.get_current_user().await?;
                Ok::<_, Error>(me.id)
            })
            .await
            .copied()
    }

    /// URL of the bot-owned webhook in a channel, if there is one
    pub async fn find_endpoint(&self, channel_id: u64) -> Result<Option<String>> {
        let me = self.bot_user_id().await?;
        let hooks = ChannelId::new(channel_id).webhooks(&self.http).await?;

        let owned = hooks.into_iter().find(|hook| {
            hook.name.as_deref() == Some(self.config.name.as_str())
                && hook.user.as_ref().is_some_and(|user| user.id == me)
        });
        match owned {
            Some(hook) => Ok(Some(hook.url()?)),
            None => Ok(None),
        }
    }

    /// Find the bot-owned webhook or create it; the flag tells whether it
    /// was created now
    #[instrument(skip(self))]
    pub async fn ensure_endpoint(&self, channel_id: u64) -> Result<(String, bool)> {
        if let Some(url) = self.find_endpoint(channel_id).await? {
            return Ok((url, false));
        }

        let avatar = self.download_avatar().await;
        let mut builder = CreateWebhook::new(self.config.name.as_str());
        if let Some(avatar) = &avatar {
            builder = builder.avatar(avatar);
        }
        let hook = ChannelId::new(channel_id)
            .create_webhook(&self.http, builder)
            .await?;
        let url = hook.url()?;
        info!(channel_id, webhook = %redact_webhook_url(&url), "Webhook created");
        Ok((url, true))
    }

    /// A missing avatar never blocks webhook creation
    async fn download_avatar(&self) -> Option<CreateAttachment> {
        let url = self.config.avatar_url.as_deref()?;
        let fetched = async {
            let response = check(self.client.get(url).send().await?).await?;
            Ok::<_, Error>(response.bytes().await?)
        }
        .await;

        match fetched {
            Ok(bytes) => Some(CreateAttachment::bytes(bytes.to_vec(), "avatar.png")),
            Err(e) => {
                warn!(error = %e, "Failed to download webhook avatar");
                None
            }
        }
    }

    /// Post plain text through a webhook
    pub async fn send_text(&self, endpoint: &str, content: &str) -> Result<()> {
        let payload = TextPayload {
            content,
            username: &self.config.name,
            avatar_url: self.config.avatar_url.as_deref(),
            allowed_mentions: AllowedMentions::default(),
        };
        check(self.client.post(endpoint).json(&payload).send().await?).await?;
        Ok(())
    }
}

/// Turn a non-success response into [`Error::Http`] carrying the body
async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(Error::Http {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl MessagingApi for WebhookClient {
    async fn ensure_delivery_endpoint(&self, channel_id: u64) -> frizz_core::Result<String> {
        let (url, _) = self.ensure_endpoint(channel_id).await?;
        Ok(url)
    }

    async fn fetch_message(&self, endpoint: &str, message_id: u64) -> frizz_core::Result<Card> {
        let response = self
            .client
            .get(message_url(endpoint, message_id))
            .send()
            .await
            .map_err(Error::from)?;
        let body = check(response)
            .await?
            .text()
            .await
            .map_err(Error::from)?;

        let message: FetchedMessage = serde_json::from_str(&body)?;
        debug!(message_id, blocks = message.components.components().len(), "Fetched webhook message");
        Ok(message.components)
    }

    async fn edit_message(
        &self,
        endpoint: &str,
        message_id: u64,
        card: &Card,
    ) -> frizz_core::Result<()> {
        let response = self
            .client
            .patch(message_url(endpoint, message_id))
            .query(&[("with_components", "true")])
            .json(&serde_json::json!({ "components": card }))
            .send()
            .await
            .map_err(Error::from)?;
        check(response).await?;
        Ok(())
    }

    async fn publish(&self, endpoint: &str, payload: &WebhookPayload) -> frizz_core::Result<()> {
        let response = self
            .client
            .post(endpoint)
            .query(&[("with_components", "true")])
            .json(payload)
            .send()
            .await
            .map_err(Error::from)?;
        check(response).await?;
        debug!(webhook = %redact_webhook_url(endpoint), "Card published");
        Ok(())
    }

    async fn announce(&self, channel_id: u64, content: &str) -> frizz_core::Result<()> {
        ChannelId::new(channel_id)
            .send_message(&self.http, CreateMessage::new().content(content))
            .await
            .map_err(Error::from)?;
        Ok(())
    }
}
