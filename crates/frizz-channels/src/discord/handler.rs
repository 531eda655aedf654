use super::adapter::DiscordAdapter;
use super::commands::{DiscordCommands, PrefixCommand};
use super::tickets::{self, TicketCategory, TicketRequest, TICKET_PANEL_COMMAND};
use super::transport::ChannelTransport;
use super::webhook::WebhookClient;
use crate::util::{mask_for_logging, split_message, DISCORD_MESSAGE_LIMIT};
use frizz_core::{
    format_error_for_chat, BuilderSession, GiveawayManager, SessionKey, UserFriendlyError,
};
use serenity::all::{
    ActionRowComponent, Channel, ChannelId, Command, CommandDataOptionValue, CommandInteraction,
    CommandOptionType, ComponentInteraction, Context, CreateCommand, CreateCommandOption,
    CreateInteractionResponse, CreateInteractionResponseMessage, CreateMessage,
    EditInteractionResponse, EventHandler, GuildId, Interaction, Message, MessageReference,
    ModalInteraction, Ready,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Custom id prefix of giveaway join buttons
const JOIN_PREFIX: &str = "gaw:join:";

/// What a button click asks for, decided from its custom id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ComponentAction<'a> {
    /// Toggle membership of a giveaway
    Join(&'a str),
    /// Open the description modal of a ticket category
    OpenTicket(TicketCategory),
    Unknown,
}

impl<'a> ComponentAction<'a> {
    fn route(custom_id: &'a str) -> Self {
        if let Some(giveaway_id) = custom_id.strip_prefix(JOIN_PREFIX) {
            return if giveaway_id.is_empty() {
                Self::Unknown
            } else {
                Self::Join(giveaway_id)
            };
        }
        tickets::parse_open_button(custom_id).map_or(Self::Unknown, Self::OpenTicket)
    }
}

/// Discord event handler
pub struct DiscordHandler {
    adapter: Arc<DiscordAdapter>,
    webhooks: Arc<WebhookClient>,
    commands: DiscordCommands,
}

impl DiscordHandler {
    /// Create a new Discord event handler.
    pub fn new(
        adapter: Arc<DiscordAdapter>,
        webhooks: Arc<WebhookClient>,
        giveaways: Arc<GiveawayManager>,
    ) -> Self {
        Self {
            adapter,
            webhooks,
            commands: DiscordCommands::new(giveaways),
        }
    }
}

#[serenity::async_trait]
impl EventHandler for DiscordHandler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("Discord bot connected as {}", ready.user.name);

        // Store bot user ID
        self.adapter
            .bot_user_id
            .store(ready.user.id.get(), Ordering::SeqCst);

        let commands = vec![
            CreateCommand::new("create_webhook")
                .description("Create the card webhook in a channel if it does not exist yet")
                .add_option(
                    CreateCommandOption::new(
                        CommandOptionType::Channel,
                        "canal",
                        "Channel that gets the webhook",
                    )
                    .required(true),
                ),
            CreateCommand::new("send_webhook")
                .description("Send a plain message through the card webhook")
                .add_option(
                    CreateCommandOption::new(
                        CommandOptionType::Channel,
                        "canal",
                        "Channel to post in",
                    )
                    .required(true),
                )
                .add_option(
                    CreateCommandOption::new(
                        CommandOptionType::String,
                        "message",
                        "Message to send",
                    )
                    .required(true),
                ),
            tickets::panel_command(),
        ];

        match Command::set_global_commands(&ctx.http, commands).await {
            Ok(cmds) => info!("Registered {} Discord slash commands", cmds.len()),
            Err(e) => error!(error = %e, "Failed to register Discord slash commands"),
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        match interaction {
            Interaction::Command(command) => self.handle_slash(&ctx, &command).await,
            Interaction::Component(component) => self.handle_component(&ctx, &component).await,
            Interaction::Modal(modal) => self.handle_modal(&ctx, &modal).await,
            _ => {}
        }
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }
        let Some(guild_id) = msg.guild_id.map(|g| g.get()) else {
            return;
        };
        if !self.adapter.is_guild_allowed(guild_id) {
            debug!(guild_id, "Guild not allowed");
            return;
        }
        let Some(line) = self.adapter.strip_command_prefix(&msg.content) else {
            return;
        };
        let Some(parsed) = PrefixCommand::parse(line) else {
            return;
        };

        info!(
            guild_id,
            channel_id = %msg.channel_id,
            user_id = %msg.author.id,
            text = %mask_for_logging(line),
            "Received Discord command"
        );

        let command = match parsed {
            Ok(command) => command,
            Err(e) => {
                reply(&ctx, &msg, &e.user_message()).await;
                return;
            }
        };

        let response = match command {
            PrefixCommand::BuildCard { channel_id } => {
                self.start_builder(&ctx, &msg, guild_id, channel_id).await;
                return;
            }
            PrefixCommand::Ping => match self.adapter.gateway_latency(ctx.shard_id).await {
                Some(latency) => format!("**Pong!** Gateway latency is {} ms.", latency.as_millis()),
                None => "**Pong!** Gateway latency is not measured yet.".to_string(),
            },
            PrefixCommand::GiveawaySet {
                id,
                channel_id,
                duration,
                winners,
            } => {
                if !channel_in_guild(&ctx, channel_id, guild_id).await {
                    reply(&ctx, &msg, CHANNEL_NOT_FOUND).await;
                    return;
                }
                self.commands
                    .handle_set(guild_id, &id, channel_id, duration, winners)
                    .await
            }
            PrefixCommand::GiveawayEnd { id } => self.commands.handle_end(&id).await,
            PrefixCommand::GiveawayBind {
                id,
                channel_id,
                message_id,
            } => {
                if !channel_in_guild(&ctx, channel_id, guild_id).await {
                    reply(&ctx, &msg, CHANNEL_NOT_FOUND).await;
                    return;
                }
                self.commands.handle_bind(&id, channel_id, message_id).await
            }
            PrefixCommand::GiveawayUnbind { id, message_id } => {
                self.commands.handle_unbind(&id, message_id).await
            }
            PrefixCommand::GiveawayParticipants { id } => {
                self.commands.handle_participants(&id).await
            }
        };

        reply(&ctx, &msg, &response).await;
    }
}

const CHANNEL_NOT_FOUND: &str = "That channel was not found in this server.";

impl DiscordHandler {
    /// Claim the operator's session and run the builder in the background
    async fn start_builder(&self, ctx: &Context, msg: &Message, guild_id: u64, channel_id: u64) {
        if !channel_in_guild(ctx, channel_id, guild_id).await {
            reply(ctx, msg, CHANNEL_NOT_FOUND).await;
            return;
        }

        let key = SessionKey::new(guild_id, msg.author.id.get());
        let guard = match self.adapter.sessions.claim(key) {
            Ok(guard) => guard,
            Err(e) => {
                reply(ctx, msg, &format_error_for_chat(&e)).await;
                return;
            }
        };

        let builder = BuilderSession::new(
            guild_id,
            msg.channel_id.get(),
            channel_id,
            self.adapter.builder_config(),
        );
        let mut transport = ChannelTransport::new(
            ctx.http.clone(),
            ctx.shard.clone(),
            msg.channel_id.get(),
            msg.author.id.get(),
        );
        let webhooks = self.webhooks.clone();

        tokio::spawn(async move {
            // Released when the run ends, however it ends
            let _guard = guard;
            let outcome = builder.run(&mut transport, webhooks.as_ref()).await;
            info!(guild_id, target_channel_id = channel_id, ?outcome, "Builder session finished");
        });
    }

    /// Handle join and ticket panel button clicks
    async fn handle_component(&self, ctx: &Context, component: &ComponentInteraction) {
        let builder = match ComponentAction::route(&component.data.custom_id) {
            ComponentAction::Join(giveaway_id) => {
                self.handle_join(ctx, component, giveaway_id).await;
                return;
            }
            ComponentAction::OpenTicket(category) => {
                CreateInteractionResponse::Modal(tickets::description_modal(category))
            }
            ComponentAction::Unknown => CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content("Unknown action.")
                    .ephemeral(true),
            ),
        };
        if let Err(e) = component.create_response(&ctx.http, builder).await {
            error!(error = %e, "Failed to respond to component interaction");
        }
    }

    async fn handle_join(&self, ctx: &Context, component: &ComponentInteraction, giveaway_id: &str) {
        // Acknowledged before the record is touched, so a slow card update
        // never pushes the reply past the three second window
        if let Err(e) = component.defer_ephemeral(&ctx.http).await {
            error!(error = %e, "Failed to defer join click");
            return;
        }

        let giveaways = self.commands.giveaways();
        let outcome = giveaways
            .toggle_participant(giveaway_id, component.user.id.get())
            .await;

        let builder = EditInteractionResponse::new().content(outcome.message());
        if let Err(e) = component.edit_response(&ctx.http, builder).await {
            error!(error = %e, "Failed to respond to join click");
        }

        giveaways.refresh(giveaway_id).await;
    }

    /// Handle ticket description modals
    async fn handle_modal(&self, ctx: &Context, modal: &ModalInteraction) {
        let Some(category) = tickets::parse_modal_id(&modal.data.custom_id) else {
            debug!(custom_id = %modal.data.custom_id, "Ignoring unknown modal");
            return;
        };
        let Some(guild_id) = modal
            .guild_id
            .filter(|g| self.adapter.is_guild_allowed(g.get()))
        else {
            return;
        };

        // Channel creation can outlast the three second response window
        if let Err(e) = modal.defer_ephemeral(&ctx.http).await {
            error!(error = %e, "Failed to defer ticket modal");
            return;
        }

        let opener_name = modal
            .member
            .as_ref()
            .map_or_else(|| modal.user.display_name(), |member| member.display_name())
            .to_string();
        let response = match self
            .open_ticket(ctx, guild_id, category, modal.user.id.get(), opener_name, modal_description(modal))
            .await
        {
            Ok(channel) => format!("Ticket created: <#{}>", channel),
            Err(e) => {
                warn!(guild_id = %guild_id, error = %e, "Ticket creation failed");
                format_error_for_chat(&frizz_core::Error::from(e))
            }
        };

        let builder = EditInteractionResponse::new().content(response);
        if let Err(e) = modal.edit_response(&ctx.http, builder).await {
            error!(error = %e, "Failed to edit ticket modal response");
        }
    }

    /// Create the private channel and post the description in it
    async fn open_ticket(
        &self,
        ctx: &Context,
        guild_id: GuildId,
        category: TicketCategory,
        opener_id: u64,
        opener_name: String,
        description: Option<&str>,
    ) -> crate::Result<ChannelId> {
        let description = tickets::check_description(description.unwrap_or_default())?;
        let request = TicketRequest {
            category,
            guild_id: guild_id.get(),
            opener_id,
            opener_name,
            description: description.to_string(),
        };

        let bot = Some(self.adapter.bot_user_id()).filter(|id| *id != 0);
        let channel = guild_id
            .create_channel(
                &ctx.http,
                request.channel(self.adapter.config.ticket_category_id, bot),
            )
            .await?;
        channel
            .id
            .send_message(&ctx.http, request.opening_message())
            .await?;

        info!(
            guild_id = %guild_id,
            channel_id = %channel.id,
            user_id = opener_id,
            category = category.slug(),
            "Ticket opened"
        );
        Ok(channel.id)
    }

    async fn handle_slash(&self, ctx: &Context, command: &CommandInteraction) {
        let guild_allowed = command
            .guild_id
            .is_some_and(|g| self.adapter.is_guild_allowed(g.get()));
        if !guild_allowed {
            let builder = CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content("This command only works inside a server.")
                    .ephemeral(true),
            );
            if let Err(e) = command.create_response(&ctx.http, builder).await {
                error!(error = %e, "Failed to respond to slash command");
            }
            return;
        }

        // Webhook creation can outlast the three second response window
        if let Err(e) = command.defer_ephemeral(&ctx.http).await {
            error!(error = %e, "Failed to defer slash command");
            return;
        }

        let response = match command.data.name.as_str() {
            "create_webhook" => match channel_option(command, "canal") {
                Some(channel) => match self.webhooks.ensure_endpoint(channel.get()).await {
                    Ok((_, true)) => format!("Webhook created in <#{}>.", channel),
                    Ok((_, false)) => format!("A webhook already exists in <#{}>.", channel),
                    Err(e) => format_error_for_chat(&frizz_core::Error::from(e)),
                },
                None => "Please choose a channel.".to_string(),
            },
            TICKET_PANEL_COMMAND => match command
                .channel_id
                .send_message(&ctx.http, tickets::panel_message())
                .await
            {
                Ok(_) => "Panel published.".to_string(),
                Err(e) => format_error_for_chat(&frizz_core::Error::from(crate::Error::from(e))),
            },
            "send_webhook" => {
                match (
                    channel_option(command, "canal"),
                    string_option(command, "message"),
                ) {
                    (Some(channel), Some(message)) => self.send_through_webhook(channel, &message).await,
                    _ => "Please choose a channel and a message.".to_string(),
                }
            }
            _ => "Unknown command".to_string(),
        };

        let builder = EditInteractionResponse::new().content(response);
        if let Err(e) = command.edit_response(&ctx.http, builder).await {
            error!(error = %e, "Failed to edit slash command response");
        }
    }

    async fn send_through_webhook(&self, channel: ChannelId, message: &str) -> String {
        let sent = async {
            let (endpoint, _) = self.webhooks.ensure_endpoint(channel.get()).await?;
            self.webhooks.send_text(&endpoint, message).await
        }
        .await;

        match sent {
            Ok(()) => "Message sent through the webhook.".to_string(),
            Err(e) => {
                warn!(channel_id = %channel, error = %e, "Webhook message failed");
                format_error_for_chat(&frizz_core::Error::from(e))
            }
        }
    }
}

/// Whether `channel_id` is a channel of `guild_id`
async fn channel_in_guild(ctx: &Context, channel_id: u64, guild_id: u64) -> bool {
    match ChannelId::new(channel_id).to_channel(&ctx.http).await {
        Ok(Channel::Guild(channel)) => channel.guild_id.get() == guild_id,
        Ok(_) => false,
        Err(e) => {
            debug!(channel_id, error = %e, "Channel lookup failed");
            false
        }
    }
}

/// Reply to a command message, split to Discord's size limit
async fn reply(ctx: &Context, msg: &Message, text: &str) {
    for chunk in split_message(text, DISCORD_MESSAGE_LIMIT) {
        let builder = CreateMessage::new()
            .content(chunk)
            .reference_message(MessageReference::from((msg.channel_id, msg.id)));

        if let Err(e) = msg.channel_id.send_message(&ctx.http, builder).await {
            error!(error = %e, "Failed to send Discord response");
        }
    }
}

/// Extract a channel option from a slash command interaction
fn channel_option(command: &CommandInteraction, name: &str) -> Option<ChannelId> {
    command
        .data
        .options
        .iter()
        .find(|o| o.name == name)
        .and_then(|o| match &o.value {
            CommandDataOptionValue::Channel(id) => Some(*id),
            _ => None,
        })
}

/// Extract a string option from a slash command interaction
fn string_option(command: &CommandInteraction, name: &str) -> Option<String> {
    command
        .data
        .options
        .iter()
        .find(|o| o.name == name)
        .and_then(|o| o.value.as_str().map(|s| s.to_string()))
}

/// Text typed into the description field of a ticket modal
fn modal_description(modal: &ModalInteraction) -> Option<&str> {
    modal
        .data
        .components
        .iter()
        .flat_map(|row| row.components.iter())
        .find_map(|component| match component {
            ActionRowComponent::InputText(input) if input.custom_id == tickets::DESCRIPTION_INPUT => {
                input.value.as_deref()
            }
            _ => None,
        })
}
