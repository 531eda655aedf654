//! Support tickets
//!
//! `/ticket_panel` posts a panel with one persistent button per category.
//! A click opens a modal asking for a description; submitting it creates a
//! private text channel that only the opener, the bot and members with
//! server-wide permissions can see.
//!
//! Buttons and modals carry the category in their custom id, so the panel
//! keeps working across restarts without any stored state.

use crate::error::{Error, Result};
use serenity::all::{
    ButtonStyle, ChannelId, ChannelType, Colour, CreateActionRow, CreateAllowedMentions, CreateButton,
    CreateChannel, CreateCommand, CreateEmbed, CreateInputText, CreateMessage, CreateModal,
    InputTextStyle, PermissionOverwrite, PermissionOverwriteType, Permissions, RoleId, UserId,
};

/// Slash command posting the panel
pub const TICKET_PANEL_COMMAND: &str = "ticket_panel";

const OPEN_PREFIX: &str = "ticket:open:";
const MODAL_PREFIX: &str = "ticket:modal:";

/// Custom id of the description field in the modal
pub const DESCRIPTION_INPUT: &str = "ticket:description";

const DESCRIPTION_MIN_CHARS: u16 = 10;
const DESCRIPTION_MAX_CHARS: u16 = 1500;

/// Characters of the opener's name kept in the channel name
const SHORT_NAME_CHARS: usize = 16;

/// What a ticket is about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketCategory {
    /// General help
    Support,
    /// Reporting a member or a message
    Report,
    /// Purchases
    Store,
}

impl TicketCategory {
    /// Every category, in panel order
    pub const ALL: [Self; 3] = [Self::Support, Self::Report, Self::Store];

    /// Stable name used in custom ids
    #[must_use]
    pub fn slug(&self) -> &'static str {
        match self {
            Self::Support => "support",
            Self::Report => "report",
            Self::Store => "store",
        }
    }

    /// Inverse of [`Self::slug`]
    #[must_use]
    pub fn from_slug(slug: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|category| category.slug() == slug)
    }

    /// Button label
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Support => "Support",
            Self::Report => "Report",
            Self::Store => "Store",
        }
    }

    /// Emoji on the button and in front of the channel name
    #[must_use]
    pub fn emoji(&self) -> char {
        match self {
            Self::Support => '🎫',
            Self::Report => '❌',
            Self::Store => '🛒',
        }
    }

    fn style(&self) -> ButtonStyle {
        match self {
            Self::Support => ButtonStyle::Primary,
            Self::Report => ButtonStyle::Danger,
            Self::Store => ButtonStyle::Success,
        }
    }
}

/// Custom id of a panel button
#[must_use]
pub fn open_button_id(category: TicketCategory) -> String {
    format!("{}{}", OPEN_PREFIX, category.slug())
}

/// Category of a panel button click, if `custom_id` is one
#[must_use]
pub fn parse_open_button(custom_id: &str) -> Option<TicketCategory> {
    custom_id
        .strip_prefix(OPEN_PREFIX)
        .and_then(TicketCategory::from_slug)
}

/// Custom id of the description modal
#[must_use]
pub fn modal_id(category: TicketCategory) -> String {
    format!("{}{}", MODAL_PREFIX, category.slug())
}

/// Category of a submitted modal, if `custom_id` is one of ours
#[must_use]
pub fn parse_modal_id(custom_id: &str) -> Option<TicketCategory> {
    custom_id
        .strip_prefix(MODAL_PREFIX)
        .and_then(TicketCategory::from_slug)
}

/// Name of a new ticket channel: category emoji, `ticket-`, then the
/// opener's display name lowercased with spaces turned into dashes.
#[must_use]
pub fn channel_name(category: TicketCategory, display_name: &str) -> String {
    let short: String = display_name
        .trim()
        .to_lowercase()
        .chars()
        .filter_map(|c| match c {
            c if c.is_whitespace() => Some('-'),
            c if c.is_alphanumeric() || c == '-' || c == '_' => Some(c),
            _ => None,
        })
        .take(SHORT_NAME_CHARS)
        .collect();
    let short = if short.is_empty() { "member" } else { short.as_str() };
    format!("{}ticket-{}", category.emoji(), short)
}

/// Trimmed description, when its length is within the modal's bounds
pub fn check_description(raw: &str) -> Result<&str> {
    let description = raw.trim();
    let chars = description.chars().count();
    if chars < usize::from(DESCRIPTION_MIN_CHARS) || chars > usize::from(DESCRIPTION_MAX_CHARS) {
        return Err(Error::Parse(format!(
            "The description must be between {} and {} characters.",
            DESCRIPTION_MIN_CHARS, DESCRIPTION_MAX_CHARS
        )));
    }
    Ok(description)
}

/// Slash command registration
#[must_use]
pub fn panel_command() -> CreateCommand {
    CreateCommand::new(TICKET_PANEL_COMMAND)
        .description("Post the ticket panel in this channel")
        .default_member_permissions(Permissions::MANAGE_GUILD)
}

/// The panel: an embed and one button per category
#[must_use]
pub fn panel_message() -> CreateMessage {
    let buttons = TicketCategory::ALL
        .into_iter()
        .map(|category| {
            CreateButton::new(open_button_id(category))
                .label(category.label())
                .style(category.style())
                .emoji(category.emoji())
        })
        .collect();

    CreateMessage::new()
        .embed(
            CreateEmbed::new()
                .title("Open a ticket")
                .description("Pick a category below to open a private ticket with the staff.")
                .colour(Colour::DARK_GREEN),
        )
        .components(vec![CreateActionRow::Buttons(buttons)])
}

/// Modal asking for the ticket description
#[must_use]
pub fn description_modal(category: TicketCategory) -> CreateModal {
    let input = CreateInputText::new(InputTextStyle::Paragraph, "Description", DESCRIPTION_INPUT)
        .placeholder("Briefly describe the problem.")
        .min_length(DESCRIPTION_MIN_CHARS)
        .max_length(DESCRIPTION_MAX_CHARS)
        .required(true);

    CreateModal::new(
        modal_id(category),
        format!("Open a {} ticket", category.label().to_lowercase()),
    )
    .components(vec![CreateActionRow::InputText(input)])
}

/// Hide the channel from `@everyone` and open it to the opener and the bot
#[must_use]
pub fn ticket_overwrites(guild_id: u64, opener: u64, bot: Option<u64>) -> Vec<PermissionOverwrite> {
    let member_access = Permissions::VIEW_CHANNEL
        | Permissions::SEND_MESSAGES
        | Permissions::READ_MESSAGE_HISTORY
        | Permissions::ATTACH_FILES;

    let mut overwrites = vec![
        // The @everyone role shares the guild's id
        PermissionOverwrite {
            allow: Permissions::empty(),
            deny: Permissions::VIEW_CHANNEL,
            kind: PermissionOverwriteType::Role(RoleId::new(guild_id)),
        },
        PermissionOverwrite {
            allow: member_access,
            deny: Permissions::empty(),
            kind: PermissionOverwriteType::Member(UserId::new(opener)),
        },
    ];
    if let Some(bot) = bot {
        overwrites.push(PermissionOverwrite {
            allow: member_access | Permissions::MANAGE_CHANNELS,
            deny: Permissions::empty(),
            kind: PermissionOverwriteType::Member(UserId::new(bot)),
        });
    }
    overwrites
}

/// Everything needed to create one ticket channel
#[derive(Debug, Clone)]
pub struct TicketRequest {
    /// Category picked on the panel
    pub category: TicketCategory,
    /// Guild the panel lives in
    pub guild_id: u64,
    /// Member opening the ticket
    pub opener_id: u64,
    /// Opener's display name
    pub opener_name: String,
    /// Checked description from the modal
    pub description: String,
}

impl TicketRequest {
    /// Channel builder, placed under `parent` when one is configured
    pub fn channel(&self, parent: Option<u64>, bot: Option<u64>) -> CreateChannel<'static> {
        let mut builder = CreateChannel::new(channel_name(self.category, &self.opener_name))
            .kind(ChannelType::Text)
            .topic(format!(
                "Ticket opened by {} (ID: {})",
                self.opener_name, self.opener_id
            ))
            .permissions(ticket_overwrites(self.guild_id, self.opener_id, bot))
            .audit_log_reason("Ticket opened from the panel");
        if let Some(parent) = parent {
            builder = builder.category(ChannelId::new(parent));
        }
        builder
    }

    /// First message of the ticket channel; pings only the opener
    #[must_use]
    pub fn opening_message(&self) -> CreateMessage {
        CreateMessage::new()
            .content(format!(
                "<@{}> opened a **{}** ticket.\n\n**Description:** {}",
                self.opener_id,
                self.category.label(),
                self.description
            ))
            .allowed_mentions(CreateAllowedMentions::new().users(vec![UserId::new(self.opener_id)]))
    }
}
