use crate::util::parse_channel_ref;
use frizz_core::{
    format_error_for_chat, parse_duration, parse_message_link, Error, GiveawayManager, Result,
};
use std::sync::Arc;
use tracing::info;

/// Text commands understood after the prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrefixCommand {
    /// Start a builder session targeting a channel
    BuildCard {
        /// Channel receiving the finished card
        channel_id: u64,
    },
    /// Configure a giveaway
    GiveawaySet {
        /// Giveaway id
        id: String,
        /// Announcement channel
        channel_id: u64,
        /// Parsed duration
        duration: std::time::Duration,
        /// Number of winners
        winners: usize,
    },
    /// End a giveaway now
    GiveawayEnd {
        /// Giveaway id
        id: String,
    },
    /// Bind a published card to a giveaway
    GiveawayBind {
        /// Giveaway id
        id: String,
        /// Channel holding the card
        channel_id: u64,
        /// The card message
        message_id: u64,
    },
    /// Unbind a card
    GiveawayUnbind {
        /// Giveaway id
        id: String,
        /// The card message
        message_id: u64,
    },
    /// List participants
    GiveawayParticipants {
        /// Giveaway id
        id: String,
    },
    /// Gateway latency check
    Ping,
}

fn usage(example: &str) -> Error {
    Error::MalformedInput(format!("Usage: `{}`", example))
}

impl PrefixCommand {
    /// Parse a command line with the prefix already stripped.
    ///
    /// Returns `None` for names that are not ours, so other bots sharing
    /// the prefix are left alone.
    pub fn parse(line: &str) -> Option<Result<Self>> {
        let mut args = line.split_whitespace();
        let name = args.next()?.to_ascii_lowercase();
        let args: Vec<&str> = args.collect();

        let parsed = match name.as_str() {
            "buildcard" => parse_buildcard(&args),
            "gaw_set" => parse_gaw_set(&args),
            "gaw_end" => single_id(&args, "gaw_end <giveaway id>")
                .map(|id| Self::GiveawayEnd { id }),
            "gaw_bind" => parse_gaw_bind(&args),
            "gaw_unbind" => parse_gaw_unbind(&args),
            "gaw_participants" => single_id(&args, "gaw_participants <giveaway id>")
                .map(|id| Self::GiveawayParticipants { id }),
            "ping" => Ok(Self::Ping),
            _ => return None,
        };
        Some(parsed)
    }
}

fn parse_buildcard(args: &[&str]) -> Result<PrefixCommand> {
    match args {
        [channel] => parse_channel_ref(channel)
            .map(|channel_id| PrefixCommand::BuildCard { channel_id })
            .ok_or_else(|| usage("buildcard #channel")),
        _ => Err(usage("buildcard #channel")),
    }
}

fn single_id(args: &[&str], example: &str) -> Result<String> {
    match args {
        [id] => Ok((*id).to_string()),
        _ => Err(usage(example)),
    }
}

fn parse_gaw_set(args: &[&str]) -> Result<PrefixCommand> {
    const EXAMPLE: &str = "gaw_set <giveaway id> #channel <10m|2h|1d> <winners>";
    let [id, channel, duration, winners] = args else {
        return Err(usage(EXAMPLE));
    };

    let channel_id = parse_channel_ref(channel).ok_or_else(|| usage(EXAMPLE))?;
    let duration = parse_duration(duration).ok_or_else(|| {
        Error::MalformedInput("Invalid duration. Use a number followed by s, m, h or d.".to_string())
    })?;
    let winners = winners
        .parse()
        .map_err(|_| Error::MalformedInput("Winners must be a whole number.".to_string()))?;

    Ok(PrefixCommand::GiveawaySet {
        id: (*id).to_string(),
        channel_id,
        duration,
        winners,
    })
}

fn parse_gaw_bind(args: &[&str]) -> Result<PrefixCommand> {
    const EXAMPLE: &str = "gaw_bind <giveaway id> #channel <message id | message link>";
    let [id, channel, message] = args else {
        return Err(usage(EXAMPLE));
    };

    let channel_id = parse_channel_ref(channel).ok_or_else(|| usage(EXAMPLE))?;
    let message_id = match message.parse() {
        Ok(message_id) => message_id,
        Err(_) => {
            let (_, link_channel, message_id) =
                parse_message_link(message).ok_or_else(|| usage(EXAMPLE))?;
            if link_channel != channel_id {
                return Err(Error::MalformedInput(
                    "The message link points to a different channel.".to_string(),
                ));
            }
            message_id
        }
    };

    Ok(PrefixCommand::GiveawayBind {
        id: (*id).to_string(),
        channel_id,
        message_id,
    })
}

fn parse_gaw_unbind(args: &[&str]) -> Result<PrefixCommand> {
    const EXAMPLE: &str = "gaw_unbind <giveaway id> <message id>";
    match args {
        [id, message] => message
            .parse()
            .map(|message_id| PrefixCommand::GiveawayUnbind {
                id: (*id).to_string(),
                message_id,
            })
            .map_err(|_| usage(EXAMPLE)),
        _ => Err(usage(EXAMPLE)),
    }
}

/// Giveaway command handlers
pub struct DiscordCommands {
    giveaways: Arc<GiveawayManager>,
}

impl DiscordCommands {
    /// Create handlers backed by a giveaway manager
    pub fn new(giveaways: Arc<GiveawayManager>) -> Self {
        Self { giveaways }
    }

    /// The shared giveaway manager
    pub fn giveaways(&self) -> &Arc<GiveawayManager> {
        &self.giveaways
    }

    /// `gaw_set`
    pub async fn handle_set(
        &self,
        guild_id: u64,
        id: &str,
        channel_id: u64,
        duration: std::time::Duration,
        winners: usize,
    ) -> String {
        match self
            .giveaways
            .configure(id, guild_id, channel_id, duration, winners)
            .await
        {
            Ok(ends_at) => format!(
                "Giveaway `{}` configured: {} winner(s), ends <t:{}:R> in <#{}>.",
                id,
                winners,
                ends_at.timestamp(),
                channel_id
            ),
            Err(e) => format_error_for_chat(&e),
        }
    }

    /// `gaw_end`
    pub async fn handle_end(&self, id: &str) -> String {
        match self.giveaways.complete(id).await {
            Ok(completion) => format!(
                "Giveaway `{}` ended with {} participant(s) and {} winner(s).",
                id,
                completion.participants,
                completion.winners.len()
            ),
            Err(e) => format_error_for_chat(&e),
        }
    }

    /// `gaw_bind`
    pub async fn handle_bind(&self, id: &str, channel_id: u64, message_id: u64) -> String {
        self.giveaways.bind(id, channel_id, message_id).await;
        info!(giveaway_id = %id, channel_id, message_id, "Card bound to giveaway");
        format!(
            "Message `{}` in <#{}> is now bound to `{}`.",
            message_id, channel_id, id
        )
    }

    /// `gaw_unbind`
    pub async fn handle_unbind(&self, id: &str, message_id: u64) -> String {
        match self.giveaways.unbind(id, message_id).await {
            0 => format!("Message `{}` was not bound to `{}`.", message_id, id),
            removed => format!(
                "Removed {} binding(s) of message `{}` from `{}`.",
                removed, message_id, id
            ),
        }
    }

    /// `gaw_participants`
    pub async fn handle_participants(&self, id: &str) -> String {
        self.giveaways.participants_summary(id).await
    }
}
