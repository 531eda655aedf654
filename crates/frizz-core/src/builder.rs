//! Card builder
//!
//! Operators compose a card line by line in chat. Each line is parsed into a
//! [`BuilderCommand`], applied to a [`CompositionSession`], and answered with
//! a short reply. `DONE` publishes the card through the target channel's
//! webhook, `PREVIEW` publishes a snapshot to the operator's own channel.

use crate::api::{ChatTransport, MessagingApi, WebhookPayload};
use crate::blocks::{Block, Button, MAX_ROW_BUTTONS};
use crate::error::{format_error_for_chat, Error, Result, UserFriendlyError};
use crate::session::{ButtonPlacement, CompositionSession};
use crate::token::{LiveToken, TokenKind};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

const HELP: &str = "Unknown command. Available: `TEXT:`, `CONTAINER [#hex]`, `EXIT`, \
`BANNER_IMG <url>`, `THUMBNAIL <url>`, `DIVIDER`, `LINK_BUTTON <url> <label>`, \
`LINK_BUTTON_ROW <url> <label>`, `GAW_BUTTON <id> <label>`, `GAW_COUNT <id> <label>`, \
`GAW_TEMPO <id> <label>`, `GAW`, `UNDO`, `PREVIEW`, `DONE`, `CANCEL`.";

/// One parsed builder line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuilderCommand {
    /// Append a text block
    Text(String),
    /// Open a container, optionally with an accent color
    Container(Option<u32>),
    /// Close the innermost open container
    Exit,
    /// Append a full-width image
    Banner(String),
    /// Append a thumbnail section
    Thumbnail(String),
    /// Append a divider line
    Divider,
    /// Append a link button on its own row
    LinkButton {
        /// Target URL
        url: String,
        /// Button text
        label: String,
    },
    /// Append a link button, sharing the previous row when it has room
    LinkButtonRow {
        /// Target URL
        url: String,
        /// Button text
        label: String,
    },
    /// Append a giveaway join button
    JoinButton {
        /// Giveaway id
        giveaway_id: String,
        /// Button text
        label: String,
    },
    /// Append a live participant counter
    Counter {
        /// Giveaway id
        giveaway_id: String,
        /// Text in front of the number
        label: String,
    },
    /// Append a live countdown
    Countdown {
        /// Giveaway id
        giveaway_id: String,
        /// Text in front of the timestamp
        label: String,
    },
    /// Generate a fresh giveaway id
    NewGiveawayId,
    /// Revert the last structural change
    Undo,
    /// Publish a snapshot to the operator's channel
    Preview,
    /// Publish to the target channel and end the session
    Done,
    /// End the session without publishing
    Cancel,
}

impl BuilderCommand {
    /// Parse one line. Keywords are case-insensitive.
    ///
    /// Malformed arguments and unknown keywords yield
    /// [`Error::MalformedInput`] carrying the usage text to show.
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim();
        let keyword_end = line
            .find(|c: char| c.is_whitespace() || c == ':')
            .unwrap_or(line.len());
        let keyword = line[..keyword_end].to_ascii_uppercase();
        let rest = line[keyword_end..].trim_start();

        match keyword.as_str() {
            "TEXT" => {
                let content = rest.strip_prefix(':').unwrap_or(rest).trim();
                if content.is_empty() {
                    return Err(usage("TEXT: your text"));
                }
                Ok(Self::Text(content.to_string()))
            }
            "CONTAINER" => Ok(Self::Container(parse_hex_color(rest))),
            "EXIT" => Ok(Self::Exit),
            "BANNER_IMG" => Ok(Self::Banner(single_url(rest, "BANNER_IMG https://...")?)),
            "THUMBNAIL" => Ok(Self::Thumbnail(single_url(rest, "THUMBNAIL https://...")?)),
            "DIVIDER" => Ok(Self::Divider),
            "LINK_BUTTON" => {
                let (url, label) = url_and_label(rest, "LINK_BUTTON https://... Label")?;
                Ok(Self::LinkButton { url, label })
            }
            "LINK_BUTTON_ROW" => {
                let (url, label) = url_and_label(rest, "LINK_BUTTON_ROW https://... Label")?;
                Ok(Self::LinkButtonRow { url, label })
            }
            "GAW_BUTTON" => {
                let (giveaway_id, label) = id_and_label(rest, "GAW_BUTTON <giveaway id> Label")?;
                Ok(Self::JoinButton { giveaway_id, label })
            }
            "GAW_COUNT" => {
                let (giveaway_id, label) =
                    id_and_label(rest, "GAW_COUNT <giveaway id> Participants")?;
                Ok(Self::Counter { giveaway_id, label })
            }
            "GAW_TEMPO" => {
                let (giveaway_id, label) = id_and_label(rest, "GAW_TEMPO <giveaway id> Ends")?;
                Ok(Self::Countdown { giveaway_id, label })
            }
            "GAW" => Ok(Self::NewGiveawayId),
            "UNDO" => Ok(Self::Undo),
            "PREVIEW" => Ok(Self::Preview),
            "DONE" => Ok(Self::Done),
            "CANCEL" => Ok(Self::Cancel),
            _ => Err(Error::MalformedInput(HELP.to_string())),
        }
    }
}

fn usage(example: &str) -> Error {
    Error::MalformedInput(format!("Usage: `{}`", example))
}

/// `#rrggbb` or `rrggbb`; anything else means no accent
fn parse_hex_color(raw: &str) -> Option<u32> {
    let hex = raw.trim();
    let hex = hex.strip_prefix('#').unwrap_or(hex);
    if hex.len() != 6 {
        return None;
    }
    u32::from_str_radix(hex, 16).ok()
}

fn is_http_url(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

fn single_url(rest: &str, example: &str) -> Result<String> {
    let url = rest.trim();
    if url.is_empty() || url.contains(char::is_whitespace) || !is_http_url(url) {
        return Err(usage(example));
    }
    Ok(url.to_string())
}

fn split_head(rest: &str) -> Option<(&str, &str)> {
    let (head, tail) = rest.trim().split_once(char::is_whitespace)?;
    let tail = tail.trim();
    (!head.is_empty() && !tail.is_empty()).then_some((head, tail))
}

fn url_and_label(rest: &str, example: &str) -> Result<(String, String)> {
    match split_head(rest) {
        Some((url, label)) if is_http_url(url) => Ok((url.to_string(), label.to_string())),
        _ => Err(usage(example)),
    }
}

fn id_and_label(rest: &str, example: &str) -> Result<(String, String)> {
    split_head(rest)
        .map(|(id, label)| (id.to_string(), label.to_string()))
        .ok_or_else(|| usage(example))
}

/// Builder settings
#[derive(Debug, Clone)]
pub struct BuilderConfig {
    /// How long to wait for the next line before expiring
    pub input_timeout: Duration,
    /// Buttons per row when merging link buttons
    pub row_capacity: usize,
    /// Webhook display name for published cards
    pub webhook_name: String,
    /// Webhook display avatar for published cards
    pub avatar_url: Option<String>,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            input_timeout: Duration::from_secs(600),
            row_capacity: MAX_ROW_BUTTONS,
            webhook_name: "Frizz".to_string(),
            avatar_url: None,
        }
    }
}

impl BuilderConfig {
    /// Set the input timeout
    #[must_use]
    pub fn with_input_timeout(mut self, timeout: Duration) -> Self {
        self.input_timeout = timeout;
        self
    }

    /// Set the webhook identity
    #[must_use]
    pub fn with_webhook_identity(
        mut self,
        name: impl Into<String>,
        avatar_url: Option<String>,
    ) -> Self {
        self.webhook_name = name.into();
        self.avatar_url = avatar_url;
        self
    }
}

/// Result of applying one command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Tell the operator and keep going
    Say(String),
    /// Publish a snapshot to the operator's channel
    Preview,
    /// Publish the finished card and stop
    Publish,
    /// Stop without publishing
    Cancel,
}

/// How a builder run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuilderOutcome {
    /// The card was published to the target channel
    Published,
    /// The operator cancelled
    Cancelled,
    /// The operator went quiet for too long
    TimedOut,
    /// Publishing failed; the session is over
    Failed(String),
}

/// One operator's builder run against a target channel
#[derive(Debug)]
pub struct BuilderSession {
    guild_id: u64,
    origin_channel_id: u64,
    target_channel_id: u64,
    config: BuilderConfig,
    session: CompositionSession,
}

impl BuilderSession {
    /// Create a builder publishing to `target_channel_id`; previews go to
    /// `origin_channel_id`
    pub fn new(
        guild_id: u64,
        origin_channel_id: u64,
        target_channel_id: u64,
        config: BuilderConfig,
    ) -> Self {
        Self {
            guild_id,
            origin_channel_id,
            target_channel_id,
            config,
            session: CompositionSession::new(),
        }
    }

    /// The composition state so far
    #[must_use]
    pub fn session(&self) -> &CompositionSession {
        &self.session
    }

    /// Welcome text sent when the run starts
    #[must_use]
    pub fn greeting(&self) -> String {
        format!(
            "Card builder started for <#{}>. Send commands line by line; `DONE` publishes, \
             `CANCEL` discards, `PREVIEW` shows the card here.",
            self.target_channel_id
        )
    }

    /// Apply one command to the session
    pub fn apply(&mut self, command: BuilderCommand) -> Reply {
        match command {
            BuilderCommand::Text(content) => {
                self.session.append(Block::text(content));
                Reply::Say("Text added.".to_string())
            }
            BuilderCommand::Container(accent_color) => {
                self.session.open_container(accent_color);
                Reply::Say(match accent_color {
                    Some(color) => format!("Container opened with color #{:06x}.", color),
                    None => "Container opened.".to_string(),
                })
            }
            BuilderCommand::Exit => Reply::Say(if self.session.close_container() {
                "Left the container.".to_string()
            } else {
                "No container is open.".to_string()
            }),
            BuilderCommand::Banner(url) => {
                self.session.append(Block::banner(url));
                Reply::Say("Banner added.".to_string())
            }
            BuilderCommand::Thumbnail(url) => {
                self.session.append(Block::thumbnail(url));
                Reply::Say("Thumbnail added.".to_string())
            }
            BuilderCommand::Divider => {
                self.session.append(Block::divider());
                Reply::Say("Divider added.".to_string())
            }
            BuilderCommand::LinkButton { url, label } => {
                self.session.append(Block::row(Button::link(url, label)));
                Reply::Say("Button added on a new row.".to_string())
            }
            BuilderCommand::LinkButtonRow { url, label } => {
                let placement = self
                    .session
                    .append_button_merging(Button::link(url, label), self.config.row_capacity);
                Reply::Say(match placement {
                    ButtonPlacement::Merged => "Button added to the previous row.".to_string(),
                    ButtonPlacement::NewRow => "Button added on a new row.".to_string(),
                })
            }
            BuilderCommand::JoinButton { giveaway_id, label } => {
                let custom_id = format!("gaw:join:{}", giveaway_id);
                self.session.append(Block::row(Button::action(custom_id, label)));
                Reply::Say(format!("Join button for `{}` added.", giveaway_id))
            }
            BuilderCommand::Counter { giveaway_id, label } => {
                let marker = LiveToken::new(TokenKind::Count, giveaway_id.as_str()).marker();
                self.session
                    .append(Block::text(format!("{}: 0{}", label, marker)));
                Reply::Say(format!("Live counter for `{}` added.", giveaway_id))
            }
            BuilderCommand::Countdown { giveaway_id, label } => {
                let marker = LiveToken::new(TokenKind::Time, giveaway_id.as_str()).marker();
                self.session
                    .append(Block::text(format!("{} {}", label, marker)));
                Reply::Say(format!("Live countdown for `{}` added.", giveaway_id))
            }
            BuilderCommand::NewGiveawayId => Reply::Say(format!(
                "New giveaway id: `{}`",
                new_giveaway_id(self.guild_id)
            )),
            BuilderCommand::Undo => Reply::Say(self.session.undo().description().to_string()),
            BuilderCommand::Preview => Reply::Preview,
            BuilderCommand::Done => Reply::Publish,
            BuilderCommand::Cancel => Reply::Cancel,
        }
    }

    /// Drive the builder until the operator finishes, cancels or goes quiet.
    #[instrument(
        skip(self, transport, api),
        fields(guild_id = self.guild_id, target_channel_id = self.target_channel_id)
    )]
    pub async fn run<T, A>(mut self, transport: &mut T, api: &A) -> BuilderOutcome
    where
        T: ChatTransport + ?Sized,
        A: MessagingApi + ?Sized,
    {
        say(transport, &self.greeting()).await;

        loop {
            let Some(line) = transport.next_line(self.config.input_timeout).await else {
                info!("Builder expired waiting for input");
                say(
                    transport,
                    &format!(
                        "No input for {} seconds; the builder was closed.",
                        self.config.input_timeout.as_secs()
                    ),
                )
                .await;
                return BuilderOutcome::TimedOut;
            };
            if line.trim().is_empty() {
                continue;
            }

            let command = match BuilderCommand::parse(&line) {
                Ok(command) => command,
                Err(e) => {
                    say(transport, &e.user_message()).await;
                    continue;
                }
            };
            debug!(?command, depth = self.session.depth(), "Builder command");

            match self.apply(command) {
                Reply::Say(text) => say(transport, &text).await,
                Reply::Preview => {
                    let blocks = self.session.snapshot();
                    match self.publish(api, self.origin_channel_id, blocks).await {
                        Ok(()) => debug!("Preview published"),
                        Err(e) => {
                            warn!(error = %e, "Preview failed");
                            say(transport, &format!("Preview failed.\n{}", format_error_for_chat(&e)))
                                .await;
                        }
                    }
                }
                Reply::Cancel => {
                    info!("Builder cancelled");
                    say(transport, "Builder cancelled; nothing was published.").await;
                    return BuilderOutcome::Cancelled;
                }
                Reply::Publish => {
                    let blocks = std::mem::take(&mut self.session).finalize();
                    return match self.publish(api, self.target_channel_id, blocks).await {
                        Ok(()) => {
                            info!("Card published");
                            say(
                                transport,
                                &format!("Card published in <#{}>.", self.target_channel_id),
                            )
                            .await;
                            BuilderOutcome::Published
                        }
                        Err(e) => {
                            warn!(error = %e, "Publishing card failed");
                            let message = format_error_for_chat(&e);
                            say(transport, &format!("Publishing failed.\n{}", message)).await;
                            BuilderOutcome::Failed(message)
                        }
                    };
                }
            }
        }
    }

    async fn publish<A>(&self, api: &A, channel_id: u64, blocks: Vec<Block>) -> Result<()>
    where
        A: MessagingApi + ?Sized,
    {
        let endpoint = api.ensure_delivery_endpoint(channel_id).await?;
        let payload = WebhookPayload::card(
            blocks,
            self.config.webhook_name.clone(),
            self.config.avatar_url.clone(),
        );
        api.publish(&endpoint, &payload).await
    }
}

async fn say<T: ChatTransport + ?Sized>(transport: &mut T, text: &str) {
    if let Err(e) = transport.reply(text).await {
        warn!(error = %e, "Failed to send builder reply");
    }
}

/// Fresh giveaway id of the form `gaw-<guild>-<8 hex>`
#[must_use]
pub fn new_giveaway_id(guild_id: u64) -> String {
    format!("gaw-{}-{:08x}", guild_id, rand::random::<u32>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::Card;
    use crate::session::{SessionKey, SessionRegistry};
    use crate::token;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedTransport {
        lines: VecDeque<String>,
        replies: Vec<String>,
    }

    impl ScriptedTransport {
        fn new(lines: &[&str]) -> Self {
            Self {
                lines: lines.iter().map(|l| l.to_string()).collect(),
                replies: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl ChatTransport for ScriptedTransport {
        async fn next_line(&mut self, _timeout: Duration) -> Option<String> {
            self.lines.pop_front()
        }

        async fn reply(&mut self, text: &str) -> Result<()> {
            self.replies.push(text.to_string());
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingApi {
        published: Mutex<Vec<(String, WebhookPayload)>>,
        fail_with: Option<u16>,
    }

    #[async_trait]
    impl MessagingApi for RecordingApi {
        async fn ensure_delivery_endpoint(&self, channel_id: u64) -> Result<String> {
            Ok(format!("https://hooks.test/{}", channel_id))
        }

        async fn fetch_message(&self, _endpoint: &str, _message_id: u64) -> Result<Card> {
            Err(Error::NotFound("message".to_string()))
        }

        async fn edit_message(&self, _: &str, _: u64, _: &Card) -> Result<()> {
            Ok(())
        }

        async fn publish(&self, endpoint: &str, payload: &WebhookPayload) -> Result<()> {
            if let Some(status) = self.fail_with {
                return Err(Error::Transport {
                    status,
                    message: "{\"message\": \"Invalid Form Body\"}".to_string(),
                });
            }
            self.published
                .lock()
                .unwrap()
                .push((endpoint.to_string(), payload.clone()));
            Ok(())
        }

        async fn announce(&self, _channel_id: u64, _content: &str) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_parse_keywords_case_insensitive() {
        assert_eq!(
            BuilderCommand::parse("text: Hello: world").unwrap(),
            BuilderCommand::Text("Hello: world".to_string())
        );
        assert_eq!(
            BuilderCommand::parse("TEXT plain").unwrap(),
            BuilderCommand::Text("plain".to_string())
        );
        assert_eq!(
            BuilderCommand::parse("container #FF0000").unwrap(),
            BuilderCommand::Container(Some(0xff0000))
        );
        assert_eq!(
            BuilderCommand::parse("CONTAINER #xyz").unwrap(),
            BuilderCommand::Container(None)
        );
        assert_eq!(BuilderCommand::parse("  done ").unwrap(), BuilderCommand::Done);
        assert_eq!(
            BuilderCommand::parse("LINK_BUTTON_ROW https://a.b Visit us").unwrap(),
            BuilderCommand::LinkButtonRow {
                url: "https://a.b".to_string(),
                label: "Visit us".to_string()
            }
        );
        assert_eq!(
            BuilderCommand::parse("gaw_count gaw-1-abc Participants").unwrap(),
            BuilderCommand::Counter {
                giveaway_id: "gaw-1-abc".to_string(),
                label: "Participants".to_string()
            }
        );
    }

    #[test]
    fn test_parse_rejects_malformed_arguments() {
        for line in [
            "TEXT:",
            "BANNER_IMG ftp://x",
            "THUMBNAIL",
            "LINK_BUTTON https://a.b",
            "LINK_BUTTON notaurl Label",
            "GAW_BUTTON onlyid",
        ] {
            let err = BuilderCommand::parse(line).unwrap_err();
            assert!(err.user_message().starts_with("Usage:"), "line {:?}", line);
        }

        let err = BuilderCommand::parse("DANCE").unwrap_err();
        assert!(err.user_message().contains("Available"));
    }

    #[test]
    fn test_counter_and_countdown_carry_tokens() {
        let mut builder = BuilderSession::new(1, 2, 3, BuilderConfig::default());
        builder.apply(BuilderCommand::parse("GAW_COUNT g1 Participants").unwrap());
        builder.apply(BuilderCommand::parse("GAW_TEMPO g1 Ends").unwrap());

        let blocks = builder.session().snapshot();
        let Block::Text { content } = &blocks[0] else {
            panic!("text expected");
        };
        assert!(content.starts_with("Participants: 0"));
        assert_eq!(token::decode(content).unwrap().token, "gaw:count:g1");

        let Block::Text { content } = &blocks[1] else {
            panic!("text expected");
        };
        assert!(content.starts_with("Ends "));
        assert_eq!(token::decode(content).unwrap().token, "gaw:time:g1");
    }

    #[test]
    fn test_new_giveaway_id_shape() {
        let id = new_giveaway_id(42);
        let hex = id.strip_prefix("gaw-42-").unwrap();
        assert_eq!(hex.len(), 8);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn test_run_publishes_finalized_card() {
        let mut transport = ScriptedTransport::new(&[
            "CONTAINER #00ff00",
            "TEXT: Inside",
            "",
            "bogus",
            "LINK_BUTTON_ROW https://a.b One",
            "LINK_BUTTON_ROW https://a.b Two",
            "DONE",
            "TEXT: never read",
        ]);
        let api = RecordingApi::default();

        let builder = BuilderSession::new(1, 10, 20, BuilderConfig::default());
        let outcome = builder.run(&mut transport, &api).await;

        assert_eq!(outcome, BuilderOutcome::Published);
        assert_eq!(transport.lines.len(), 1);

        let published = api.published.lock().unwrap();
        assert_eq!(published.len(), 1);
        let (endpoint, payload) = &published[0];
        assert_eq!(endpoint, "https://hooks.test/20");
        assert_eq!(payload.components.len(), 1);
        let Block::Container {
            accent_color,
            children,
        } = &payload.components[0]
        else {
            panic!("container expected");
        };
        assert_eq!(*accent_color, Some(0x00ff00));
        assert_eq!(children.len(), 2);
        assert!(matches!(&children[1], Block::ActionRow { buttons } if buttons.len() == 2));

        assert!(transport.replies.iter().any(|r| r.contains("Available")));
    }

    #[tokio::test]
    async fn test_preview_goes_to_origin_and_session_continues() {
        let mut transport = ScriptedTransport::new(&["TEXT: a", "PREVIEW", "TEXT: b", "CANCEL"]);
        let api = RecordingApi::default();

        let outcome = BuilderSession::new(1, 10, 20, BuilderConfig::default())
            .run(&mut transport, &api)
            .await;

        assert_eq!(outcome, BuilderOutcome::Cancelled);
        let published = api.published.lock().unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "https://hooks.test/10");
        assert_eq!(published[0].1.components, vec![Block::text("a")]);
    }

    #[tokio::test]
    async fn test_empty_card_published_with_placeholder() {
        let mut transport = ScriptedTransport::new(&["DONE"]);
        let api = RecordingApi::default();

        BuilderSession::new(1, 10, 20, BuilderConfig::default())
            .run(&mut transport, &api)
            .await;

        let published = api.published.lock().unwrap();
        assert_eq!(published[0].1.components.len(), 1);
    }

    #[tokio::test]
    async fn test_publish_failure_reports_status() {
        let mut transport = ScriptedTransport::new(&["TEXT: x", "DONE"]);
        let api = RecordingApi {
            fail_with: Some(400),
            ..Default::default()
        };

        let outcome = BuilderSession::new(1, 10, 20, BuilderConfig::default())
            .run(&mut transport, &api)
            .await;

        let BuilderOutcome::Failed(message) = outcome else {
            panic!("failure expected");
        };
        assert!(message.contains("400"));
        assert!(transport.replies.last().unwrap().contains("Invalid Form Body"));
    }

    #[tokio::test]
    async fn test_timeout_releases_session_key() {
        let registry = SessionRegistry::new();
        let key = SessionKey::new(1, 5);

        {
            let _guard = registry.claim(key).unwrap();
            assert!(registry.claim(key).is_err());

            let mut transport = ScriptedTransport::new(&["TEXT: half done"]);
            let outcome = BuilderSession::new(1, 10, 20, BuilderConfig::default())
                .run(&mut transport, &RecordingApi::default())
                .await;
            assert_eq!(outcome, BuilderOutcome::TimedOut);
        }

        assert!(!registry.is_active(&key));
        assert!(registry.claim(key).is_ok());
    }

    #[tokio::test]
    async fn test_cancel_releases_session_key_and_discards_state() {
        let registry = SessionRegistry::new();
        let key = SessionKey::new(1, 5);
        let api = RecordingApi::default();

        {
            let _guard = registry.claim(key).unwrap();
            let mut transport =
                ScriptedTransport::new(&["CONTAINER #ff0000", "TEXT: draft", "CANCEL"]);
            let outcome = BuilderSession::new(1, 10, 20, BuilderConfig::default())
                .run(&mut transport, &api)
                .await;
            assert_eq!(outcome, BuilderOutcome::Cancelled);
        }
        assert!(api.published.lock().unwrap().is_empty());

        // A new session for the same operator starts right away and from scratch
        let _guard = registry.claim(key).unwrap();
        let mut transport = ScriptedTransport::new(&["TEXT: fresh", "DONE"]);
        let outcome = BuilderSession::new(1, 10, 20, BuilderConfig::default())
            .run(&mut transport, &api)
            .await;
        assert_eq!(outcome, BuilderOutcome::Published);

        let published = api.published.lock().unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].1.components, vec![Block::text("fresh")]);
    }
}
