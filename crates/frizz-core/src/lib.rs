//! Frizz Core - Card Composition and Live Updates
//!
//! This crate holds everything in Frizz that does not talk to the network:
//! - Token: invisible token codec embedded inside visible text
//! - Blocks: the component tree of a published card
//! - Session: stack-based card composition with structural undo
//! - Builder: the line-oriented command language driving a session
//! - Patch: rewriting token-carrying text blocks in place
//! - Giveaway: live counters and countdowns bound to published cards
//! - Api: collaborator traits implemented by the channel adapters

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod api;
pub mod blocks;
pub mod builder;
pub mod error;
pub mod giveaway;
pub mod patch;
pub mod session;
pub mod token;

pub use api::{AllowedMentions, ChatTransport, MessagingApi, WebhookPayload, COMPONENTS_V2_FLAG};
pub use blocks::{
    validate_tree, Block, Button, ButtonAction, ButtonStyle, Card, MediaItem, MediaRef,
};
pub use builder::{
    new_giveaway_id, BuilderCommand, BuilderConfig, BuilderOutcome, BuilderSession, Reply,
};
pub use error::{format_error_for_chat, Error, Result, UserFriendlyError};
pub use giveaway::{
    parse_duration, parse_message_link, Binding, Completion, Giveaway, GiveawayConfig,
    GiveawayManager, JoinOutcome,
};
pub use patch::{patch_document, render_count, render_countdown, LabelCache, PatchOutcome};
pub use session::{
    ButtonPlacement, CompositionSession, SessionGuard, SessionKey, SessionRegistry, UndoOutcome,
};
pub use token::{decode, encode, Decoded, LiveToken, TokenKind};
