//! Frizz Channels - Discord Adapter
//!
//! This crate connects the Frizz core to Discord:
//! - Gateway adapter and event handler (via serenity)
//! - Prefix and slash command dispatch
//! - Builder conversations over a text channel
//! - Ticket panel, modal and private ticket channels
//! - Webhook client for components-v2 cards (via reqwest)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod discord;
pub mod error;
pub mod util;

pub use error::{Error, Result};

// Re-export Discord adapter
pub use discord::{DiscordAdapter, DiscordConfig, WebhookClient, WebhookConfig};
