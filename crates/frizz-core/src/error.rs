//! Error types for frizz-core
//!
//! This module provides error types and operator-facing error formatting.

use thiserror::Error;

/// Core error type
#[derive(Debug, Error)]
pub enum Error {
    /// Command arguments could not be parsed
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// Remote endpoint answered with a non-success status
    #[error("transport error ({status}): {message}")]
    Transport {
        /// HTTP status code returned by the endpoint
        status: u16,
        /// Response body or reason
        message: String,
    },

    /// Remote endpoint could not be reached
    #[error("network error: {0}")]
    Network(String),

    /// A composition session is already active for this key
    #[error("session already active for user {user_id} in guild {guild_id}")]
    SessionConflict {
        /// Guild the session belongs to
        guild_id: u64,
        /// Operator that owns the session
        user_id: u64,
    },

    /// Block type code outside the supported component set
    #[error("unknown block type code: {0}")]
    UnknownBlockType(u8),

    /// Block violates a structural rule
    #[error("invalid block: {0}")]
    InvalidBlock(String),

    /// Referenced record does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Invalid configuration
    #[error("invalid configuration: {field}")]
    InvalidConfig {
        /// Config field name
        field: String,
        /// Detailed message
        message: String,
    },

    /// JSON (de)serialization failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Trait for user-friendly error messages
pub trait UserFriendlyError {
    /// Get a user-friendly error message
    fn user_message(&self) -> String;

    /// Get a suggestion for how to fix the error
    fn suggestion(&self) -> Option<String>;
}

/// Longest remote response body echoed back to an operator
const MAX_ECHOED_BODY: usize = 500;

impl UserFriendlyError for Error {
    fn user_message(&self) -> String {
        match self {
            // Already phrased as a usage hint for the operator
            Error::MalformedInput(msg) => msg.clone(),
            Error::Transport { status, message } => {
                let body: String = message.chars().take(MAX_ECHOED_BODY).collect();
                format!("Discord rejected the request ({}): `{}`", status, body)
            }
            Error::Network(_) => "Could not reach Discord.".to_string(),
            Error::SessionConflict { .. } => {
                "You are already building a card. Type **DONE** or **CANCEL** to finish it."
                    .to_string()
            }
            Error::UnknownBlockType(code) => {
                format!("The message contains an unsupported component (type {}).", code)
            }
            Error::InvalidBlock(msg) => format!("Invalid component: {}", msg),
            Error::NotFound(what) => format!("{} not found.", what),
            Error::InvalidConfig { field, message } => {
                format!("Configuration error in '{}': {}", field, message)
            }
            Error::Serialization(e) => format!("Unexpected payload: {}", e),
        }
    }

    fn suggestion(&self) -> Option<String> {
        match self {
            Error::Network(_) | Error::Transport { .. } => {
                Some("Try again in a moment.".to_string())
            }
            Error::InvalidConfig { field, .. } => Some(format!(
                "Check the '{}' setting in config/default.toml or the .env file.",
                field
            )),
            _ => None,
        }
    }
}

/// Format an error for display in a chat reply
pub fn format_error_for_chat(error: &Error) -> String {
    let mut output = error.user_message();

    if let Some(suggestion) = error.suggestion() {
        output.push('\n');
        output.push_str(&suggestion);
    }

    output
}
