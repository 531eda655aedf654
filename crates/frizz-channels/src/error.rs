//! Error types for frizz-channels

use thiserror::Error;

/// Channel error type
#[derive(Debug, Error)]
pub enum Error {
    /// Discord gateway or REST error
    #[error("discord error: {0}")]
    Discord(String),

    /// Webhook endpoint answered with a non-success status
    #[error("http error ({status}): {body}")]
    Http {
        /// Status code
        status: u16,
        /// Response body
        body: String,
    },

    /// Message parsing error
    #[error("message parsing error: {0}")]
    Parse(String),

    /// Network error
    #[error("network error: {0}")]
    Network(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

impl From<serenity::Error> for Error {
    fn from(e: serenity::Error) -> Self {
        Error::Discord(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => Error::Http {
                status: status.as_u16(),
                body: e.to_string(),
            },
            None => Error::Network(e.to_string()),
        }
    }
}

impl From<Error> for frizz_core::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::Http { status, body } => frizz_core::Error::Transport {
                status,
                message: body,
            },
            Error::Network(msg) => frizz_core::Error::Network(msg),
            Error::Parse(msg) => frizz_core::Error::MalformedInput(msg),
            // Serenity already folds status and body into its message
            Error::Discord(msg) => frizz_core::Error::Transport {
                status: 0,
                message: msg,
            },
        }
    }
}
