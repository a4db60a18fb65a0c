use std::time::Duration;

use osc_core::CodecError;

/// Everything that can go wrong while handling one input line.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Usage: {0}")]
    Usage(String),

    #[error("Unknown command: @{0}")]
    UnknownCommand(String),

    #[error("Unknown type: '{0}'")]
    UnknownTypeTag(char),

    #[error("Missing value")]
    MissingArgument,

    #[error("Invalid value for type '{tag}': {value:?}")]
    InvalidValue { tag: char, value: String },

    #[error("No reply from {address} within {timeout:?}")]
    QueryTimeout { address: String, timeout: Duration },

    #[error("Query on {address} was cancelled")]
    QueryCancelled { address: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Session terminated")]
    Terminated,
}

impl SessionError {
    pub fn usage(text: &str) -> Self {
        SessionError::Usage(text.to_string())
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, SessionError::QueryTimeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
