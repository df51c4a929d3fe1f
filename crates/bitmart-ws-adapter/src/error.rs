/*
[INPUT]:  Error sources (topic classification, auth, frames, transport, config)
[OUTPUT]: Structured error types with context and retry hints
[POS]:    Error handling layer - unified error types for entire crate
[UPDATE]: When adding new error sources or improving error messages
*/

use thiserror::Error;

use crate::types::ConnectionKey;

/// Main error type for the BitMart WebSocket adapter
#[derive(Error, Debug)]
pub enum BitmartError {
    /// Topic prefix matches neither `spot` nor `futures`
    #[error("Could not resolve market for topic: \"{topic}\"")]
    UnresolvableMarket { topic: String },

    /// One or more topics in a batch were rejected before reaching a connection
    #[error("Rejected {} unresolvable topic(s): {}", topics.len(), topics.join(", "))]
    RejectedTopics { topics: Vec<String> },

    /// No usable endpoint for a connection key
    #[error("No endpoint for {key}: {reason}")]
    UnresolvedEndpoint { key: ConnectionKey, reason: String },

    /// API key, secret or memo missing
    #[error("Cannot auth - missing api key, secret or memo in config")]
    MissingCredentials,

    /// Inbound frame is not valid JSON
    #[error("Failed to parse frame: {0}")]
    FrameParse(#[source] serde_json::Error),

    /// Outbound frame serialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Socket level failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Exchange rejected the auth frame
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// Timed out waiting on the exchange
    #[error("Timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Reading configuration from disk failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML configuration could not be parsed
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Client was shut down
    #[error("WebSocket client has been shut down")]
    Shutdown,
}

impl BitmartError {
    /// Check if the error is recovered by the reconnect cycle
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BitmartError::Transport(_)
                | BitmartError::Timeout { .. }
                | BitmartError::Authentication { .. }
        )
    }

    /// Check if the error rejects a topic before it reaches any connection
    pub fn is_classification_error(&self) -> bool {
        matches!(
            self,
            BitmartError::UnresolvableMarket { .. } | BitmartError::RejectedTopics { .. }
        )
    }

    pub(crate) fn transport(err: impl std::fmt::Display) -> Self {
        BitmartError::Transport(err.to_string())
    }
}

/// Result type alias for adapter operations
pub type Result<T> = std::result::Result<T, BitmartError>;
