//! Typed errors for the messaging layer.

use chat_client::ChatApiError;
use thiserror::Error;

/// Result type for messaging operations.
pub type Result<T> = std::result::Result<T, MessagingError>;

/// Boxed error returned by pluggable stores.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors surfaced by the hub, push channel and draft autosaver.
#[derive(Debug, Error)]
pub enum MessagingError {
    /// Chat REST API call failed
    #[error("chat API error: {0}")]
    Api(#[from] ChatApiError),

    /// Push channel could not connect or dropped
    #[error("push channel error: {0}")]
    Push(String),

    /// No thread with this id or room id
    #[error("thread not found: {thread_id}")]
    ThreadNotFound { thread_id: String },

    /// Message content was empty or whitespace
    #[error("message content is empty")]
    EmptyMessage,

    /// Session has been shut down
    #[error("messaging session closed")]
    Closed,

    /// Invalid configuration
    #[error("config error: {0}")]
    Config(String),

    /// Draft save failed after all retries
    #[error("draft save failed after {attempts} attempts: {source}")]
    Draft {
        attempts: u32,
        #[source]
        source: BoxError,
    },
}
