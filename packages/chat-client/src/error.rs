//! Error types for the chat API client.

use thiserror::Error;

/// Result type for chat API operations.
pub type Result<T> = std::result::Result<T, ChatApiError>;

/// Chat API client errors.
#[derive(Debug, Error)]
pub enum ChatApiError {
    /// Configuration error (missing base URL, invalid settings)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network error (connection failed, timeout)
    #[error("Network error: {0}")]
    Network(String),

    /// API error (non-2xx response)
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Parse error (invalid JSON, unexpected response shape)
    #[error("Parse error: {0}")]
    Parse(String),
}

impl ChatApiError {
    /// HTTP status of the failed call, if the server answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            ChatApiError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ChatApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ChatApiError::Parse(e.to_string())
        } else {
            ChatApiError::Network(e.to_string())
        }
    }
}

impl From<serde_json::Error> for ChatApiError {
    fn from(e: serde_json::Error) -> Self {
        ChatApiError::Parse(e.to_string())
    }
}
