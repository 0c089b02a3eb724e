//! Error types for toolloop-core.

use thiserror::Error;

/// Result type alias using toolloop-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while driving a conversation.
///
/// Tool-level failures are not represented here; they are reported back to the
/// model as `is_error` tool results (see [`crate::tools::ToolError`]).
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// LLM API error
    #[error("LLM API error: {provider} - {message}")]
    LlmApi { provider: String, message: String },

    /// The completion service throttled the request (HTTP 429)
    #[error("Rate limit exceeded: {message}")]
    RateLimited { message: String },

    /// Request could not be sent or the response could not be read
    #[error("HTTP error: {0}")]
    Http(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem error outside of tool execution
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create an LLM API error.
    pub fn llm_api(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::LlmApi {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a rate limited error.
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::RateLimited {
            message: message.into(),
        }
    }

    /// Whether the surrounding loop may back off and retry the call.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}
