//! LLM client abstraction and Messages API wire types.
//!
//! ## Example
//!
//! ```rust,ignore
//! use toolloop_core::llm::{AnthropicClient, ClientConfig, CompletionRequest, LLMClient, Message};
//!
//! let client = AnthropicClient::new(ClientConfig::from_env()?)?;
//!
//! let request = CompletionRequest::new("claude-3-7-sonnet-20250219", 4096)
//!     .with_messages(vec![Message::user("Hello")]);
//!
//! let response = client.complete(request).await?;
//! ```

mod client;
mod types;

pub use client::{AnthropicClient, ClientConfig, LLMClient};
pub use types::{
    CompletionRequest, CompletionResponse, ContentBlock, Message, MessageContent, Role,
    StopReason, ThinkingConfig, TokenUsage, ToolDefinition, TEXT_EDITOR_TOOL_NAME,
    TEXT_EDITOR_TOOL_TYPE,
};
