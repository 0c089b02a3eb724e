//! # toolloop-core
//!
//! A tool-use conversation loop for the Anthropic Messages API, with a
//! client-side token-window rate limiter and a file editor toolset that backs
//! files up before changing them.
//!
//! ## Core Components
//!
//! - **Conversation**: history compilation, completion calls, tool dispatch and
//!   continuation until the model answers in text
//! - **Rate limiting**: minimum cooldown plus a sliding-window token budget
//! - **Tools**: `view`, `create`, `str_replace`, `insert` and `undo_edit` with
//!   `.backup` copies and post-write syntax checks
//! - **LLM**: the [`LLMClient`] seam and its Anthropic implementation
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use toolloop_core::{AnthropicClient, ClientConfig, Conversation, ConversationConfig};
//!
//! let client = Arc::new(AnthropicClient::new(ClientConfig::from_env()?)?);
//! let mut conversation = Conversation::new(
//!     client,
//!     ConversationConfig::default().with_text_editor(true),
//! )?;
//!
//! println!("{}", conversation.send("Summarize src/main.rs").await?);
//! ```

pub mod context;
pub mod conversation;
pub mod error;
pub mod llm;
pub mod observer;
pub mod rate_limit;
pub mod tools;

// Re-exports for convenience
pub use context::load_context_file;
pub use conversation::{Conversation, ConversationConfig};
pub use error::{Error, Result};
pub use llm::{
    AnthropicClient, ClientConfig, CompletionRequest, CompletionResponse, ContentBlock, LLMClient,
    Message, MessageContent, Role, TokenUsage,
};
pub use observer::{ConversationEvent, ConversationObserver, TracingObserver};
pub use rate_limit::{RateLimitConfig, RateLimiter, UsageStats};
pub use tools::{BackupStore, TextEditor, ToolError, ToolOutcome, Verification};
