//! Conversation driver: history, rate limiting, and tool execution.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use toolloop_core::conversation::{Conversation, ConversationConfig};
//! use toolloop_core::llm::{AnthropicClient, ClientConfig};
//!
//! let client = Arc::new(AnthropicClient::new(ClientConfig::from_env()?)?);
//! let config = ConversationConfig::default()
//!     .with_text_editor(true)
//!     .with_thinking_budget(2048)
//!     .with_system_message("You are a helpful coding assistant.");
//!
//! let mut conversation = Conversation::new(client, config)?;
//! let reply = conversation.send("Add a README").await?;
//! ```

mod config;
mod driver;

pub use config::{ConversationConfig, DEFAULT_MODEL, MIN_THINKING_BUDGET};
pub use driver::Conversation;
