//! Side-channel notifications emitted while a conversation turn runs.

use std::time::Duration;
use tracing::{debug, info, warn};

/// Something noteworthy happened inside [`crate::Conversation::send`].
#[derive(Debug, Clone, PartialEq)]
pub enum ConversationEvent {
    /// The model produced a reasoning trace
    Thinking { thinking: String },
    /// The model produced user-visible text
    Text { text: String },
    /// The model asked for a tool call
    ToolUse {
        id: String,
        name: String,
        command: Option<String>,
        path: Option<String>,
    },
    /// A tool call finished
    ToolResult {
        tool_use_id: String,
        is_error: bool,
        content: String,
    },
    /// The limiter delayed an outbound call
    RateLimitWait { duration: Duration },
}

/// Receiver for [`ConversationEvent`]s.
pub trait ConversationObserver: Send + Sync {
    fn on_event(&self, event: &ConversationEvent);
}

/// Observer that reports events through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl ConversationObserver for TracingObserver {
    fn on_event(&self, event: &ConversationEvent) {
        match event {
            ConversationEvent::Thinking { thinking } => {
                debug!("Thinking ({} chars)", thinking.len());
            }
            ConversationEvent::Text { text } => {
                debug!("Text block ({} chars)", text.len());
            }
            ConversationEvent::ToolUse {
                name,
                command,
                path,
                ..
            } => {
                info!(
                    "Tool call {}: {} {}",
                    name,
                    command.as_deref().unwrap_or("?"),
                    path.as_deref().unwrap_or("")
                );
            }
            ConversationEvent::ToolResult {
                tool_use_id,
                is_error,
                content,
            } => {
                if *is_error {
                    warn!("Tool call {} failed: {}", tool_use_id, content);
                } else {
                    debug!("Tool call {} succeeded ({} chars)", tool_use_id, content.len());
                }
            }
            ConversationEvent::RateLimitWait { duration } => {
                info!("Rate limited: waited {:.2} seconds", duration.as_secs_f64());
            }
        }
    }
}
