//! The tool-use conversation loop.

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::config::ConversationConfig;
use crate::error::Result;
use crate::llm::{
    CompletionRequest, ContentBlock, LLMClient, Message, MessageContent, TEXT_EDITOR_TOOL_NAME,
};
use crate::observer::{ConversationEvent, ConversationObserver, TracingObserver};
use crate::rate_limit::{RateLimiter, UsageStats};
use crate::tools::{BackupStore, TextEditor, ToolError, ToolOutcome};

/// A stateful conversation with one model.
///
/// Each [`send`](Self::send) drives completion calls until the model stops
/// requesting tools. Tool failures are reported back to the model; only
/// transport failures surface as errors.
pub struct Conversation {
    client: Arc<dyn LLMClient>,
    config: ConversationConfig,
    history: Vec<Message>,
    limiter: RateLimiter,
    editor: Option<TextEditor>,
    observer: Arc<dyn ConversationObserver>,
    /// Results for the last stored tool_use turn that never reached the model.
    pending_tool_results: Vec<ContentBlock>,
}

impl std::fmt::Debug for Conversation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Conversation")
            .field("config", &self.config)
            .field("history_len", &self.history.len())
            .field("limiter", &self.limiter)
            .field("editor", &self.editor)
            .field("pending_tool_results", &self.pending_tool_results.len())
            .finish_non_exhaustive()
    }
}

impl Conversation {
    /// Create a conversation, rejecting invalid configurations up front.
    pub fn new(client: Arc<dyn LLMClient>, config: ConversationConfig) -> Result<Self> {
        config.validate()?;
        info!(
            "Initializing conversation with model={}, max_tokens={}, temperature={}",
            config.model, config.max_tokens, config.temperature
        );
        debug!(
            "thinking_budget={}, text_editor={}, repo_root={}",
            config.thinking_budget,
            config.text_editor,
            config.repo_root.display()
        );

        let editor = config
            .text_editor
            .then(|| TextEditor::new(config.resolved_repo_root()));
        Ok(Self {
            client,
            limiter: RateLimiter::new(config.rate_limit_config()),
            config,
            history: Vec::new(),
            editor,
            observer: Arc::new(TracingObserver),
            pending_tool_results: Vec::new(),
        })
    }

    pub fn with_observer(mut self, observer: Arc<dyn ConversationObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Use a shared backup store for the text editor, if enabled.
    pub fn with_backups(mut self, backups: Arc<BackupStore>) -> Self {
        self.editor = self.editor.map(|editor| editor.with_backups(backups));
        self
    }

    pub fn config(&self) -> &ConversationConfig {
        &self.config
    }

    /// The text editor, when enabled.
    pub fn editor(&self) -> Option<&TextEditor> {
        self.editor.as_ref()
    }

    /// Completed (user, assistant) pairs, oldest first.
    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn clear(&mut self) {
        self.history.clear();
        self.pending_tool_results.clear();
        info!("Conversation history cleared");
    }

    pub fn usage_stats(&mut self) -> UsageStats {
        self.limiter.stats()
    }

    /// Send user input and run tool calls until the model answers in text.
    ///
    /// Returns the text blocks of the final response joined by newlines.
    pub async fn send(&mut self, input: impl Into<MessageContent>) -> Result<String> {
        let mut input = self.with_pending_results(input.into());
        loop {
            let request = self.build_request(&input);

            let waited = self.limiter.acquire().await;
            if !waited.is_zero() {
                self.observer
                    .on_event(&ConversationEvent::RateLimitWait { duration: waited });
            }

            let response = match self.client.complete(request).await {
                Ok(response) => response,
                Err(e) => {
                    // History may end on an assistant tool_use; keep its results for the next send.
                    self.pending_tool_results = input.tool_results().cloned().collect();
                    if !self.pending_tool_results.is_empty() {
                        warn!(
                            "Completion failed; holding {} tool results for the next send",
                            self.pending_tool_results.len()
                        );
                    }
                    return Err(e);
                }
            };
            match response.usage {
                Some(usage) => {
                    debug!(
                        "Token usage: {} input + {} output = {} total",
                        usage.input_tokens,
                        usage.output_tokens,
                        usage.total()
                    );
                    self.limiter.record(usage.total());
                }
                None => self.limiter.record_estimate(),
            }

            let (saved, tool_results) = self.process_blocks(response.content);
            let text = joined_text(&saved);

            self.history.push(Message::user(input));
            self.history.push(Message::assistant(saved));

            if tool_results.is_empty() {
                return Ok(text);
            }
            debug!("Continuing with {} tool results", tool_results.len());
            input = MessageContent::Blocks(tool_results);
        }
    }

    /// Prefix `input` with tool results left over from a failed continuation.
    fn with_pending_results(&mut self, input: MessageContent) -> MessageContent {
        if self.pending_tool_results.is_empty() {
            return input;
        }
        let mut blocks = std::mem::take(&mut self.pending_tool_results);
        debug!("Resending {} pending tool results", blocks.len());
        match input {
            MessageContent::Text(text) if text.is_empty() => {}
            MessageContent::Text(text) => blocks.push(ContentBlock::text(text)),
            MessageContent::Blocks(more) => blocks.extend(more),
        }
        MessageContent::Blocks(blocks)
    }

    fn build_request(&self, input: &MessageContent) -> CompletionRequest {
        let mut messages = Vec::with_capacity(
            self.config.injected_messages.len() + self.history.len() + 1,
        );
        messages.extend(self.config.injected_messages.iter().cloned());
        messages.extend(self.history.iter().cloned());
        messages.push(Message::user(input.clone()));

        let mut request = CompletionRequest::new(&self.config.model, self.config.max_tokens)
            .with_temperature(self.config.temperature)
            .with_messages(messages);

        if let Some(system) = &self.config.system_message {
            request = request.with_system(self.system_prompt(system));
        }
        if self.config.thinking_budget > 0 {
            request = request.with_thinking(self.config.thinking_budget);
        }
        if self.editor.is_some() {
            request = request.with_tool(TextEditor::definition());
        }
        request
    }

    fn system_prompt(&self, system: &str) -> String {
        if !self.config.workspace_listing {
            return system.to_string();
        }
        let root = self.config.resolved_repo_root();
        match std::fs::read_dir(&root) {
            Ok(entries) => {
                let mut names: Vec<String> = entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .collect();
                names.sort();
                format!("{}\nCWD:\n[{}]", system, names.join(", "))
            }
            Err(e) => {
                warn!("Could not list repository root {}: {}", root.display(), e);
                system.to_string()
            }
        }
    }

    /// Classify response blocks in order, executing tool calls as they appear.
    fn process_blocks(&self, content: Vec<ContentBlock>) -> (Vec<ContentBlock>, Vec<ContentBlock>) {
        let mut saved = Vec::with_capacity(content.len());
        let mut tool_results = Vec::new();

        for block in content {
            match &block {
                ContentBlock::Thinking { thinking, .. } => {
                    self.observer.on_event(&ConversationEvent::Thinking {
                        thinking: thinking.clone(),
                    });
                }
                ContentBlock::Text { text } => {
                    self.observer
                        .on_event(&ConversationEvent::Text { text: text.clone() });
                }
                ContentBlock::ToolUse { id, name, input } => {
                    self.observer.on_event(&ConversationEvent::ToolUse {
                        id: id.clone(),
                        name: name.clone(),
                        command: string_field(input, "command"),
                        path: string_field(input, "path"),
                    });

                    let outcome = self.run_tool(name, input);
                    if outcome.is_error {
                        warn!("Tool error: {}", outcome.content);
                    }
                    self.observer.on_event(&ConversationEvent::ToolResult {
                        tool_use_id: id.clone(),
                        is_error: outcome.is_error,
                        content: outcome.content.clone(),
                    });
                    tool_results.push(ContentBlock::tool_result(
                        id.clone(),
                        outcome.content,
                        outcome.is_error,
                    ));
                }
                ContentBlock::ToolResult { tool_use_id, .. } => {
                    warn!(
                        "Ignoring tool_result block for {} in model response",
                        tool_use_id
                    );
                    continue;
                }
            }
            saved.push(block);
        }

        (saved, tool_results)
    }

    fn run_tool(&self, name: &str, input: &Value) -> ToolOutcome {
        if name != TEXT_EDITOR_TOOL_NAME {
            return ToolOutcome::failure(&ToolError::invalid_input(format!(
                "Unknown tool '{}'",
                name
            )));
        }
        match &self.editor {
            Some(editor) => editor.dispatch(input),
            None => ToolOutcome::failure(&ToolError::invalid_input(
                "The text editor tool is not enabled",
            )),
        }
    }
}

fn string_field(input: &Value, key: &str) -> Option<String> {
    input.get(key).and_then(Value::as_str).map(str::to_string)
}

fn joined_text(blocks: &[ContentBlock]) -> String {
    blocks
        .iter()
        .filter_map(|b| match b {
            ContentBlock::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}
