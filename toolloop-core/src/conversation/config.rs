//! Conversation settings, validated once at construction.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::llm::Message;
use crate::rate_limit::RateLimitConfig;

/// Model used when none is configured.
pub const DEFAULT_MODEL: &str = "claude-3-7-sonnet-20250219";

/// Smallest non-zero thinking budget the service accepts.
pub const MIN_THINKING_BUDGET: u32 = 1024;

/// Immutable configuration of one [`super::Conversation`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub system_message: Option<String>,
    /// Messages placed before the history on every call
    pub injected_messages: Vec<Message>,
    /// 0 disables extended thinking
    pub thinking_budget: u32,
    pub text_editor: bool,
    pub cooldown_secs: u64,
    pub rate_limit_tokens: u64,
    pub rate_limit_window_secs: u64,
    pub prompt_buffer: u64,
    /// Root for relative tool paths; `~` is expanded
    pub repo_root: PathBuf,
    /// Append a listing of `repo_root` to the system message
    pub workspace_listing: bool,
    /// Model-id substrings that permit extended thinking
    pub thinking_models: Vec<String>,
    /// Model-id substrings that permit the text editor
    pub text_editor_models: Vec<String>,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        let limits = RateLimitConfig::default();
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_tokens: limits.max_tokens,
            temperature: 1.0,
            system_message: None,
            injected_messages: Vec::new(),
            thinking_budget: 0,
            text_editor: false,
            cooldown_secs: limits.cooldown.as_secs(),
            rate_limit_tokens: limits.token_budget,
            rate_limit_window_secs: limits.window.as_secs(),
            prompt_buffer: limits.prompt_buffer,
            repo_root: PathBuf::from("."),
            workspace_listing: true,
            thinking_models: vec!["claude-3-7-sonnet".to_string()],
            text_editor_models: vec![
                "claude-3-5-sonnet".to_string(),
                "claude-3-7-sonnet".to_string(),
            ],
        }
    }
}

impl ConversationConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }

    /// Defaults overlaid with `TOOLLOOP_*` environment variables.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Overlay `TOOLLOOP_*` environment variables onto this configuration.
    pub fn with_env_overrides(mut self) -> Self {
        fn parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
            std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
        }

        if let Ok(model) = std::env::var("TOOLLOOP_MODEL") {
            self.model = model;
        }
        if let Some(v) = parsed("TOOLLOOP_MAX_TOKENS") {
            self.max_tokens = v;
        }
        if let Some(v) = parsed("TOOLLOOP_TEMPERATURE") {
            self.temperature = v;
        }
        if let Some(v) = parsed("TOOLLOOP_THINKING_BUDGET") {
            self.thinking_budget = v;
        }
        if let Ok(v) = std::env::var("TOOLLOOP_TEXT_EDITOR") {
            self.text_editor = v != "0" && v.to_lowercase() != "false";
        }
        if let Some(v) = parsed("TOOLLOOP_COOLDOWN") {
            self.cooldown_secs = v;
        }
        if let Some(v) = parsed("TOOLLOOP_RATE_LIMIT_TOKENS") {
            self.rate_limit_tokens = v;
        }
        if let Some(v) = parsed("TOOLLOOP_RATE_LIMIT_WINDOW") {
            self.rate_limit_window_secs = v;
        }
        if let Ok(root) = std::env::var("TOOLLOOP_REPO_ROOT") {
            self.repo_root = PathBuf::from(root);
        }
        self
    }

    /// Load a configuration from a TOML file. Missing keys keep their defaults.
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
            .map_err(|e| Error::config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::config(e.message().to_string()))
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_system_message(mut self, message: impl Into<String>) -> Self {
        self.system_message = Some(message.into());
        self
    }

    pub fn with_injected_messages(mut self, messages: Vec<Message>) -> Self {
        self.injected_messages = messages;
        self
    }

    pub fn with_thinking_budget(mut self, budget: u32) -> Self {
        self.thinking_budget = budget;
        self
    }

    pub fn with_text_editor(mut self, enabled: bool) -> Self {
        self.text_editor = enabled;
        self
    }

    pub fn with_cooldown(mut self, secs: u64) -> Self {
        self.cooldown_secs = secs;
        self
    }

    pub fn with_rate_limit(mut self, tokens: u64, window_secs: u64) -> Self {
        self.rate_limit_tokens = tokens;
        self.rate_limit_window_secs = window_secs;
        self
    }

    pub fn with_repo_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.repo_root = root.into();
        self
    }

    pub fn with_workspace_listing(mut self, enabled: bool) -> Self {
        self.workspace_listing = enabled;
        self
    }

    /// Repository root with a leading `~` expanded.
    pub fn resolved_repo_root(&self) -> PathBuf {
        let raw = self.repo_root.to_string_lossy();
        PathBuf::from(shellexpand::tilde(&raw).into_owned())
    }

    pub fn supports_thinking(&self) -> bool {
        self.thinking_models.iter().any(|m| self.model.contains(m.as_str()))
    }

    pub fn supports_text_editor(&self) -> bool {
        self.text_editor_models
            .iter()
            .any(|m| self.model.contains(m.as_str()))
    }

    /// Limiter settings derived from this configuration.
    pub fn rate_limit_config(&self) -> RateLimitConfig {
        RateLimitConfig {
            cooldown: Duration::from_secs(self.cooldown_secs),
            token_budget: self.rate_limit_tokens,
            window: Duration::from_secs(self.rate_limit_window_secs),
            max_tokens: self.max_tokens,
            prompt_buffer: self.prompt_buffer,
        }
    }

    /// Check the configuration for combinations the service would reject.
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(Error::config("Model must not be empty."));
        }
        if self.max_tokens == 0 {
            return Err(Error::config("max_tokens must be positive."));
        }
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(Error::config(format!(
                "Temperature {} is outside [0, 1].",
                self.temperature
            )));
        }

        if self.thinking_budget > 0 {
            if !self.supports_thinking() {
                return Err(Error::config(format!(
                    "Thinking budget is only available for these models: {}",
                    self.thinking_models.join(", ")
                )));
            }
            if self.thinking_budget < MIN_THINKING_BUDGET {
                return Err(Error::config(format!(
                    "Thinking budget must be at least {} tokens.",
                    MIN_THINKING_BUDGET
                )));
            }
            if self.thinking_budget > self.max_tokens {
                return Err(Error::config(
                    "Thinking budget must not exceed max tokens.",
                ));
            }
        }

        if self.text_editor && !self.supports_text_editor() {
            return Err(Error::config(format!(
                "Text editor is only available for these models: {}",
                self.text_editor_models.join(", ")
            )));
        }

        if self.rate_limit_window_secs == 0 {
            return Err(Error::config("Rate limit window must be positive."));
        }
        let limits = self.rate_limit_config();
        if self.rate_limit_tokens < limits.estimated_call_cost() {
            return Err(Error::config(format!(
                "Rate limit budget of {} tokens cannot fit a single call of up to {} tokens.",
                self.rate_limit_tokens,
                limits.estimated_call_cost()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ConversationConfig::default();
        config.validate().unwrap();
        assert_eq!(config.max_tokens, 16_384);
        assert_eq!(config.rate_limit_config(), RateLimitConfig::default());
    }

    #[test]
    fn test_thinking_budget_bounds() {
        let base = ConversationConfig::default();
        assert!(base.clone().with_thinking_budget(1023).validate().is_err());
        assert!(base.clone().with_thinking_budget(1024).validate().is_ok());
        assert!(base
            .clone()
            .with_max_tokens(4096)
            .with_thinking_budget(8192)
            .validate()
            .is_err());
    }

    #[test]
    fn test_model_whitelists() {
        let config = ConversationConfig::new("claude-3-5-haiku-20241022").with_thinking_budget(2048);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("claude-3-7-sonnet"));

        let editor_ok = ConversationConfig::new("claude-3-5-sonnet-20241022").with_text_editor(true);
        assert!(editor_ok.validate().is_ok());

        let editor_bad = ConversationConfig::new("claude-3-opus-20240229").with_text_editor(true);
        assert!(editor_bad.validate().is_err());
    }

    #[test]
    fn test_temperature_and_limits() {
        let base = ConversationConfig::default();
        assert!(base.clone().with_temperature(1.5).validate().is_err());
        assert!(base.clone().with_temperature(0.0).validate().is_ok());
        assert!(base.clone().with_rate_limit(20_000, 0).validate().is_err());
        assert!(base.clone().with_rate_limit(1_000, 60).validate().is_err());
        assert!(base.with_max_tokens(0).validate().is_err());
    }

    #[test]
    fn test_toml_overlay_keeps_defaults() {
        let config = ConversationConfig::from_toml_str(
            "model = \"claude-3-7-sonnet-latest\"\nthinking_budget = 2048\ntext_editor = true\n",
        )
        .unwrap();
        assert_eq!(config.model, "claude-3-7-sonnet-latest");
        assert_eq!(config.thinking_budget, 2048);
        assert_eq!(config.cooldown_secs, 3);
        config.validate().unwrap();

        assert!(ConversationConfig::from_toml_str("max_tokens = \"lots\"").is_err());
    }

    #[test]
    fn test_relative_root_is_unchanged() {
        let config = ConversationConfig::default().with_repo_root("work/repo");
        assert_eq!(config.resolved_repo_root(), PathBuf::from("work/repo"));
    }
}
