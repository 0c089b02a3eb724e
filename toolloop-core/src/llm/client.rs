//! LLM client trait and the Anthropic Messages API implementation.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;
use tracing::debug;

use crate::error::{Error, Result};

use super::types::{CompletionRequest, CompletionResponse, ContentBlock, StopReason, TokenUsage};

/// LLM client trait for making completions.
#[async_trait]
pub trait LLMClient: Send + Sync {
    /// Complete a request. Transport failures are returned, never retried.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;
}

/// Configuration for LLM clients.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API key
    pub api_key: String,
    /// Base URL override
    pub base_url: Option<String>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl ClientConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: None,
            timeout_secs: 600,
        }
    }

    /// Create configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| Error::config("ANTHROPIC_API_KEY is not set"))?;

        let mut config = Self::new(api_key);
        config.base_url = std::env::var("ANTHROPIC_BASE_URL").ok();
        if let Some(timeout) = std::env::var("TOOLLOOP_HTTP_TIMEOUT")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            config.timeout_secs = timeout;
        }
        Ok(config)
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

fn build_http_client(timeout_secs: u64) -> Result<Client> {
    let timeout = Duration::from_secs(timeout_secs);

    // Some sandboxed macOS environments can panic during proxy auto-detection
    // in reqwest's default client builder. Fall back to no-proxy in that case.
    match catch_unwind(AssertUnwindSafe(|| {
        Client::builder().timeout(timeout).build()
    })) {
        Ok(Ok(client)) => Ok(client),
        Ok(Err(_)) | Err(_) => Client::builder()
            .no_proxy()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Http(format!("Failed to create HTTP client: {}", e))),
    }
}

/// Anthropic Claude client.
pub struct AnthropicClient {
    config: ClientConfig,
    http: Client,
}

impl AnthropicClient {
    const DEFAULT_BASE_URL: &'static str = "https://api.anthropic.com";
    const API_VERSION: &'static str = "2023-06-01";
    const PROVIDER: &'static str = "anthropic";

    pub fn new(config: ClientConfig) -> Result<Self> {
        let http = build_http_client(config.timeout_secs)?;

        Ok(Self { config, http })
    }

    fn base_url(&self) -> &str {
        self.config
            .base_url
            .as_deref()
            .unwrap_or(Self::DEFAULT_BASE_URL)
            .trim_end_matches('/')
    }
}

// Anthropic API types
#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    id: String,
    #[serde(default)]
    model: String,
    #[serde(default)]
    content: Vec<Value>,
    stop_reason: Option<String>,
    usage: Option<TokenUsage>,
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    error: AnthropicErrorDetail,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorDetail {
    message: String,
    #[serde(rename = "type")]
    error_type: String,
}

/// Decode a successful Messages API body.
pub(crate) fn parse_response(body: &str) -> Result<CompletionResponse> {
    let api_response: AnthropicResponse = serde_json::from_str(body)?;

    let content = api_response
        .content
        .into_iter()
        .filter_map(ContentBlock::from_value)
        .collect();

    Ok(CompletionResponse {
        id: api_response.id,
        model: api_response.model,
        content,
        stop_reason: api_response.stop_reason.as_deref().map(StopReason::parse),
        usage: api_response.usage,
    })
}

/// Map a non-success status and body to an error.
pub(crate) fn error_for_status(status: StatusCode, body: &str) -> Error {
    let message = match serde_json::from_str::<AnthropicError>(body) {
        Ok(error) => format!("{} ({}): {}", status, error.error.error_type, error.error.message),
        Err(_) => format!("{}: {}", status, body),
    };

    if status == StatusCode::TOO_MANY_REQUESTS {
        Error::rate_limited(message)
    } else {
        Error::llm_api(AnthropicClient::PROVIDER, message)
    }
}

#[async_trait]
impl LLMClient for AnthropicClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let url = format!("{}/v1/messages", self.base_url());
        debug!(
            "POST {} model={} messages={}",
            url,
            request.model,
            request.messages.len()
        );

        let response = self
            .http
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", Self::API_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Http(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Http(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(error_for_status(status, &body));
        }

        parse_response(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_client_config_builder() {
        let config = ClientConfig::new("test-key")
            .with_base_url("https://custom.api.com")
            .with_timeout(60);

        assert_eq!(config.api_key, "test-key");
        assert_eq!(config.base_url, Some("https://custom.api.com".to_string()));
        assert_eq!(config.timeout_secs, 60);
    }

    #[test]
    fn test_base_url_trims_trailing_slash() {
        let client =
            AnthropicClient::new(ClientConfig::new("k").with_base_url("http://localhost:8080/"))
                .unwrap();
        assert_eq!(client.base_url(), "http://localhost:8080");
    }

    #[test]
    fn test_parse_response_keeps_block_order() {
        let body = json!({
            "id": "msg_01",
            "model": "claude-3-7-sonnet-20250219",
            "stop_reason": "tool_use",
            "content": [
                {"type": "thinking", "thinking": "check file", "signature": "sig"},
                {"type": "text", "text": "Let me look."},
                {"type": "tool_use", "id": "toolu_1", "name": "str_replace_editor",
                 "input": {"command": "view", "path": "."}}
            ],
            "usage": {"input_tokens": 120, "output_tokens": 45}
        })
        .to_string();

        let response = parse_response(&body).unwrap();
        let kinds: Vec<_> = response.content.iter().map(ContentBlock::kind).collect();
        assert_eq!(kinds, vec!["thinking", "text", "tool_use"]);
        assert_eq!(response.stop_reason, Some(StopReason::ToolUse));
        assert_eq!(response.usage.map(|u| u.total()), Some(165));
    }

    #[test]
    fn test_parse_response_without_usage() {
        let body = json!({
            "id": "msg_02",
            "model": "m",
            "content": [{"type": "server_thing"}, {"type": "text", "text": "ok"}]
        })
        .to_string();

        let response = parse_response(&body).unwrap();
        assert_eq!(response.content, vec![ContentBlock::text("ok")]);
        assert!(response.usage.is_none());
    }

    #[test]
    fn test_error_for_status_maps_429() {
        let body = json!({"type": "error",
            "error": {"type": "rate_limit_error", "message": "Number of request tokens has exceeded your per-minute rate limit"}})
        .to_string();
        let err = error_for_status(StatusCode::TOO_MANY_REQUESTS, &body);
        assert!(err.is_rate_limited());
        assert!(err.to_string().contains("rate_limit_error"));

        let err = error_for_status(StatusCode::BAD_REQUEST, "not json");
        assert!(matches!(err, Error::LlmApi { .. }));
        assert!(err.to_string().contains("not json"));
    }
}
