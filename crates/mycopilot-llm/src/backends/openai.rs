//! OpenAI-compatible reasoning backend.
//!
//! Talks to any chat-completions endpoint (OpenAI, vLLM, Ollama's /v1
//! shim, cloud gateways). Requests are non-streaming; timeouts and retry
//! counts come from configuration, and transient failures are retried
//! with exponential backoff before surfacing a typed error.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use mycopilot_core::config::ReasoningConfig;
use mycopilot_core::llm::{
    FinishReason, LlmError, LlmInput, LlmOutput, LlmRuntime, TokenUsage,
};

/// Backoff cap so a misconfigured retry count cannot stall an invocation.
const MAX_BACKOFF: Duration = Duration::from_secs(10);

/// OpenAI-compatible backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OpenAiConfig {
    /// Base endpoint including the /v1 prefix, e.g. "https://api.openai.com/v1".
    pub endpoint: String,

    /// Optional bearer API key.
    pub api_key: Option<String>,

    /// Model name sent with each request.
    pub model: String,

    /// Request timeout in seconds (default: 30).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Retry attempts after the first failure (default: 2).
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// Base backoff in milliseconds, doubled per attempt (default: 500).
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> usize {
    2
}

fn default_retry_base_ms() -> u64 {
    500
}

impl OpenAiConfig {
    /// Create a new config for a model against the default local endpoint.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            endpoint: "http://localhost:11434/v1".to_string(),
            api_key: None,
            model: model.into(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            retry_base_ms: default_retry_base_ms(),
        }
    }

    /// Set a custom endpoint. A trailing slash is stripped.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        let mut endpoint = endpoint.into();
        while endpoint.ends_with('/') {
            endpoint.pop();
        }
        self.endpoint = endpoint;
        self
    }

    /// Set the bearer API key.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set timeout in seconds.
    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Get the timeout as a Duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl From<&ReasoningConfig> for OpenAiConfig {
    fn from(config: &ReasoningConfig) -> Self {
        let mut openai = OpenAiConfig::new(config.model.clone())
            .with_endpoint(config.endpoint.clone())
            .with_timeout_secs(config.timeout_secs);
        openai.api_key = config.api_key.clone();
        openai.max_retries = config.max_retries;
        openai.retry_base_ms = config.retry_base_ms;
        openai
    }
}

/// Chat-completions request body.
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

/// OpenAI-compatible runtime.
pub struct OpenAiRuntime {
    config: OpenAiConfig,
    client: Client,
}

impl OpenAiRuntime {
    /// Create a new runtime.
    pub fn new(config: OpenAiConfig) -> Result<Self, LlmError> {
        tracing::debug!(endpoint = %config.endpoint, model = %config.model, "Creating OpenAI-compatible runtime");

        let client = Client::builder()
            .timeout(config.timeout())
            .connect_timeout(Duration::from_secs(5))
            .pool_max_idle_per_host(5)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| LlmError::Network(e.to_string()))?;

        Ok(Self { config, client })
    }

    fn classify(&self, e: reqwest::Error) -> LlmError {
        if e.is_timeout() {
            LlmError::Timeout(self.config.timeout_secs)
        } else if e.is_connect() || e.is_request() {
            LlmError::Network(e.to_string())
        } else if e.is_decode() {
            LlmError::InvalidResponse(e.to_string())
        } else {
            LlmError::Backend(e.to_string())
        }
    }

    /// Whether a failure is worth another attempt.
    fn retryable(error: &LlmError) -> bool {
        matches!(error, LlmError::Network(_) | LlmError::Timeout(_) | LlmError::Backend(_))
    }

    async fn send_once(&self, input: &LlmInput) -> Result<LlmOutput, LlmError> {
        let url = format!("{}/chat/completions", self.config.endpoint);
        let model = input.model.as_deref().unwrap_or(&self.config.model);

        let request = ChatRequest {
            model,
            messages: input
                .messages
                .iter()
                .map(|m| ChatMessage {
                    role: m.role.as_str(),
                    content: &m.content,
                })
                .collect(),
            max_tokens: input.params.max_tokens,
            temperature: input.params.temperature,
            stream: false,
        };

        let mut builder = self.client.post(&url).json(&request);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let error = LlmError::Backend(format!("HTTP {}: {}", status, body));
            // Client errors won't heal on retry; map them to a terminal kind.
            if status.is_client_error() && status.as_u16() != 429 {
                return Err(LlmError::InvalidResponse(format!("HTTP {}: {}", status, body)));
            }
            return Err(error);
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| self.classify(e))?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("response contained no choices".to_string()))?;
        let text = choice
            .message
            .content
            .ok_or_else(|| LlmError::InvalidResponse("choice contained no content".to_string()))?;

        let finish_reason = match choice.finish_reason.as_deref() {
            Some("length") => FinishReason::Length,
            Some("content_filter") => FinishReason::ContentFilter,
            Some("stop") | None => FinishReason::Stop,
            Some(_) => FinishReason::Stop,
        };

        Ok(LlmOutput {
            text,
            finish_reason,
            usage: parsed
                .usage
                .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens)),
        })
    }
}

#[async_trait]
impl LlmRuntime for OpenAiRuntime {
    fn id(&self) -> &str {
        "openai"
    }

    async fn generate(&self, input: LlmInput) -> Result<LlmOutput, LlmError> {
        let mut backoff = Duration::from_millis(self.config.retry_base_ms);
        let mut attempt = 0usize;

        loop {
            match self.send_once(&input).await {
                Ok(output) => return Ok(output),
                Err(error) => {
                    if attempt >= self.config.max_retries || !Self::retryable(&error) {
                        return Err(error);
                    }
                    tracing::warn!(
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %error,
                        "Reasoning call failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = std::cmp::min(backoff * 2, MAX_BACKOFF);
                    attempt += 1;
                }
            }
        }
    }
}
