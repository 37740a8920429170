//! Abstract LLM runtime backend.
//!
//! Defines the minimal non-streaming inference abstraction the decision
//! pipeline needs. Concrete backends (OpenAI-compatible HTTP, mock) live
//! in `mycopilot-llm`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Message role in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// A single conversation message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Generation parameters.
#[derive(Debug, Clone)]
pub struct GenerationParams {
    /// Temperature (0.0 - 2.0)
    pub temperature: Option<f32>,

    /// Top-p sampling (0.0 - 1.0)
    pub top_p: Option<f32>,

    /// Maximum tokens to generate
    pub max_tokens: Option<usize>,

    /// Stop sequences
    pub stop: Option<Vec<String>>,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: Some(0.2),
            top_p: Some(0.9),
            max_tokens: Some(2048),
            stop: None,
        }
    }
}

/// LLM input.
#[derive(Debug, Clone)]
pub struct LlmInput {
    /// Messages for the conversation
    pub messages: Vec<Message>,

    /// Generation parameters
    pub params: GenerationParams,

    /// Model identifier (backend-specific)
    pub model: Option<String>,

    /// Stream response; the advisory pipeline always sends false.
    pub stream: bool,
}

impl LlmInput {
    /// Create a new input with a single user message.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::user(content)],
            params: GenerationParams::default(),
            model: None,
            stream: false,
        }
    }

    /// Create an input from a prepared message list.
    pub fn from_messages(messages: Vec<Message>) -> Self {
        Self {
            messages,
            params: GenerationParams::default(),
            model: None,
            stream: false,
        }
    }

    /// Set generation parameters.
    pub fn with_params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }

    /// Set model identifier.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// Finish reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    /// Model stopped naturally
    Stop,

    /// Max tokens reached
    Length,

    /// Model hit an error
    Error,

    /// Content filter triggered
    ContentFilter,
}

/// Token usage statistics.
#[derive(Debug, Clone, Copy)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// LLM output.
#[derive(Debug, Clone)]
pub struct LlmOutput {
    /// Generated text content
    pub text: String,

    /// Finish reason (stop, length, error)
    pub finish_reason: FinishReason,

    /// Tokens used (prompt + completion)
    pub usage: Option<TokenUsage>,
}

/// LLM backend errors.
///
/// Variants map one-to-one onto the reasoning-failure categories recorded
/// in decision metadata, so callers can attribute failures without string
/// matching.
#[derive(Debug, Clone, Error)]
pub enum LlmError {
    /// Connection-level failure (DNS, refused, TLS).
    #[error("Network error: {0}")]
    Network(String),

    /// The request exceeded its deadline.
    #[error("Timeout after {0}s")]
    Timeout(u64),

    /// The service answered, but the payload was not usable.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Backend-internal failure.
    #[error("Backend error: {0}")]
    Backend(String),
}

/// Non-streaming LLM runtime.
#[async_trait]
pub trait LlmRuntime: Send + Sync {
    /// Stable backend identifier, e.g. "openai" or "mock".
    fn id(&self) -> &str;

    /// Run one generation to completion.
    async fn generate(&self, input: LlmInput) -> Result<LlmOutput, LlmError>;
}
