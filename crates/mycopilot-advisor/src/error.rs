//! Error types for the advisor crate.
//!
//! Most failure classes degrade into metadata warnings or the fallback
//! decision; [`AdvisorError::ConfigurationFatal`] is the only one that
//! aborts an invocation.

use thiserror::Error;

use mycopilot_core::llm::LlmError;

/// Result type for advisor operations.
pub type Result<T> = std::result::Result<T, AdvisorError>;

/// Advisor error types.
#[derive(Debug, Error)]
pub enum AdvisorError {
    /// The room has no usable capability manifest. Aborts the invocation
    /// with `status=error`; every other failure class degrades.
    #[error("Configuration fatal: {0}")]
    ConfigurationFatal(String),

    /// Manifest file could not be read or decoded.
    #[error("Manifest load failed: {0}")]
    ManifestLoad(String),

    /// LLM backend construction failed.
    #[error("Backend setup failed: {0}")]
    BackendSetup(String),
}

/// Reasoning-call failure categories.
///
/// Recorded distinctly in decision metadata for observability; all of
/// them funnel into the same fallback decision path.
#[derive(Debug, Clone, Error)]
pub enum ReasoningFailure {
    /// Connection-level or service-side failure.
    #[error("Reasoning connection failure: {0}")]
    Connection(String),

    /// The call exceeded its deadline.
    #[error("Reasoning timeout: {0}")]
    Timeout(String),

    /// The service answered, but no decision could be parsed out.
    #[error("Malformed reasoning payload: {0}")]
    MalformedResponse(String),
}

impl From<&LlmError> for ReasoningFailure {
    fn from(e: &LlmError) -> Self {
        match e {
            LlmError::Network(msg) => ReasoningFailure::Connection(msg.clone()),
            LlmError::Timeout(secs) => ReasoningFailure::Timeout(format!("after {}s", secs)),
            LlmError::InvalidResponse(msg) => ReasoningFailure::MalformedResponse(msg.clone()),
            LlmError::Backend(msg) => ReasoningFailure::Connection(msg.clone()),
        }
    }
}
