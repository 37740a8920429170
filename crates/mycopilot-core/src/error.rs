//! Workspace-level error type.

use thiserror::Error;

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error shared across the workspace.
///
/// Component crates define richer error enums and convert into this type
/// at their boundaries.
#[derive(Debug, Error)]
pub enum Error {
    /// Storage/query error.
    #[error("Store error: {0}")]
    Store(String),

    /// LLM backend error.
    #[error("LLM error: {0}")]
    Llm(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation error.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Not found error.
    #[error("Resource not found: {0}")]
    NotFound(String),
}

impl From<crate::store::StoreError> for Error {
    fn from(e: crate::store::StoreError) -> Self {
        Error::Store(e.to_string())
    }
}

impl From<crate::llm::LlmError> for Error {
    fn from(e: crate::llm::LlmError) -> Self {
        Error::Llm(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmError;
    use crate::store::StoreError;

    #[test]
    fn component_errors_convert_with_context() {
        let store: Error = StoreError::Unavailable("db down".to_string()).into();
        assert!(matches!(store, Error::Store(_)));
        assert!(store.to_string().contains("db down"));

        let llm: Error = LlmError::Timeout(30).into();
        assert!(matches!(llm, Error::Llm(_)));
        assert!(llm.to_string().contains("30"));

        let json = serde_json::from_str::<serde_json::Value>("{oops").unwrap_err();
        let serialization: Error = json.into();
        assert!(matches!(serialization, Error::Serialization(_)));
    }
}
