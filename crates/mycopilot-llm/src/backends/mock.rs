//! Scripted mock runtime for tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use mycopilot_core::llm::{FinishReason, LlmError, LlmInput, LlmOutput, LlmRuntime};

/// Deterministic [`LlmRuntime`] for tests.
///
/// Replays a script of canned results; once the script is exhausted the
/// last entry repeats, so a single-entry mock behaves like a constant
/// backend.
pub struct MockRuntime {
    script: Mutex<VecDeque<Result<String, LlmError>>>,
    last: Mutex<Option<Result<String, LlmError>>>,
    calls: AtomicUsize,
}

impl MockRuntime {
    /// Always answer with the same text.
    pub fn always(text: impl Into<String>) -> Self {
        Self::script(vec![Ok(text.into())])
    }

    /// Always fail with a connection error, like an unreachable service.
    pub fn unreachable() -> Self {
        Self::script(vec![Err(LlmError::Network("connection refused".to_string()))])
    }

    /// Replay the given results in order, repeating the final one.
    pub fn script(results: Vec<Result<String, LlmError>>) -> Self {
        Self {
            script: Mutex::new(results.into_iter().collect()),
            last: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    /// How many times `generate` was called.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next(&self) -> Result<String, LlmError> {
        let mut script = self.script.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(result) = script.pop_front() {
            let mut last = self.last.lock().unwrap_or_else(|p| p.into_inner());
            *last = Some(result.clone());
            return result;
        }
        let last = self.last.lock().unwrap_or_else(|p| p.into_inner());
        match last.as_ref() {
            Some(result) => result.clone(),
            None => Err(LlmError::Backend("mock script is empty".to_string())),
        }
    }
}

#[async_trait]
impl LlmRuntime for MockRuntime {
    fn id(&self) -> &str {
        "mock"
    }

    async fn generate(&self, _input: LlmInput) -> Result<LlmOutput, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let text = self.next()?;
        Ok(LlmOutput {
            text,
            finish_reason: FinishReason::Stop,
            usage: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replays_script_then_repeats_last() {
        let mock = MockRuntime::script(vec![Ok("one".to_string()), Ok("two".to_string())]);
        assert_eq!(mock.generate(LlmInput::new("x")).await.unwrap().text, "one");
        assert_eq!(mock.generate(LlmInput::new("x")).await.unwrap().text, "two");
        assert_eq!(mock.generate(LlmInput::new("x")).await.unwrap().text, "two");
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn unreachable_always_fails() {
        let mock = MockRuntime::unreachable();
        assert!(mock.generate(LlmInput::new("x")).await.is_err());
        assert!(mock.generate(LlmInput::new("x")).await.is_err());
    }
}
