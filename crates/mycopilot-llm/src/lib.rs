//! LLM backends for MycoPilot.
//!
//! Provides concrete [`mycopilot_core::LlmRuntime`] implementations: an
//! OpenAI-compatible HTTP backend for the reasoning service, and a
//! scripted mock used throughout the test suites.

pub mod backends;

pub use backends::mock::MockRuntime;
pub use backends::openai::{OpenAiConfig, OpenAiRuntime};
