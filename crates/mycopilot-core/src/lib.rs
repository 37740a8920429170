//! Core traits and types for MycoPilot.
//!
//! This crate defines the foundational abstractions shared across the
//! workspace: the immutable advisor configuration, the cultivation-room
//! data model, the LLM runtime abstraction, and the store query traits
//! the decision pipeline is built against.

pub mod config;
pub mod error;
pub mod llm;
pub mod record;
pub mod store;

pub use error::{Error, Result};
pub use llm::{
    FinishReason, GenerationParams, LlmError, LlmInput, LlmOutput, LlmRuntime, Message,
    MessageRole, TokenUsage,
};
pub use record::{
    DeviceChangeEvent, EnvDailyStat, EnvSnapshot, MetricStat, Trend, TrendDirection,
    VisualStateRecord,
};
pub use store::{DeviceChangeQuery, EnvStatQuery, ScoredRecord, StoreError, VisionQuery};

/// Re-exports commonly used types.
pub mod prelude {
    pub use crate::config::{AdvisorConfig, ExtractionConfig, ReasoningConfig, SimilarityConfig};
    pub use crate::error::{Error, Result};
    pub use crate::llm::{GenerationParams, LlmError, LlmInput, LlmRuntime, Message, MessageRole};
    pub use crate::record::{
        DeviceChangeEvent, EnvDailyStat, EnvSnapshot, MetricStat, Trend, TrendDirection,
        VisualStateRecord,
    };
    pub use crate::store::{DeviceChangeQuery, EnvStatQuery, ScoredRecord, VisionQuery};
}
