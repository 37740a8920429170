//! The MycoPilot decision pipeline.
//!
//! Combines a room's image-derived state, similarity-retrieved historical
//! analogs, environmental telemetry trends, and an external reasoning call
//! into an advisory [`DecisionOutput`], filtered against the room's real
//! controllable device points.
//!
//! The pipeline runs six stages in one pass:
//!
//! 1. **Extract**: current visual state, daily stats with trends, recent
//!    device changes ([`StateExtractor`])
//! 2. **Match**: top-K historical analogs by embedding distance
//!    ([`SimilarityMatcher`])
//! 3. **Compose**: structured prompt from state + analogs
//!    ([`prompt::ComposePrompt`])
//! 4. **Reason**: external LLM call with robust response parsing and a
//!    conservative fallback ([`ReasoningClient`])
//! 5. **Adapt**: filter proposals against the capability manifest
//!    ([`CapabilityAdapter`])
//! 6. **Finalize**: assemble a structurally complete result with stage
//!    timings and deduplicated warnings ([`DecisionOrchestrator`])
//!
//! Extraction and matching failures degrade to empty inputs; only a
//! missing capability manifest for the room aborts with `status=error`.

pub mod capability;
pub mod decision;
pub mod error;
pub mod orchestrator;
pub mod prompt;
pub mod reasoning;
pub mod similarity;
pub mod state;

pub use capability::{CapabilityAdapter, CapabilityManifest, LoadedManifest};
pub use decision::{
    DecisionMetadata, DecisionOutput, DecisionStatus, DeviceRecommendation, MonitoringPlan,
    MonitoringWindow, PointAdjustment, StageTiming, Strategy,
};
pub use error::{AdvisorError, ReasoningFailure, Result};
pub use orchestrator::DecisionOrchestrator;
pub use prompt::{ComposePrompt, ComposedPrompt, DefaultComposer, PromptContext};
pub use reasoning::{ReasonedDecision, ReasoningClient};
pub use similarity::{ConfidenceTier, MatchResult, SimilarCase, SimilarityMatcher};
pub use state::StateExtractor;
