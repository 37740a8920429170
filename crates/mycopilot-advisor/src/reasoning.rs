//! Reasoning call and response parsing.
//!
//! Submits the composed prompt to the reasoning service and extracts a
//! decision draft from whatever shape the model answered in. Parsing is
//! attempted in three stages: the whole body as JSON, a fenced code
//! block, then the first balanced object span inside prose. When all
//! three fail, or the call itself fails, the client returns the
//! statically defined conservative fallback instead of an error, so the
//! pipeline always has a structurally complete draft to adapt.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;

use mycopilot_core::config::ReasoningConfig;
use mycopilot_core::llm::{GenerationParams, LlmInput, LlmRuntime};
use mycopilot_llm::{OpenAiConfig, OpenAiRuntime};

use crate::decision::{
    DecisionStatus, DeviceRecommendation, MonitoringPlan, MonitoringWindow, Strategy,
};
use crate::error::{AdvisorError, ReasoningFailure};
use crate::prompt::ComposedPrompt;

/// A decision draft as produced by reasoning (or its fallback).
///
/// Tagged with an explicit status discriminant so downstream stages
/// pattern-match instead of probing for keys.
#[derive(Debug, Clone)]
pub struct ReasonedDecision {
    /// Success for a parsed model answer, Fallback otherwise.
    pub status: DecisionStatus,
    pub strategy: Strategy,
    pub device_recommendations: BTreeMap<String, DeviceRecommendation>,
    pub monitoring: MonitoringPlan,
    /// Why the fallback was taken, when it was.
    pub error_reason: Option<String>,
    /// The recorded failure category, when the fallback was taken.
    pub failure: Option<ReasoningFailure>,
}

/// Wire shape of the model's answer. Every field is defaulted so a
/// partially filled answer still yields a usable draft.
#[derive(Debug, Default, Deserialize)]
struct RawDecision {
    #[serde(default)]
    strategy: Strategy,
    #[serde(default)]
    device_recommendations: BTreeMap<String, DeviceRecommendation>,
    #[serde(default)]
    monitoring: MonitoringPlan,
}

impl ReasonedDecision {
    /// Parse a decision draft out of free-form model output.
    pub fn parse(text: &str) -> Result<Self, String> {
        let value = extract_decision_value(text)
            .ok_or_else(|| "no JSON object found in response".to_string())?;

        // An arbitrary JSON object is not a decision; require at least one
        // of the top-level decision keys before accepting it.
        let recognized = value.get("strategy").is_some()
            || value.get("device_recommendations").is_some()
            || value.get("monitoring").is_some();
        if !recognized {
            return Err("JSON object is not a decision document".to_string());
        }

        let raw: RawDecision =
            serde_json::from_value(value).map_err(|e| format!("decision shape invalid: {}", e))?;
        Ok(Self {
            status: DecisionStatus::Success,
            strategy: raw.strategy,
            device_recommendations: raw.device_recommendations,
            monitoring: raw.monitoring,
            error_reason: None,
            failure: None,
        })
    }

    /// The statically defined conservative decision.
    ///
    /// Used whenever reasoning cannot produce or validate a real one;
    /// recommendations stay empty here and the capability adapter fills
    /// in a hold-current-values entry per device type.
    pub fn fallback(failure: ReasoningFailure) -> Self {
        Self {
            status: DecisionStatus::Fallback,
            strategy: Strategy {
                objective: "Maintain current environmental values".to_string(),
                priorities: vec![
                    "Hold all setpoints at their current values".to_string(),
                    "Verify sensor readings before manual changes".to_string(),
                    "Re-run the analysis once the reasoning service recovers".to_string(),
                ],
                risk_points: vec![
                    "Automated reasoning was unavailable; these are conservative defaults"
                        .to_string(),
                ],
            },
            device_recommendations: BTreeMap::new(),
            monitoring: MonitoringPlan {
                windows: vec![MonitoringWindow {
                    period: "next 12 hours".to_string(),
                    thresholds: vec![
                        "temperature within 0-40 C".to_string(),
                        "humidity within 0-100 %".to_string(),
                        "co2 below 5000 ppm".to_string(),
                    ],
                    emergency_measures: vec![
                        "Ventilate and alert the grower on sustained out-of-band readings"
                            .to_string(),
                    ],
                }],
            },
            error_reason: Some(failure.to_string()),
            failure: Some(failure),
        }
    }
}

/// Try the three extraction stages in order.
fn extract_decision_value(text: &str) -> Option<serde_json::Value> {
    let trimmed = text.trim();

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if value.is_object() {
            return Some(value);
        }
    }

    if let Some(inner) = fenced_block(trimmed) {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(&inner) {
            if value.is_object() {
                return Some(value);
            }
        }
    }

    if let Some(span) = first_balanced_object(trimmed) {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(span) {
            if value.is_object() {
                return Some(value);
            }
        }
    }

    None
}

/// Contents of the first markdown code fence, language tag stripped.
fn fenced_block(text: &str) -> Option<String> {
    let open = text.find("```")?;
    let after_open = &text[open + 3..];
    let close = after_open.find("```")?;
    let mut body = &after_open[..close];
    // First line may be a language tag like "json".
    if let Some(newline) = body.find('\n') {
        let tag = body[..newline].trim();
        if !tag.is_empty() && tag.chars().all(|c| c.is_ascii_alphanumeric()) {
            body = &body[newline + 1..];
        }
    }
    let body = body.trim();
    if body.is_empty() {
        None
    } else {
        Some(body.to_string())
    }
}

/// The first balanced `{...}` span, honoring JSON string escapes.
fn first_balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &byte) in bytes[start..].iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match byte {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Calls the reasoning service and always returns a usable draft.
pub struct ReasoningClient {
    runtime: Arc<dyn LlmRuntime>,
    config: ReasoningConfig,
}

impl ReasoningClient {
    pub fn new(runtime: Arc<dyn LlmRuntime>, config: ReasoningConfig) -> Self {
        Self { runtime, config }
    }

    /// Wire up the OpenAI-compatible backend from configuration.
    pub fn from_config(config: &ReasoningConfig) -> Result<Self, AdvisorError> {
        let runtime = OpenAiRuntime::new(OpenAiConfig::from(config))
            .map_err(|e| AdvisorError::BackendSetup(e.to_string()))?;
        Ok(Self::new(Arc::new(runtime), config.clone()))
    }

    /// Submit the prompt and extract a decision draft.
    ///
    /// Never fails: every failure category funnels into the fallback
    /// decision, tagged with its cause.
    pub async fn reason(&self, prompt: &ComposedPrompt) -> ReasonedDecision {
        let params = GenerationParams {
            temperature: Some(self.config.temperature),
            max_tokens: Some(self.config.max_tokens),
            ..Default::default()
        };
        let input = LlmInput::from_messages(prompt.messages.clone())
            .with_params(params)
            .with_model(self.config.model.clone());

        let output = match self.runtime.generate(input).await {
            Ok(output) => output,
            Err(e) => {
                let failure = ReasoningFailure::from(&e);
                tracing::warn!(backend = self.runtime.id(), error = %e, "Reasoning call failed, using fallback");
                return ReasonedDecision::fallback(failure);
            }
        };

        match ReasonedDecision::parse(&output.text) {
            Ok(decision) => decision,
            Err(reason) => {
                tracing::warn!(%reason, "Reasoning response unparseable, using fallback");
                ReasonedDecision::fallback(ReasoningFailure::MalformedResponse(reason))
            }
        }
    }
}
