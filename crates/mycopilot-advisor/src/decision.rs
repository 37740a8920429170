//! The decision output model.
//!
//! [`DecisionOutput`] is the only entity this pipeline produces. It is
//! created once per invocation, immutable after return, and structurally
//! complete even when every upstream stage failed: callers pattern-match
//! on the `status` discriminant instead of probing for missing keys.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Decision status discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionStatus {
    /// A real or degraded-but-usable decision.
    Success,
    /// The statically defined conservative decision; tags intermediate
    /// reasoning drafts, surfaced to callers via `metadata.fallback`.
    Fallback,
    /// No output could be constructed (missing capability manifest).
    Error,
}

/// Overall strategy proposed for the room.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Strategy {
    /// What the adjustments aim to achieve.
    #[serde(default)]
    pub objective: String,
    /// Priority ranking, most important first.
    #[serde(default)]
    pub priorities: Vec<String>,
    /// Risks to watch while applying the adjustments.
    #[serde(default)]
    pub risk_points: Vec<String>,
}

/// One proposed adjustment for a controllable point.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PointAdjustment {
    /// Current setpoint, when known.
    #[serde(default)]
    pub current: Option<serde_json::Value>,
    /// Proposed setpoint.
    #[serde(default)]
    pub recommended: serde_json::Value,
    /// Whether the proposal differs meaningfully from the current value,
    /// per the point's change rule.
    #[serde(default)]
    pub change_needed: bool,
    /// Short verb for the adjustment, e.g. "raise" or "hold".
    #[serde(default)]
    pub action: String,
    /// Why this adjustment is proposed.
    #[serde(default)]
    pub rationale: String,
}

/// Proposed adjustments for one device type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceRecommendation {
    #[serde(default)]
    pub device_alias: String,
    /// Point alias -> adjustment.
    #[serde(default)]
    pub points: BTreeMap<String, PointAdjustment>,
}

/// One monitoring window with thresholds and emergency measures.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitoringWindow {
    /// Time period to watch, e.g. "next 6 hours".
    #[serde(default)]
    pub period: String,
    #[serde(default)]
    pub thresholds: Vec<String>,
    #[serde(default)]
    pub emergency_measures: Vec<String>,
}

/// Monitoring guidance accompanying the recommendations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitoringPlan {
    #[serde(default)]
    pub windows: Vec<MonitoringWindow>,
}

/// Elapsed time of one pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageTiming {
    pub stage: String,
    pub elapsed_ms: u64,
}

/// Provenance and diagnostics for one decision.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecisionMetadata {
    /// Which inputs actually contributed, e.g. "visual_state", "analogs".
    #[serde(default)]
    pub sources: Vec<String>,
    /// Number of historical analogs retrieved.
    #[serde(default)]
    pub analog_count: usize,
    /// Mean similarity score of the analogs, when any were retrieved.
    #[serde(default)]
    pub avg_similarity: Option<f64>,
    #[serde(default)]
    pub stage_timings: Vec<StageTiming>,
    /// Deduplicated, order-preserving warning log.
    #[serde(default)]
    pub warnings: Vec<String>,
    /// Deduplicated, order-preserving error log.
    #[serde(default)]
    pub errors: Vec<String>,
    /// True when the recommendations came from the fallback decision.
    #[serde(default)]
    pub fallback: bool,
    /// Where the capability manifest was loaded from.
    #[serde(default)]
    pub config_source: Option<String>,
    /// Device types the room's manifest actually exposes.
    #[serde(default)]
    pub supported_device_types: Vec<String>,
    /// Number of proposals dropped or flagged during capability filtering.
    #[serde(default)]
    pub capability_warning_count: usize,
}

/// The advisory produced for one room at one analysis time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionOutput {
    pub decision_id: Uuid,
    pub room_id: String,
    pub generated_at: DateTime<Utc>,
    pub status: DecisionStatus,
    pub strategy: Strategy,
    /// Device type -> recommendation. Contains an entry for every device
    /// type in the room's capability manifest, whatever happened upstream.
    pub device_recommendations: BTreeMap<String, DeviceRecommendation>,
    pub monitoring: MonitoringPlan,
    pub metadata: DecisionMetadata,
}

impl DecisionOutput {
    /// Skeleton output used by the fatal path and as the assembly base.
    pub fn empty(room_id: impl Into<String>, status: DecisionStatus) -> Self {
        Self {
            decision_id: Uuid::new_v4(),
            room_id: room_id.into(),
            generated_at: Utc::now(),
            status,
            strategy: Strategy::default(),
            device_recommendations: BTreeMap::new(),
            monitoring: MonitoringPlan::default(),
            metadata: DecisionMetadata::default(),
        }
    }
}

/// Drop duplicate entries while preserving first-seen order.
pub(crate) fn dedup_preserving(entries: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    entries
        .into_iter()
        .filter(|e| seen.insert(e.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&DecisionStatus::Success).unwrap(),
            "\"success\""
        );
        assert_eq!(
            serde_json::to_string(&DecisionStatus::Fallback).unwrap(),
            "\"fallback\""
        );
        assert_eq!(
            serde_json::to_string(&DecisionStatus::Error).unwrap(),
            "\"error\""
        );
    }

    #[test]
    fn dedup_keeps_first_occurrence_order() {
        let deduped = dedup_preserving(vec![
            "b".to_string(),
            "a".to_string(),
            "b".to_string(),
            "c".to_string(),
            "a".to_string(),
        ]);
        assert_eq!(deduped, vec!["b", "a", "c"]);
    }

    #[test]
    fn output_roundtrips_through_json() {
        let mut output = DecisionOutput::empty("611", DecisionStatus::Success);
        output.device_recommendations.insert(
            "heater".to_string(),
            DeviceRecommendation {
                device_alias: "heater-1".to_string(),
                points: BTreeMap::from([(
                    "target_temperature".to_string(),
                    PointAdjustment {
                        current: Some(serde_json::json!(18.0)),
                        recommended: serde_json::json!(18.5),
                        change_needed: true,
                        action: "raise".to_string(),
                        rationale: "median drifting down".to_string(),
                    },
                )]),
            },
        );

        let json = serde_json::to_string(&output).unwrap();
        let back: DecisionOutput = serde_json::from_str(&json).unwrap();
        assert_eq!(back.room_id, "611");
        assert!(back.device_recommendations.contains_key("heater"));
    }
}
