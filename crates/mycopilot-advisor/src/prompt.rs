//! Prompt composition.
//!
//! Renders the extracted room state and retrieved analogs into the
//! message pair sent to the reasoning service. The composer sits behind
//! a trait so deployments can swap in their own templating without
//! touching the pipeline; the orchestrator only consumes the output
//! contract.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::{DateTime, Utc};

use mycopilot_core::llm::Message;
use mycopilot_core::record::{DeviceChangeEvent, EnvDailyStat, VisualStateRecord};

use crate::similarity::SimilarCase;

/// Everything the composer may draw on for one invocation.
pub struct PromptContext<'a> {
    pub room_id: &'a str,
    pub analysis_time: DateTime<Utc>,
    /// Most recent visual state, when one was found.
    pub current: Option<&'a VisualStateRecord>,
    pub env_stats: &'a [EnvDailyStat],
    pub device_changes: &'a [DeviceChangeEvent],
    pub analogs: &'a [SimilarCase],
    /// Device type -> controllable point aliases, from the capability
    /// manifest, so the model only proposes points that exist.
    pub device_points: &'a BTreeMap<String, Vec<String>>,
}

/// Composed prompt handed to the reasoning client.
#[derive(Debug, Clone)]
pub struct ComposedPrompt {
    pub messages: Vec<Message>,
    pub analog_count: usize,
}

/// Prompt composition seam.
pub trait ComposePrompt: Send + Sync {
    fn compose(&self, context: &PromptContext<'_>) -> ComposedPrompt;
}

const SYSTEM_PROMPT: &str = "You are an environmental-control advisor for indoor \
mushroom-cultivation rooms. Given the room's current state, recent telemetry \
trends, and historically similar situations, propose setpoint adjustments for \
the controllable devices listed. Respond ONLY with a single JSON object of the \
form:\n\
{\n\
  \"strategy\": {\"objective\": \"...\", \"priorities\": [\"...\"], \"risk_points\": [\"...\"]},\n\
  \"device_recommendations\": {\n\
    \"<device_type>\": {\"device_alias\": \"...\", \"points\": {\n\
      \"<point_alias>\": {\"current\": <value|null>, \"recommended\": <value>, \"action\": \"...\", \"rationale\": \"...\"}\n\
    }}\n\
  },\n\
  \"monitoring\": {\"windows\": [{\"period\": \"...\", \"thresholds\": [\"...\"], \"emergency_measures\": [\"...\"]}]}\n\
}\n\
Only reference the device types and point aliases provided. Be conservative: \
prefer holding values over large swings.";

/// Default composer: plain-text sections in a fixed order.
#[derive(Debug, Default)]
pub struct DefaultComposer;

impl DefaultComposer {
    fn render_current(out: &mut String, context: &PromptContext<'_>) {
        match context.current {
            Some(record) => {
                let _ = writeln!(
                    out,
                    "## Current state (room {}, growth day {})",
                    record.room_id, record.growth_day
                );
                let _ = writeln!(out, "- collected: {}", record.collection_time);
                if let Some(t) = record.env.temperature {
                    let _ = writeln!(out, "- temperature: {:.1} C", t);
                }
                if let Some(h) = record.env.humidity {
                    let _ = writeln!(out, "- humidity: {:.1} %", h);
                }
                if let Some(c) = record.env.co2 {
                    let _ = writeln!(out, "- co2: {:.0} ppm", c);
                }
                if let Some(description) = &record.description {
                    let _ = writeln!(out, "- observed: {}", description);
                }
                if !record.device_configs.is_empty() {
                    let _ = writeln!(out, "- device setpoints:");
                    for (device_type, value) in &record.device_configs {
                        let _ = writeln!(out, "  - {}: {}", device_type, value);
                    }
                }
            }
            None => {
                let _ = writeln!(
                    out,
                    "## Current state (room {})\nNo recent visual state was found; \
                     rely on telemetry trends and analogs.",
                    context.room_id
                );
            }
        }
    }

    fn render_trends(out: &mut String, stats: &[EnvDailyStat]) {
        if stats.is_empty() {
            return;
        }
        let _ = writeln!(out, "\n## Daily telemetry");
        for stat in stats {
            let _ = write!(out, "- {}", stat.stat_date);
            if stat.fruiting {
                let _ = write!(out, " (fruiting)");
            }
            for (name, metric) in stat.metrics() {
                let Some(metric) = metric else { continue };
                let Some(median) = metric.median else { continue };
                let _ = write!(out, " {} median {:.1}", name, median);
                if let Some(trend) = stat.trends.get(name) {
                    let _ = write!(out, " ({} {:+.1}%)", trend.direction, trend.change_pct);
                }
            }
            let _ = writeln!(out);
        }
    }

    fn render_changes(out: &mut String, changes: &[DeviceChangeEvent]) {
        if changes.is_empty() {
            return;
        }
        let _ = writeln!(out, "\n## Recent device changes (newest first)");
        for change in changes {
            let _ = writeln!(
                out,
                "- {} {}/{} {}: {} -> {} ({})",
                change.change_time.format("%m-%d %H:%M"),
                change.device_type,
                change.device_alias,
                change.point,
                change.previous_value,
                change.current_value,
                change.change_type
            );
        }
    }

    fn render_analogs(out: &mut String, analogs: &[SimilarCase]) {
        if analogs.is_empty() {
            let _ = writeln!(out, "\n## Historical analogs\nNone retrieved.");
            return;
        }
        let _ = writeln!(out, "\n## Historical analogs (most similar first)");
        for case in analogs {
            let _ = write!(
                out,
                "- {} growth day {}, similarity {:.2} ({} confidence)",
                case.collection_time.format("%Y-%m-%d"),
                case.growth_day,
                case.similarity,
                case.confidence
            );
            if let Some(t) = case.temperature {
                let _ = write!(out, ", temp {:.1}", t);
            }
            if let Some(h) = case.humidity {
                let _ = write!(out, ", humidity {:.1}", h);
            }
            if let Some(c) = case.co2 {
                let _ = write!(out, ", co2 {:.0}", c);
            }
            let _ = writeln!(out);
            for (device_type, params) in &case.device_params {
                let _ = writeln!(out, "  - {}: {}", device_type, params);
            }
        }
    }

    fn render_devices(out: &mut String, device_points: &BTreeMap<String, Vec<String>>) {
        let _ = writeln!(out, "\n## Controllable devices");
        for (device_type, points) in device_points {
            let _ = writeln!(out, "- {}: {}", device_type, points.join(", "));
        }
    }
}

impl ComposePrompt for DefaultComposer {
    fn compose(&self, context: &PromptContext<'_>) -> ComposedPrompt {
        let mut body = String::new();
        let _ = writeln!(
            body,
            "Analysis for room {} at {}.",
            context.room_id, context.analysis_time
        );
        Self::render_current(&mut body, context);
        Self::render_trends(&mut body, context.env_stats);
        Self::render_changes(&mut body, context.device_changes);
        Self::render_analogs(&mut body, context.analogs);
        Self::render_devices(&mut body, context.device_points);

        ComposedPrompt {
            messages: vec![Message::system(SYSTEM_PROMPT), Message::user(body)],
            analog_count: context.analogs.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::similarity::ConfidenceTier;
    use chrono::TimeZone;
    use std::collections::HashMap;

    #[test]
    fn compose_includes_every_section() {
        let analogs = vec![SimilarCase {
            similarity: 72.5,
            confidence: ConfidenceTier::High,
            room_id: "611".to_string(),
            growth_day: 8,
            collection_time: Utc.with_ymd_and_hms(2025, 2, 20, 8, 0, 0).unwrap(),
            temperature: Some(18.2),
            humidity: Some(88.0),
            co2: Some(950.0),
            device_params: HashMap::from([(
                "humidifier".to_string(),
                serde_json::json!({"target_humidity": 90}),
            )]),
        }];
        let device_points = BTreeMap::from([
            ("heater".to_string(), vec!["target_temperature".to_string()]),
            ("humidifier".to_string(), vec!["target_humidity".to_string()]),
        ]);
        let context = PromptContext {
            room_id: "611",
            analysis_time: Utc.with_ymd_and_hms(2025, 3, 10, 8, 0, 0).unwrap(),
            current: None,
            env_stats: &[],
            device_changes: &[],
            analogs: &analogs,
            device_points: &device_points,
        };

        let prompt = DefaultComposer.compose(&context);
        assert_eq!(prompt.messages.len(), 2);
        assert_eq!(prompt.analog_count, 1);

        let body = &prompt.messages[1].content;
        assert!(body.contains("room 611"));
        assert!(body.contains("Historical analogs"));
        assert!(body.contains("similarity 72.50"));
        assert!(body.contains("heater: target_temperature"));
        assert!(prompt.messages[0].content.contains("device_recommendations"));
    }

    #[test]
    fn missing_current_state_is_stated_not_omitted() {
        let device_points = BTreeMap::new();
        let context = PromptContext {
            room_id: "611",
            analysis_time: Utc.with_ymd_and_hms(2025, 3, 10, 8, 0, 0).unwrap(),
            current: None,
            env_stats: &[],
            device_changes: &[],
            analogs: &[],
            device_points: &device_points,
        };
        let prompt = DefaultComposer.compose(&context);
        assert!(prompt.messages[1]
            .content
            .contains("No recent visual state was found"));
    }
}
