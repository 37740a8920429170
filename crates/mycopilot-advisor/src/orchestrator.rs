//! Pipeline orchestration.
//!
//! Runs the six stages in a single pass per invocation. Extraction and
//! matching failures degrade to empty inputs; reasoning failures land in
//! the fallback decision; only a room without a capability manifest
//! aborts. Whatever happens, `analyze` returns a structurally complete
//! [`DecisionOutput`]; no error type crosses this boundary.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use mycopilot_core::config::AdvisorConfig;
use mycopilot_core::llm::LlmRuntime;
use mycopilot_core::store::{DeviceChangeQuery, EnvStatQuery, VisionQuery};

use crate::capability::{CapabilityAdapter, LoadedManifest};
use crate::decision::{
    dedup_preserving, DecisionMetadata, DecisionOutput, DecisionStatus, StageTiming,
};
use crate::prompt::{ComposePrompt, DefaultComposer, PromptContext};
use crate::reasoning::ReasoningClient;
use crate::similarity::SimilarityMatcher;
use crate::state::StateExtractor;

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Init,
    Extract,
    Match,
    Compose,
    Reason,
    Adapt,
    Finalize,
    FinalizeWithErrors,
}

impl Stage {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Extract => "extract",
            Self::Match => "match",
            Self::Compose => "compose",
            Self::Reason => "reason",
            Self::Adapt => "adapt",
            Self::Finalize => "finalize",
            Self::FinalizeWithErrors => "finalize_with_errors",
        }
    }
}

struct StageClock {
    timings: Vec<StageTiming>,
}

impl StageClock {
    fn new() -> Self {
        Self { timings: Vec::new() }
    }

    fn time<T>(&mut self, stage: Stage, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let result = f();
        self.record(stage, start);
        result
    }

    fn record(&mut self, stage: Stage, start: Instant) {
        self.timings.push(StageTiming {
            stage: stage.as_str().to_string(),
            elapsed_ms: start.elapsed().as_millis() as u64,
        });
    }
}

/// Sequences the decision pipeline for one room per invocation.
///
/// Constructed once and reused across scheduler ticks; the only state
/// shared between concurrent invocations is the read-only manifest.
pub struct DecisionOrchestrator {
    extractor: StateExtractor,
    matcher: SimilarityMatcher,
    composer: Arc<dyn ComposePrompt>,
    reasoner: ReasoningClient,
    manifest: Arc<LoadedManifest>,
}

impl DecisionOrchestrator {
    pub fn new(
        vision: Arc<dyn VisionQuery>,
        env_stats: Arc<dyn EnvStatQuery>,
        device_changes: Arc<dyn DeviceChangeQuery>,
        runtime: Arc<dyn LlmRuntime>,
        manifest: Arc<LoadedManifest>,
        config: &AdvisorConfig,
    ) -> Self {
        Self {
            extractor: StateExtractor::new(
                vision.clone(),
                env_stats,
                device_changes,
                config.extraction.clone(),
            ),
            matcher: SimilarityMatcher::new(vision, config.similarity.clone()),
            composer: Arc::new(DefaultComposer),
            reasoner: ReasoningClient::new(runtime, config.reasoning.clone()),
            manifest,
        }
    }

    /// Swap in a custom prompt composer.
    pub fn with_composer(mut self, composer: Arc<dyn ComposePrompt>) -> Self {
        self.composer = composer;
        self
    }

    /// Run the full pipeline for one room.
    ///
    /// Always returns a structurally complete output with status
    /// Success or Error; warnings and errors accumulate in metadata.
    pub async fn analyze(&self, room_id: &str, analysis_time: DateTime<Utc>) -> DecisionOutput {
        let mut clock = StageClock::new();
        let mut warnings: Vec<String> = Vec::new();
        let mut errors: Vec<String> = Vec::new();

        tracing::info!(room_id, %analysis_time, "Decision analysis started");

        // INIT: resolve the room's capability manifest. The one fatal path.
        let init_start = Instant::now();
        let adapter = match CapabilityAdapter::for_room(&self.manifest, room_id) {
            Ok(adapter) => {
                clock.record(Stage::Init, init_start);
                adapter
            }
            Err(e) => {
                clock.record(Stage::Init, init_start);
                tracing::error!(room_id, error = %e, "Decision analysis aborted");
                errors.push(e.to_string());
                return self.finalize_fatal(room_id, clock, warnings, errors);
            }
        };

        // EXTRACT: visual state, daily stats with trends, device changes.
        let extract_start = Instant::now();
        let extraction = self.extractor.config().clone();

        let current_records = match self
            .extractor
            .extract_current_state(
                room_id,
                analysis_time,
                extraction.time_window_days,
                extraction.growth_day_window,
            )
            .await
        {
            Ok(records) => records,
            Err(e) => {
                warnings.push(format!("Visual-state extraction failed: {}", e));
                Vec::new()
            }
        };

        let env_stats = match self
            .extractor
            .extract_env_daily_stats(
                room_id,
                analysis_time.date_naive(),
                extraction.stat_days_range,
            )
            .await
        {
            Ok(stats) => stats,
            Err(e) => {
                warnings.push(format!("Daily-stat extraction failed: {}", e));
                Vec::new()
            }
        };

        let change_start = analysis_time - Duration::hours(extraction.change_lookback_hours);
        let device_changes = match self
            .extractor
            .extract_device_changes(room_id, change_start, analysis_time, None)
            .await
        {
            Ok(changes) => changes,
            Err(e) => {
                warnings.push(format!("Device-change extraction failed: {}", e));
                Vec::new()
            }
        };

        warnings.extend(StateExtractor::validate_env_params(&current_records));
        let current = current_records.first().cloned();
        clock.record(Stage::Extract, extract_start);

        // MATCH: historical analogs for the newest visual state.
        let match_start = Instant::now();
        let matched = match &current {
            Some(record) => {
                self.matcher
                    .find_similar(room_id, &record.embedding, analysis_time, record.growth_day)
                    .await
            }
            None => {
                warnings.push("No current visual state; analog retrieval skipped".to_string());
                Default::default()
            }
        };
        warnings.extend(matched.warnings);
        let analogs = matched.cases;
        let analog_count = analogs.len();
        let avg_similarity = if analog_count > 0 {
            let total: f64 = analogs.iter().map(|c| c.similarity).sum();
            Some((total / analog_count as f64 * 100.0).round() / 100.0)
        } else {
            None
        };
        clock.record(Stage::Match, match_start);

        // COMPOSE
        let device_points = adapter.device_points();
        let prompt = clock.time(Stage::Compose, || {
            self.composer.compose(&PromptContext {
                room_id,
                analysis_time,
                current: current.as_ref(),
                env_stats: &env_stats,
                device_changes: &device_changes,
                analogs: &analogs,
                device_points: &device_points,
            })
        });

        // REASON
        let reason_start = Instant::now();
        let draft = self.reasoner.reason(&prompt).await;
        if let Some(failure) = &draft.failure {
            errors.push(failure.to_string());
        }
        let fallback = draft.status == DecisionStatus::Fallback;
        clock.record(Stage::Reason, reason_start);

        // ADAPT
        let adapt_start = Instant::now();
        let (device_recommendations, adapt_warnings) = adapter.adapt_decision_output(&draft);
        let capability_warning_count = adapt_warnings.len();
        warnings.extend(adapt_warnings);
        clock.record(Stage::Adapt, adapt_start);

        // FINALIZE
        let finalize_start = Instant::now();
        let mut sources = Vec::new();
        if current.is_some() {
            sources.push("visual_state".to_string());
        }
        if !env_stats.is_empty() {
            sources.push("env_daily_stats".to_string());
        }
        if !device_changes.is_empty() {
            sources.push("device_changes".to_string());
        }
        if analog_count > 0 {
            sources.push("analogs".to_string());
        }
        sources.push(if fallback {
            "fallback".to_string()
        } else {
            "reasoning".to_string()
        });

        let mut output = DecisionOutput {
            decision_id: Uuid::new_v4(),
            room_id: room_id.to_string(),
            generated_at: Utc::now(),
            status: DecisionStatus::Success,
            strategy: draft.strategy,
            device_recommendations,
            monitoring: draft.monitoring,
            metadata: DecisionMetadata {
                sources,
                analog_count,
                avg_similarity,
                stage_timings: Vec::new(),
                warnings: dedup_preserving(warnings),
                errors: dedup_preserving(errors),
                fallback,
                config_source: Some(adapter.config_source().to_string()),
                supported_device_types: adapter.supported_device_types(),
                capability_warning_count,
            },
        };
        clock.record(Stage::Finalize, finalize_start);
        output.metadata.stage_timings = clock.timings;

        tracing::info!(
            room_id,
            fallback,
            analogs = analog_count,
            warnings = output.metadata.warnings.len(),
            "Decision analysis complete"
        );
        output
    }

    fn finalize_fatal(
        &self,
        room_id: &str,
        mut clock: StageClock,
        warnings: Vec<String>,
        errors: Vec<String>,
    ) -> DecisionOutput {
        let finalize_start = Instant::now();
        let mut output = DecisionOutput::empty(room_id, DecisionStatus::Error);
        output.metadata.warnings = dedup_preserving(warnings);
        output.metadata.errors = dedup_preserving(errors);
        clock.record(Stage::FinalizeWithErrors, finalize_start);
        output.metadata.stage_timings = clock.timings;
        output
    }
}
