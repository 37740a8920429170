//! Advisor configuration.
//!
//! All tunable values are assembled into one immutable [`AdvisorConfig`]
//! at startup and passed by reference into each component's constructor.
//! Nothing in the pipeline reads configuration from globals.

use std::time::Duration;

/// Plausible-bound constants for environmental readings.
///
/// Values outside these ranges are reported as warnings, never errors:
/// sensors glitch, and the pipeline must keep producing output.
pub mod bounds {
    /// Room temperature in degrees Celsius.
    pub const TEMPERATURE: (f64, f64) = (0.0, 40.0);
    /// Relative humidity in percent.
    pub const HUMIDITY: (f64, f64) = (0.0, 100.0);
    /// CO2 concentration in ppm.
    pub const CO2: (f64, f64) = (0.0, 5000.0);
}

/// Environment variable names for deployment-time overrides.
pub mod env_vars {
    pub const REASONING_ENDPOINT: &str = "MYCOPILOT_REASONING_ENDPOINT";
    pub const REASONING_API_KEY: &str = "MYCOPILOT_REASONING_API_KEY";
    pub const REASONING_MODEL: &str = "MYCOPILOT_REASONING_MODEL";
    pub const REASONING_TIMEOUT_SECS: &str = "MYCOPILOT_REASONING_TIMEOUT_SECS";
    pub const SIMILARITY_TOP_K: &str = "MYCOPILOT_SIMILARITY_TOP_K";
}

/// Similarity retrieval settings.
#[derive(Debug, Clone)]
pub struct SimilarityConfig {
    /// Maximum number of historical analogs to retrieve.
    pub top_k: usize,
    /// Date window around the target time, in days (both directions).
    pub date_window_days: i64,
    /// Growth-day window around the current growth day (both directions).
    pub growth_day_window: i32,
    /// Expected embedding dimension; inserts and queries with a different
    /// dimension are rejected by the store.
    pub embedding_dim: usize,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            date_window_days: 30,
            growth_day_window: 3,
            embedding_dim: 512,
        }
    }
}

/// Reasoning-service call settings.
#[derive(Debug, Clone)]
pub struct ReasoningConfig {
    /// OpenAI-compatible chat-completions endpoint.
    pub endpoint: String,
    /// Optional bearer API key.
    pub api_key: Option<String>,
    /// Model identifier sent with each request.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Maximum tokens to generate.
    pub max_tokens: usize,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Retry attempts after the first failure.
    pub max_retries: usize,
    /// Base backoff between retries in milliseconds (doubled per attempt).
    pub retry_base_ms: u64,
}

impl ReasoningConfig {
    /// Get the request timeout as a Duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Apply environment-variable overrides on top of the current values.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var(env_vars::REASONING_ENDPOINT) {
            self.endpoint = v;
        }
        if let Ok(v) = std::env::var(env_vars::REASONING_API_KEY) {
            self.api_key = Some(v);
        }
        if let Ok(v) = std::env::var(env_vars::REASONING_MODEL) {
            self.model = v;
        }
        if let Ok(v) = std::env::var(env_vars::REASONING_TIMEOUT_SECS) {
            if let Ok(secs) = v.parse() {
                self.timeout_secs = secs;
            }
        }
        self
    }
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434/v1".to_string(),
            api_key: None,
            model: "qwen2.5:7b".to_string(),
            temperature: 0.2,
            max_tokens: 2048,
            timeout_secs: 30,
            max_retries: 2,
            retry_base_ms: 500,
        }
    }
}

/// State-extraction settings.
#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    /// Window (days, both directions) for locating the current visual state.
    pub time_window_days: i64,
    /// Growth-day window applied when the caller pins a growth day.
    pub growth_day_window: i32,
    /// Days of daily statistics pulled around the target date.
    pub stat_days_range: i64,
    /// Lookback window for recent device changes, in hours.
    pub change_lookback_hours: i64,
    /// Percentage change below which a day-over-day trend counts as stable.
    pub stability_epsilon_pct: f64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            time_window_days: 1,
            growth_day_window: 3,
            stat_days_range: 3,
            change_lookback_hours: 48,
            stability_epsilon_pct: 1.0,
        }
    }
}

/// Immutable advisor configuration, assembled once at startup.
#[derive(Debug, Clone, Default)]
pub struct AdvisorConfig {
    pub similarity: SimilarityConfig,
    pub reasoning: ReasoningConfig,
    pub extraction: ExtractionConfig,
}

impl AdvisorConfig {
    /// Build the default configuration with environment overrides applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.reasoning = config.reasoning.with_env_overrides();
        if let Ok(v) = std::env::var(env_vars::SIMILARITY_TOP_K) {
            if let Ok(top_k) = v.parse() {
                config.similarity.top_k = top_k;
            }
        }
        config
    }
}
