//! Cultivation-room data model.
//!
//! These records are read-only inputs to the decision pipeline. They are
//! written by upstream collaborators (image-embedding writer, telemetry
//! aggregation) and never mutated here.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Embedding vector summarizing a room image.
pub type Embedding = Vec<f32>;

/// Environmental readings captured alongside a visual state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvSnapshot {
    /// Room temperature in degrees Celsius.
    pub temperature: Option<f64>,
    /// Relative humidity in percent.
    pub humidity: Option<f64>,
    /// CO2 concentration in ppm.
    pub co2: Option<f64>,
}

/// A room's image-derived state at one collection time.
///
/// Appended by the upstream embedding writer, keyed by
/// `(room_id, collection_time)`, and immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisualStateRecord {
    /// Room identifier.
    pub room_id: String,
    /// When the image was collected.
    pub collection_time: DateTime<Utc>,
    /// Date the cultivation batch entered the room.
    pub in_date: NaiveDate,
    /// Days since batch entry, aligning comparable life-cycle stages.
    pub growth_day: i32,
    /// Fixed-dimension image embedding.
    pub embedding: Embedding,
    /// Environmental readings at collection time.
    #[serde(default)]
    pub env: EnvSnapshot,
    /// Per-device-type setpoint snapshots at collection time.
    #[serde(default)]
    pub device_configs: HashMap<String, serde_json::Value>,
    /// Free-text description of the observed state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl VisualStateRecord {
    /// Storage key, unique per room and collection time.
    pub fn key(&self) -> String {
        format!("{}/{}", self.room_id, self.collection_time.timestamp_millis())
    }

    /// Get the embedding dimension.
    pub fn dimension(&self) -> usize {
        self.embedding.len()
    }
}

/// Aggregated statistics for one metric on one day.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricStat {
    pub median: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub q25: Option<f64>,
    pub q75: Option<f64>,
    /// Number of samples aggregated into this stat.
    pub samples: u32,
}

/// Day-over-day trend direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Rising,
    Falling,
    Stable,
}

impl std::fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rising => write!(f, "rising"),
            Self::Falling => write!(f, "falling"),
            Self::Stable => write!(f, "stable"),
        }
    }
}

/// Computed trend of a metric versus the previous day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trend {
    pub direction: TrendDirection,
    /// Percentage change of the median versus the previous day.
    pub change_pct: f64,
}

/// Daily environmental statistics for one room.
///
/// The `trends` map is empty as stored; the state extractor fills it
/// in-process by comparing adjacent days.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvDailyStat {
    pub room_id: String,
    pub stat_date: NaiveDate,
    pub temperature: Option<MetricStat>,
    pub humidity: Option<MetricStat>,
    pub co2: Option<MetricStat>,
    /// Whether the room was in the fruiting growth phase on this day.
    #[serde(default)]
    pub fruiting: bool,
    /// Metric name -> computed trend versus the previous day.
    #[serde(default)]
    pub trends: HashMap<String, Trend>,
}

impl EnvDailyStat {
    /// Iterate the per-metric stats with their canonical names.
    pub fn metrics(&self) -> [(&'static str, Option<&MetricStat>); 3] {
        [
            ("temperature", self.temperature.as_ref()),
            ("humidity", self.humidity.as_ref()),
            ("co2", self.co2.as_ref()),
        ]
    }
}

/// A recorded change to one controllable device point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceChangeEvent {
    pub room_id: String,
    /// Device classification, e.g. "humidifier".
    pub device_type: String,
    /// Human-facing device alias.
    pub device_alias: String,
    /// The point that changed, e.g. "target_humidity".
    pub point: String,
    pub change_time: DateTime<Utc>,
    pub previous_value: serde_json::Value,
    pub current_value: serde_json::Value,
    /// Origin of the change, e.g. "manual" or "schedule".
    pub change_type: String,
}
