//! Historical analog retrieval.
//!
//! Finds the K most similar past states of the same room, windowed by
//! date and growth day so only comparable life-cycle stages compete.
//! Each match is denormalized with its environmental and device-config
//! snapshots so later stages never join back into the store.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use mycopilot_core::config::SimilarityConfig;
use mycopilot_core::record::Embedding;
use mycopilot_core::store::VisionQuery;

/// Coarse trust bucket for a retrieved analog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceTier {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for ConfidenceTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// A historically analogous room state, scored and denormalized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarCase {
    /// Similarity score in [0, 100], two decimals.
    pub similarity: f64,
    pub confidence: ConfidenceTier,
    pub room_id: String,
    pub growth_day: i32,
    pub collection_time: DateTime<Utc>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub co2: Option<f64>,
    /// Per-device-type setpoint snapshots at the analog's collection time.
    pub device_params: HashMap<String, serde_json::Value>,
}

/// Retrieval outcome: cases plus any warnings worth surfacing.
#[derive(Debug, Default)]
pub struct MatchResult {
    pub cases: Vec<SimilarCase>,
    pub warnings: Vec<String>,
}

/// Convert an L2 distance over normalized embeddings into a similarity
/// score in [0, 100].
///
/// Squared linear decay: near-duplicates score disproportionately higher
/// than distant matches. The mapping is inherited from the production
/// retrieval pipeline and is deliberately not recalibrated here.
pub fn distance_to_similarity(distance: f64) -> f64 {
    let clamped = distance.clamp(0.0, 2.0);
    let linear = 1.0 - clamped / 2.0;
    let score = 100.0 * linear * linear;
    (score * 100.0).round() / 100.0
}

/// Bucket a similarity score into a confidence tier.
///
/// Medium is the closed interval [20, 60].
pub fn confidence_for(similarity: f64) -> ConfidenceTier {
    if similarity > 60.0 {
        ConfidenceTier::High
    } else if similarity >= 20.0 {
        ConfidenceTier::Medium
    } else {
        ConfidenceTier::Low
    }
}

/// Retrieves and scores historical analogs.
pub struct SimilarityMatcher {
    vision: Arc<dyn VisionQuery>,
    config: SimilarityConfig,
}

impl SimilarityMatcher {
    pub fn new(vision: Arc<dyn VisionQuery>, config: SimilarityConfig) -> Self {
        Self { vision, config }
    }

    /// Find up to `top_k` analogs for the given embedding.
    ///
    /// Retrieval is best-effort: any store failure yields an empty list
    /// plus a warning, never an error.
    pub async fn find_similar(
        &self,
        room_id: &str,
        embedding: &Embedding,
        target_time: DateTime<Utc>,
        growth_day: i32,
    ) -> MatchResult {
        let scored = match self
            .vision
            .nearest_in_window(
                room_id,
                embedding,
                target_time,
                self.config.date_window_days,
                growth_day,
                self.config.growth_day_window,
                self.config.top_k,
            )
            .await
        {
            Ok(scored) => scored,
            Err(e) => {
                tracing::warn!(room_id, error = %e, "Analog retrieval failed");
                return MatchResult {
                    cases: Vec::new(),
                    warnings: vec![format!("Analog retrieval failed: {}", e)],
                };
            }
        };

        let mut result = MatchResult::default();
        let mut low_confidence = 0usize;
        for item in scored {
            let similarity = distance_to_similarity(item.distance as f64);
            let confidence = confidence_for(similarity);
            if confidence == ConfidenceTier::Low {
                low_confidence += 1;
            }
            result.cases.push(SimilarCase {
                similarity,
                confidence,
                room_id: item.record.room_id.clone(),
                growth_day: item.record.growth_day,
                collection_time: item.record.collection_time,
                temperature: item.record.env.temperature,
                humidity: item.record.env.humidity,
                co2: item.record.env.co2,
                device_params: item.record.device_configs.clone(),
            });
        }

        if low_confidence > 0 {
            let warning = format!(
                "{} of {} analogs are low-confidence (similarity < 20)",
                low_confidence,
                result.cases.len()
            );
            tracing::warn!(room_id, %warning, "Reasoning quality degraded");
            result.warnings.push(warning);
        }

        tracing::debug!(
            room_id,
            analogs = result.cases.len(),
            "Analog retrieval complete"
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use mycopilot_core::record::VisualStateRecord;
    use mycopilot_core::store::{ScoredRecord, StoreError};

    #[test]
    fn similarity_endpoints_and_bounds() {
        assert_eq!(distance_to_similarity(0.0), 100.0);
        assert_eq!(distance_to_similarity(2.0), 0.0);
        for i in 0..=200 {
            let d = i as f64 / 100.0;
            let s = distance_to_similarity(d);
            assert!((0.0..=100.0).contains(&s), "similarity {} out of range", s);
        }
    }

    #[test]
    fn similarity_is_monotonically_non_increasing() {
        let mut previous = f64::INFINITY;
        for i in 0..=200 {
            let s = distance_to_similarity(i as f64 / 100.0);
            assert!(s <= previous, "similarity rose at d={}", i as f64 / 100.0);
            previous = s;
        }
    }

    #[test]
    fn out_of_domain_distances_clamp() {
        assert_eq!(distance_to_similarity(-1.0), 100.0);
        assert_eq!(distance_to_similarity(5.0), 0.0);
    }

    #[test]
    fn convex_mapping_favors_near_duplicates() {
        // Halfway distance maps to a quarter of the score, not half.
        assert_eq!(distance_to_similarity(1.0), 25.0);
    }

    #[test]
    fn confidence_tier_boundaries() {
        assert_eq!(confidence_for(19.9), ConfidenceTier::Low);
        assert_eq!(confidence_for(20.0), ConfidenceTier::Medium);
        assert_eq!(confidence_for(60.0), ConfidenceTier::Medium);
        assert_eq!(confidence_for(60.1), ConfidenceTier::High);
    }

    struct FixedVision {
        scored: Vec<(f32, i32)>,
    }

    #[async_trait]
    impl VisionQuery for FixedVision {
        async fn records_in_window(
            &self,
            _room_id: &str,
            _center: DateTime<Utc>,
            _day_window: i64,
            _growth_day: Option<i32>,
            _growth_day_window: i32,
        ) -> Result<Vec<VisualStateRecord>, StoreError> {
            Ok(Vec::new())
        }

        async fn nearest_in_window(
            &self,
            room_id: &str,
            _embedding: &Embedding,
            _center: DateTime<Utc>,
            _day_window: i64,
            _growth_day: i32,
            _growth_day_window: i32,
            top_k: usize,
        ) -> Result<Vec<ScoredRecord>, StoreError> {
            let mut records: Vec<ScoredRecord> = self
                .scored
                .iter()
                .map(|(distance, growth_day)| ScoredRecord {
                    distance: *distance,
                    record: VisualStateRecord {
                        room_id: room_id.to_string(),
                        collection_time: Utc.with_ymd_and_hms(2025, 3, 8, 8, 0, 0).unwrap(),
                        in_date: chrono::NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
                        growth_day: *growth_day,
                        embedding: vec![0.0; 4],
                        env: Default::default(),
                        device_configs: HashMap::new(),
                        description: None,
                    },
                })
                .collect();
            records.truncate(top_k);
            Ok(records)
        }
    }

    struct BrokenVision;

    #[async_trait]
    impl VisionQuery for BrokenVision {
        async fn records_in_window(
            &self,
            _room_id: &str,
            _center: DateTime<Utc>,
            _day_window: i64,
            _growth_day: Option<i32>,
            _growth_day_window: i32,
        ) -> Result<Vec<VisualStateRecord>, StoreError> {
            Err(StoreError::Unavailable("db down".to_string()))
        }

        async fn nearest_in_window(
            &self,
            _room_id: &str,
            _embedding: &Embedding,
            _center: DateTime<Utc>,
            _day_window: i64,
            _growth_day: i32,
            _growth_day_window: i32,
            _top_k: usize,
        ) -> Result<Vec<ScoredRecord>, StoreError> {
            Err(StoreError::Unavailable("db down".to_string()))
        }
    }

    #[tokio::test]
    async fn matcher_sorts_descending_and_bounds_results() {
        let vision = Arc::new(FixedVision {
            scored: vec![(0.1, 9), (0.4, 8), (1.2, 10), (1.9, 9)],
        });
        let matcher = SimilarityMatcher::new(
            vision,
            SimilarityConfig {
                top_k: 3,
                ..Default::default()
            },
        );
        let result = matcher
            .find_similar(
                "611",
                &vec![0.0; 4],
                Utc.with_ymd_and_hms(2025, 3, 10, 8, 0, 0).unwrap(),
                9,
            )
            .await;

        assert!(result.cases.len() <= 3);
        for pair in result.cases.windows(2) {
            assert!(pair[0].similarity >= pair[1].similarity);
        }
    }

    #[tokio::test]
    async fn store_failure_degrades_to_empty_with_warning() {
        let matcher = SimilarityMatcher::new(Arc::new(BrokenVision), SimilarityConfig::default());
        let result = matcher
            .find_similar(
                "611",
                &vec![0.0; 4],
                Utc.with_ymd_and_hms(2025, 3, 10, 8, 0, 0).unwrap(),
                9,
            )
            .await;

        assert!(result.cases.is_empty());
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("Analog retrieval failed"));
    }
}
