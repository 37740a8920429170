//! Room state extraction.
//!
//! Pulls the three read-only inputs the pipeline needs (current visual
//! state, daily environmental statistics, recent device changes) and
//! derives day-over-day trends in-process. Missing data comes back as
//! empty collections, never as an error.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};

use mycopilot_core::config::{bounds, ExtractionConfig};
use mycopilot_core::record::{
    DeviceChangeEvent, EnvDailyStat, Trend, TrendDirection, VisualStateRecord,
};
use mycopilot_core::store::{DeviceChangeQuery, EnvStatQuery, StoreError, VisionQuery};

/// Extracts a room's current state from the stores.
pub struct StateExtractor {
    vision: Arc<dyn VisionQuery>,
    env_stats: Arc<dyn EnvStatQuery>,
    device_changes: Arc<dyn DeviceChangeQuery>,
    config: ExtractionConfig,
}

impl StateExtractor {
    pub fn new(
        vision: Arc<dyn VisionQuery>,
        env_stats: Arc<dyn EnvStatQuery>,
        device_changes: Arc<dyn DeviceChangeQuery>,
        config: ExtractionConfig,
    ) -> Self {
        Self {
            vision,
            env_stats,
            device_changes,
            config,
        }
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Visual-state candidates around `target_time`, newest first.
    ///
    /// Empty result on no match; "no data" is not an error.
    pub async fn extract_current_state(
        &self,
        room_id: &str,
        target_time: DateTime<Utc>,
        time_window_days: i64,
        growth_day_window: i32,
    ) -> Result<Vec<VisualStateRecord>, StoreError> {
        let records = self
            .vision
            .records_in_window(room_id, target_time, time_window_days, None, growth_day_window)
            .await?;
        tracing::debug!(room_id, candidates = records.len(), "Current-state extraction");
        Ok(records)
    }

    /// Daily stats over `[target_date − days_range, target_date + days_range]`
    /// with trends computed against each day's predecessor.
    pub async fn extract_env_daily_stats(
        &self,
        room_id: &str,
        target_date: NaiveDate,
        days_range: i64,
    ) -> Result<Vec<EnvDailyStat>, StoreError> {
        let start = target_date - Duration::days(days_range);
        let end = target_date + Duration::days(days_range);
        let mut stats = self.env_stats.stats_in_range(room_id, start, end).await?;
        self.compute_trends(&mut stats);
        Ok(stats)
    }

    /// Fill each stat's `trends` map by comparing metric medians with the
    /// previous day. Percentage change; direction is Stable when the
    /// magnitude stays under the configured epsilon.
    fn compute_trends(&self, stats: &mut [EnvDailyStat]) {
        let epsilon = self.config.stability_epsilon_pct;

        // Medians by (date, metric) snapshot, taken before mutation.
        let medians: Vec<(NaiveDate, Vec<(&'static str, Option<f64>)>)> = stats
            .iter()
            .map(|stat| {
                let per_metric = stat
                    .metrics()
                    .iter()
                    .map(|(name, metric)| (*name, metric.and_then(|m| m.median)))
                    .collect();
                (stat.stat_date, per_metric)
            })
            .collect();

        for stat in stats.iter_mut() {
            let previous_date = stat.stat_date.pred_opt();
            let previous = previous_date
                .and_then(|date| medians.iter().find(|(d, _)| *d == date))
                .map(|(_, metrics)| metrics);
            let Some(previous) = previous else {
                continue;
            };

            let current_medians: Vec<(&'static str, Option<f64>)> = stat
                .metrics()
                .iter()
                .map(|(name, metric)| (*name, metric.and_then(|m| m.median)))
                .collect();
            for (name, current) in current_medians {
                let prior = previous
                    .iter()
                    .find(|(n, _)| *n == name)
                    .and_then(|(_, v)| *v);
                let (Some(current), Some(prior)) = (current, prior) else {
                    continue;
                };
                if prior.abs() < f64::EPSILON {
                    continue;
                }

                let change_pct = (current - prior) / prior * 100.0;
                let direction = if change_pct.abs() < epsilon {
                    TrendDirection::Stable
                } else if change_pct > 0.0 {
                    TrendDirection::Rising
                } else {
                    TrendDirection::Falling
                };
                stat.trends
                    .insert(name.to_string(), Trend { direction, change_pct });
            }
        }
    }

    /// Device changes in `[start, end]`, newest first. The device-type
    /// filter is conjunctive with the time window.
    pub async fn extract_device_changes(
        &self,
        room_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        device_types: Option<&[String]>,
    ) -> Result<Vec<DeviceChangeEvent>, StoreError> {
        self.device_changes
            .changes_in_range(room_id, start, end, device_types)
            .await
    }

    /// Plausibility warnings for environmental readings.
    ///
    /// Null fields are skipped silently; this never fails.
    pub fn validate_env_params(records: &[VisualStateRecord]) -> Vec<String> {
        let mut warnings = Vec::new();
        for record in records {
            let context = format!(
                "room {} @ {}",
                record.room_id,
                record.collection_time.format("%Y-%m-%d %H:%M")
            );
            if let Some(t) = record.env.temperature {
                if t < bounds::TEMPERATURE.0 || t > bounds::TEMPERATURE.1 {
                    warnings.push(format!("Temperature out of range: {} ({})", t, context));
                }
            }
            if let Some(h) = record.env.humidity {
                if h < bounds::HUMIDITY.0 || h > bounds::HUMIDITY.1 {
                    warnings.push(format!("Humidity out of range: {} ({})", h, context));
                }
            }
            if let Some(c) = record.env.co2 {
                if c < bounds::CO2.0 || c > bounds::CO2.1 {
                    warnings.push(format!("CO2 out of range: {} ({})", c, context));
                }
            }
        }
        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use mycopilot_core::record::{EnvSnapshot, MetricStat};
    use std::collections::HashMap;

    fn record_with_env(env: EnvSnapshot) -> VisualStateRecord {
        VisualStateRecord {
            room_id: "611".to_string(),
            collection_time: Utc.with_ymd_and_hms(2025, 3, 10, 8, 0, 0).unwrap(),
            in_date: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            growth_day: 9,
            embedding: vec![0.0; 4],
            env,
            device_configs: HashMap::new(),
            description: None,
        }
    }

    #[test]
    fn out_of_range_temperature_yields_one_warning() {
        let record = record_with_env(EnvSnapshot {
            temperature: Some(45.0),
            humidity: Some(85.0),
            co2: Some(800.0),
        });
        let warnings = StateExtractor::validate_env_params(&[record]);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("Temperature out of range"));
    }

    #[test]
    fn all_null_record_yields_no_warnings() {
        let record = record_with_env(EnvSnapshot::default());
        assert!(StateExtractor::validate_env_params(&[record]).is_empty());
    }

    #[test]
    fn each_metric_is_checked_independently() {
        let record = record_with_env(EnvSnapshot {
            temperature: Some(20.0),
            humidity: Some(120.0),
            co2: Some(9000.0),
        });
        let warnings = StateExtractor::validate_env_params(&[record]);
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].contains("Humidity out of range"));
        assert!(warnings[1].contains("CO2 out of range"));
    }

    struct StatsOnly {
        stats: Vec<EnvDailyStat>,
    }

    #[async_trait]
    impl EnvStatQuery for StatsOnly {
        async fn stats_in_range(
            &self,
            _room_id: &str,
            start: NaiveDate,
            end: NaiveDate,
        ) -> Result<Vec<EnvDailyStat>, StoreError> {
            Ok(self
                .stats
                .iter()
                .filter(|s| s.stat_date >= start && s.stat_date <= end)
                .cloned()
                .collect())
        }
    }

    struct EmptyVision;

    #[async_trait]
    impl VisionQuery for EmptyVision {
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
            _room_id: &str,
            _embedding: &mycopilot_core::record::Embedding,
            _center: DateTime<Utc>,
            _day_window: i64,
            _growth_day: i32,
            _growth_day_window: i32,
            _top_k: usize,
        ) -> Result<Vec<mycopilot_core::store::ScoredRecord>, StoreError> {
            Ok(Vec::new())
        }
    }

    struct EmptyChanges;

    #[async_trait]
    impl DeviceChangeQuery for EmptyChanges {
        async fn changes_in_range(
            &self,
            _room_id: &str,
            _start: DateTime<Utc>,
            _end: DateTime<Utc>,
            _device_types: Option<&[String]>,
        ) -> Result<Vec<DeviceChangeEvent>, StoreError> {
            Ok(Vec::new())
        }
    }

    fn stat(day: u32, temp_median: Option<f64>) -> EnvDailyStat {
        EnvDailyStat {
            room_id: "611".to_string(),
            stat_date: NaiveDate::from_ymd_opt(2025, 3, day).unwrap(),
            temperature: temp_median.map(|median| MetricStat {
                median: Some(median),
                samples: 24,
                ..Default::default()
            }),
            humidity: None,
            co2: None,
            fruiting: false,
            trends: HashMap::new(),
        }
    }

    fn extractor(stats: Vec<EnvDailyStat>) -> StateExtractor {
        StateExtractor::new(
            Arc::new(EmptyVision),
            Arc::new(StatsOnly { stats }),
            Arc::new(EmptyChanges),
            ExtractionConfig::default(),
        )
    }

    #[tokio::test]
    async fn trend_directions_respect_epsilon() {
        // Default epsilon is 1%: +0.5% is stable, +10% rising, -10% falling.
        let extractor = extractor(vec![
            stat(9, Some(20.0)),
            stat(10, Some(20.1)),
            stat(11, Some(22.11)),
            stat(12, Some(19.9)),
        ]);
        let stats = extractor
            .extract_env_daily_stats("611", NaiveDate::from_ymd_opt(2025, 3, 11).unwrap(), 2)
            .await
            .unwrap();

        assert_eq!(stats.len(), 4);
        // Day 9 has no predecessor in range.
        assert!(stats[0].trends.is_empty());
        assert_eq!(
            stats[1].trends["temperature"].direction,
            TrendDirection::Stable
        );
        assert_eq!(
            stats[2].trends["temperature"].direction,
            TrendDirection::Rising
        );
        assert_eq!(
            stats[3].trends["temperature"].direction,
            TrendDirection::Falling
        );
    }

    #[tokio::test]
    async fn missing_medians_skip_trends_silently() {
        let extractor = extractor(vec![stat(10, None), stat(11, Some(20.0))]);
        let stats = extractor
            .extract_env_daily_stats("611", NaiveDate::from_ymd_opt(2025, 3, 11).unwrap(), 1)
            .await
            .unwrap();
        assert!(stats.iter().all(|s| s.trends.is_empty()));
    }
}
