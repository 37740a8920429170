//! Store query traits.
//!
//! The decision pipeline reads room state through these traits rather
//! than concrete database handles, so components can be constructed with
//! fakes in tests. `mycopilot-storage` provides the redb-backed
//! implementations.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use crate::record::{DeviceChangeEvent, Embedding, EnvDailyStat, VisualStateRecord};

/// Errors surfaced by store implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store is unreachable or failed to open.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A query failed mid-flight.
    #[error("Query failed: {0}")]
    Query(String),

    /// Embedding dimension mismatch.
    #[error("Invalid dimension: expected {expected}, found {found}")]
    InvalidDimension { expected: usize, found: usize },

    /// Stored bytes could not be decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// A visual-state record paired with its vector distance to a query.
#[derive(Debug, Clone)]
pub struct ScoredRecord {
    pub record: VisualStateRecord,
    /// L2 distance over normalized embeddings, expected in [0, 2].
    pub distance: f32,
}

/// Read access to visual-state records.
#[async_trait]
pub trait VisionQuery: Send + Sync {
    /// Records for a room within `±day_window` days of `center`, optionally
    /// restricted to `±growth_day_window` around a pinned growth day.
    /// Ordered descending by collection time. Empty on no match.
    async fn records_in_window(
        &self,
        room_id: &str,
        center: DateTime<Utc>,
        day_window: i64,
        growth_day: Option<i32>,
        growth_day_window: i32,
    ) -> Result<Vec<VisualStateRecord>, StoreError>;

    /// Nearest records by embedding distance within the same windows,
    /// ascending by distance, at most `top_k` results.
    #[allow(clippy::too_many_arguments)]
    async fn nearest_in_window(
        &self,
        room_id: &str,
        embedding: &Embedding,
        center: DateTime<Utc>,
        day_window: i64,
        growth_day: i32,
        growth_day_window: i32,
        top_k: usize,
    ) -> Result<Vec<ScoredRecord>, StoreError>;
}

/// Read access to daily environmental statistics.
#[async_trait]
pub trait EnvStatQuery: Send + Sync {
    /// Stats for `[start, end]` inclusive, ascending by date.
    async fn stats_in_range(
        &self,
        room_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<EnvDailyStat>, StoreError>;
}

/// Read access to the device-change event log.
#[async_trait]
pub trait DeviceChangeQuery: Send + Sync {
    /// Changes within `[start, end]`, descending by change time. The
    /// device-type filter is conjunctive with the time window.
    async fn changes_in_range(
        &self,
        room_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        device_types: Option<&[String]>,
    ) -> Result<Vec<DeviceChangeEvent>, StoreError>;
}
