//! Visual-state record storage with embedding search.
//!
//! Records are persisted in redb and mirrored into an in-memory index so
//! windowed scans and nearest-neighbor queries never touch disk on the
//! hot path. The index is exact: candidates are filtered by room, date
//! window, and growth-day window before distances are ranked, so results
//! match the relational nearest-neighbor formulation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use redb::{Database, ReadableTable, TableDefinition};
use tokio::sync::RwLock;

use mycopilot_core::record::{Embedding, VisualStateRecord};
use mycopilot_core::store::{ScoredRecord, StoreError, VisionQuery};

use crate::{Error, Result};

// Visual states table: key = room_id/collection_millis, value = serialized record
const VISUAL_STATES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("visual_states");

/// redb-persisted visual-state store with an in-memory embedding index.
#[derive(Clone)]
pub struct VisionStore {
    db: Arc<Database>,
    index: Arc<RwLock<HashMap<String, VisualStateRecord>>>,
    /// Expected embedding dimension for all records and queries.
    dimension: usize,
}

impl VisionStore {
    /// Create a store over an open database.
    pub fn new(db: Arc<Database>, dimension: usize) -> Self {
        Self {
            db,
            index: Arc::new(RwLock::new(HashMap::new())),
            dimension,
        }
    }

    /// Load all persisted records into the in-memory index.
    pub async fn load_index(&self) -> Result<()> {
        let read_txn = self.db.begin_read()?;
        let table = match read_txn.open_table(VISUAL_STATES_TABLE) {
            Ok(table) => table,
            // First open before any insert: nothing to load.
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let mut loaded = 0usize;
        let mut index = self.index.write().await;
        for entry in table.iter()? {
            let (key, value) = entry?;
            match serde_json::from_slice::<VisualStateRecord>(value.value()) {
                Ok(record) => {
                    index.insert(key.value().to_string(), record);
                    loaded += 1;
                }
                Err(e) => {
                    tracing::warn!(key = key.value(), error = %e, "Skipping undecodable visual state");
                }
            }
        }
        tracing::debug!(loaded, "Visual-state index loaded");
        Ok(())
    }

    /// Append a record. Records are written once and never mutated.
    pub async fn insert(&self, record: VisualStateRecord) -> Result<()> {
        if record.embedding.len() != self.dimension {
            return Err(Error::InvalidDimension {
                expected: self.dimension,
                found: record.embedding.len(),
            });
        }

        let key = record.key();
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(VISUAL_STATES_TABLE)?;
            let value = serde_json::to_vec(&record)?;
            table.insert(key.as_str(), value.as_slice())?;
        }
        write_txn.commit()?;

        let mut index = self.index.write().await;
        index.insert(key, record);
        Ok(())
    }

    /// Number of records in the index.
    pub async fn count(&self) -> usize {
        self.index.read().await.len()
    }

    fn in_windows(
        record: &VisualStateRecord,
        room_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        growth_day: Option<i32>,
        growth_day_window: i32,
    ) -> bool {
        if record.room_id != room_id {
            return false;
        }
        if record.collection_time < start || record.collection_time > end {
            return false;
        }
        if let Some(day) = growth_day {
            if (record.growth_day - day).abs() > growth_day_window {
                return false;
            }
        }
        true
    }
}

/// L2 distance between two vectors.
///
/// For normalized embeddings the result lands in [0, 2].
pub fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

#[async_trait]
impl VisionQuery for VisionStore {
    async fn records_in_window(
        &self,
        room_id: &str,
        center: DateTime<Utc>,
        day_window: i64,
        growth_day: Option<i32>,
        growth_day_window: i32,
    ) -> std::result::Result<Vec<VisualStateRecord>, StoreError> {
        let start = center - Duration::days(day_window);
        let end = center + Duration::days(day_window);

        let index = self.index.read().await;
        let mut records: Vec<VisualStateRecord> = index
            .values()
            .filter(|r| Self::in_windows(r, room_id, start, end, growth_day, growth_day_window))
            .cloned()
            .collect();

        records.sort_by(|a, b| b.collection_time.cmp(&a.collection_time));
        Ok(records)
    }

    async fn nearest_in_window(
        &self,
        room_id: &str,
        embedding: &Embedding,
        center: DateTime<Utc>,
        day_window: i64,
        growth_day: i32,
        growth_day_window: i32,
        top_k: usize,
    ) -> std::result::Result<Vec<ScoredRecord>, StoreError> {
        if embedding.len() != self.dimension {
            return Err(StoreError::InvalidDimension {
                expected: self.dimension,
                found: embedding.len(),
            });
        }

        let start = center - Duration::days(day_window);
        let end = center + Duration::days(day_window);

        let index = self.index.read().await;
        let mut scored: Vec<ScoredRecord> = index
            .values()
            .filter(|r| {
                Self::in_windows(r, room_id, start, end, Some(growth_day), growth_day_window)
            })
            .map(|r| ScoredRecord {
                distance: l2_distance(embedding, &r.embedding),
                record: r.clone(),
            })
            .collect();

        scored.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(top_k);
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    fn record(room: &str, hour: u32, growth_day: i32, embedding: Vec<f32>) -> VisualStateRecord {
        VisualStateRecord {
            room_id: room.to_string(),
            collection_time: Utc.with_ymd_and_hms(2025, 3, 10, hour, 0, 0).unwrap(),
            in_date: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            growth_day,
            embedding,
            env: Default::default(),
            device_configs: HashMap::new(),
            description: None,
        }
    }

    fn open_store(dim: usize) -> (tempfile::TempDir, VisionStore) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::create(dir.path().join("states.redb")).unwrap();
        (dir, VisionStore::new(Arc::new(db), dim))
    }

    #[tokio::test]
    async fn insert_and_reload() {
        let (_dir, store) = open_store(3);
        store.insert(record("611", 8, 9, vec![1.0, 0.0, 0.0])).await.unwrap();
        store.insert(record("611", 9, 9, vec![0.0, 1.0, 0.0])).await.unwrap();
        assert_eq!(store.count().await, 2);

        // Fresh index over the same database sees the persisted rows.
        let fresh = VisionStore::new(store.db.clone(), 3);
        fresh.load_index().await.unwrap();
        assert_eq!(fresh.count().await, 2);
    }

    #[tokio::test]
    async fn rejects_wrong_dimension() {
        let (_dir, store) = open_store(3);
        let result = store.insert(record("611", 8, 9, vec![1.0, 0.0])).await;
        assert!(matches!(
            result,
            Err(Error::InvalidDimension { expected: 3, found: 2 })
        ));
    }

    #[tokio::test]
    async fn nearest_orders_by_distance_and_bounds_top_k() {
        let (_dir, store) = open_store(3);
        store.insert(record("611", 7, 9, vec![0.0, 1.0, 0.0])).await.unwrap();
        store.insert(record("611", 8, 9, vec![1.0, 0.0, 0.0])).await.unwrap();
        store.insert(record("611", 9, 9, vec![0.9, 0.1, 0.0])).await.unwrap();

        let center = Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap();
        let results = store
            .nearest_in_window("611", &vec![1.0, 0.0, 0.0], center, 1, 9, 2, 2)
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert!(results[0].distance <= results[1].distance);
        assert_eq!(results[0].record.collection_time.format("%H").to_string(), "08");
    }

    #[tokio::test]
    async fn windows_exclude_other_rooms_and_growth_days() {
        let (_dir, store) = open_store(2);
        store.insert(record("611", 8, 9, vec![1.0, 0.0])).await.unwrap();
        store.insert(record("612", 8, 9, vec![1.0, 0.0])).await.unwrap();
        store.insert(record("611", 9, 20, vec![1.0, 0.0])).await.unwrap();

        let center = Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap();
        let results = store
            .nearest_in_window("611", &vec![1.0, 0.0], center, 1, 9, 3, 10)
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].record.growth_day, 9);
    }

    #[tokio::test]
    async fn query_dimension_mismatch_is_an_error() {
        let (_dir, store) = open_store(3);
        let center = Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap();
        let result = store
            .nearest_in_window("611", &vec![1.0, 0.0], center, 1, 9, 3, 5)
            .await;
        assert!(matches!(result, Err(StoreError::InvalidDimension { .. })));
    }
}
