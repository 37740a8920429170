//! Daily environmental statistics storage.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use redb::{Database, ReadableTable, TableDefinition};

use mycopilot_core::record::EnvDailyStat;
use mycopilot_core::store::{EnvStatQuery, StoreError};

use crate::Result;

// Daily stats table: key = room_id/stat_date (ISO), value = serialized stat
const ENV_DAILY_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("env_daily_stats");

/// redb-persisted daily statistics store.
#[derive(Clone)]
pub struct EnvStatStore {
    db: Arc<Database>,
}

impl EnvStatStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    fn key(room_id: &str, stat_date: NaiveDate) -> String {
        // ISO dates sort lexicographically, matching chronological order.
        format!("{}/{}", room_id, stat_date)
    }

    /// Upsert one day's statistics.
    pub async fn insert(&self, stat: EnvDailyStat) -> Result<()> {
        let key = Self::key(&stat.room_id, stat.stat_date);
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(ENV_DAILY_TABLE)?;
            let value = serde_json::to_vec(&stat)?;
            table.insert(key.as_str(), value.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }
}

#[async_trait]
impl EnvStatQuery for EnvStatStore {
    async fn stats_in_range(
        &self,
        room_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> std::result::Result<Vec<EnvDailyStat>, StoreError> {
        let read_txn = self.db.begin_read().map_err(crate::Error::from)?;
        let table = match read_txn.open_table(ENV_DAILY_TABLE) {
            Ok(table) => table,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
            Err(e) => return Err(crate::Error::from(e).into()),
        };

        let mut stats = Vec::new();
        for entry in table.iter().map_err(crate::Error::from)? {
            let (_key, value) = entry.map_err(crate::Error::from)?;
            let stat: EnvDailyStat = serde_json::from_slice(value.value())
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            if stat.room_id == room_id && stat.stat_date >= start && stat.stat_date <= end {
                stats.push(stat);
            }
        }

        stats.sort_by_key(|s| s.stat_date);
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mycopilot_core::record::MetricStat;

    fn stat(room: &str, day: u32, median: f64) -> EnvDailyStat {
        EnvDailyStat {
            room_id: room.to_string(),
            stat_date: NaiveDate::from_ymd_opt(2025, 3, day).unwrap(),
            temperature: Some(MetricStat {
                median: Some(median),
                samples: 24,
                ..Default::default()
            }),
            humidity: None,
            co2: None,
            fruiting: false,
            trends: Default::default(),
        }
    }

    #[tokio::test]
    async fn range_scan_is_inclusive_and_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(Database::create(dir.path().join("stats.redb")).unwrap());
        let store = EnvStatStore::new(db);

        store.insert(stat("611", 12, 18.4)).await.unwrap();
        store.insert(stat("611", 10, 18.0)).await.unwrap();
        store.insert(stat("611", 11, 18.2)).await.unwrap();
        store.insert(stat("612", 11, 21.0)).await.unwrap();

        let stats = store
            .stats_in_range(
                "611",
                NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
                NaiveDate::from_ymd_opt(2025, 3, 11).unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].stat_date.to_string(), "2025-03-10");
        assert_eq!(stats[1].stat_date.to_string(), "2025-03-11");
    }

    #[tokio::test]
    async fn empty_store_returns_empty() {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(Database::create(dir.path().join("stats.redb")).unwrap());
        let store = EnvStatStore::new(db);

        let stats = store
            .stats_in_range(
                "611",
                NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
                NaiveDate::from_ymd_opt(2025, 3, 31).unwrap(),
            )
            .await
            .unwrap();
        assert!(stats.is_empty());
    }
}
