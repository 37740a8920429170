//! Device-change event log.
//!
//! Append-only: the telemetry layer guarantees event immutability, so the
//! store never updates or deletes rows.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redb::{Database, ReadableTable, TableDefinition};

use mycopilot_core::record::DeviceChangeEvent;
use mycopilot_core::store::{DeviceChangeQuery, StoreError};

use crate::Result;

// Change log table: key = room_id/change_millis/seq, value = serialized event
const DEVICE_CHANGES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("device_changes");

/// redb-persisted device-change log.
#[derive(Clone)]
pub struct DeviceChangeStore {
    db: Arc<Database>,
    // Disambiguates events sharing a millisecond within this process.
    seq: Arc<AtomicU64>,
}

impl DeviceChangeStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            seq: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Append one change event.
    pub async fn insert(&self, event: DeviceChangeEvent) -> Result<()> {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let key = format!(
            "{}/{:013}/{:06}",
            event.room_id,
            event.change_time.timestamp_millis(),
            seq
        );
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(DEVICE_CHANGES_TABLE)?;
            let value = serde_json::to_vec(&event)?;
            table.insert(key.as_str(), value.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }
}

#[async_trait]
impl DeviceChangeQuery for DeviceChangeStore {
    async fn changes_in_range(
        &self,
        room_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        device_types: Option<&[String]>,
    ) -> std::result::Result<Vec<DeviceChangeEvent>, StoreError> {
        let read_txn = self.db.begin_read().map_err(crate::Error::from)?;
        let table = match read_txn.open_table(DEVICE_CHANGES_TABLE) {
            Ok(table) => table,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
            Err(e) => return Err(crate::Error::from(e).into()),
        };

        let mut events = Vec::new();
        for entry in table.iter().map_err(crate::Error::from)? {
            let (_key, value) = entry.map_err(crate::Error::from)?;
            let event: DeviceChangeEvent = serde_json::from_slice(value.value())
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            if event.room_id != room_id {
                continue;
            }
            if event.change_time < start || event.change_time > end {
                continue;
            }
            if let Some(types) = device_types {
                if !types.iter().any(|t| t == &event.device_type) {
                    continue;
                }
            }
            events.push(event);
        }

        events.sort_by(|a, b| b.change_time.cmp(&a.change_time));
        Ok(events)
    }
}
