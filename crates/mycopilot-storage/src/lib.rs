//! redb-backed room-state storage for MycoPilot.
//!
//! One database file holds three tables: visual-state records (with an
//! in-memory embedding index), daily environmental statistics, and the
//! device-change event log. Each concern has its own store type
//! implementing the matching query trait from `mycopilot-core`, so the
//! advisor pipeline never depends on this crate directly.

use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use redb::Database;

pub mod device_changes;
pub mod env_stats;
pub mod error;
pub mod vision;

pub use device_changes::DeviceChangeStore;
pub use env_stats::EnvStatStore;
pub use error::{Error, Result};
pub use vision::{l2_distance, VisionStore};

/// All room-state stores over one database file.
pub struct RoomStore {
    vision: VisionStore,
    env_stats: EnvStatStore,
    device_changes: DeviceChangeStore,
    path: String,
}

/// Global store singleton (thread-safe). Prevents multiple opens of the
/// same database file from concurrent invocations.
static ROOM_STORE_SINGLETON: StdMutex<Option<Arc<RoomStore>>> = StdMutex::new(None);

impl RoomStore {
    /// Open or create the room-state database.
    ///
    /// Uses a singleton per path: repeated opens return the same handle.
    /// Call [`VisionStore::load_index`] afterwards to warm the embedding
    /// index from disk.
    pub fn open<P: AsRef<Path>>(path: P, embedding_dim: usize) -> Result<Arc<Self>> {
        let path_str = path.as_ref().to_string_lossy().to_string();

        {
            let singleton = ROOM_STORE_SINGLETON
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Some(store) = singleton.as_ref() {
                if store.path == path_str {
                    return Ok(store.clone());
                }
            }
        }

        let path_ref = path.as_ref();
        let db = if path_ref.exists() {
            Database::open(path_ref)?
        } else {
            Database::create(path_ref)?
        };
        let db = Arc::new(db);

        let store = Arc::new(RoomStore {
            vision: VisionStore::new(db.clone(), embedding_dim),
            env_stats: EnvStatStore::new(db.clone()),
            device_changes: DeviceChangeStore::new(db),
            path: path_str,
        });

        *ROOM_STORE_SINGLETON
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(store.clone());
        tracing::info!(path = %store.path, "Room-state store opened");
        Ok(store)
    }

    /// Visual-state records and embedding search.
    pub fn vision(&self) -> VisionStore {
        self.vision.clone()
    }

    /// Daily environmental statistics.
    pub fn env_stats(&self) -> EnvStatStore {
        self.env_stats.clone()
    }

    /// Device-change event log.
    pub fn device_changes(&self) -> DeviceChangeStore {
        self.device_changes.clone()
    }
}
