//! Persistence for per-server settings, last known status and history
//!
//! ## Design
//!
//! - **Trait-based**: `SettingsStore` lets the engine run against any backend
//! - **Async**: All operations are async so both poll loops can share a store
//! - **Self-pruning**: history retention is enforced by the store itself
//!
//! ## Backends
//!
//! - **SQLite** (default): Embedded database file
//! - **In-Memory**: No persistence, for testing or throwaway sessions
//!
//! ## Usage
//!
//! ```no_run
//! use vps_watch::config::StorageConfig;
//! use vps_watch::storage;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = storage::open(&StorageConfig::default()).await?;
//!     let monitored = store.monitored_ids().await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use tracing::info;

use crate::config::StorageConfig;

pub mod backend;
pub mod error;
pub mod history;
pub mod memory;
#[cfg(feature = "storage-sqlite")]
pub mod sqlite;

pub use backend::SettingsStore;
pub use error::{StorageError, StorageResult};
pub use history::{HistoryEvent, Severity};
pub use memory::MemoryStore;

/// Open the store described by `config`
pub async fn open(config: &StorageConfig) -> StorageResult<Arc<dyn SettingsStore>> {
    match config {
        StorageConfig::None => {
            info!("using in-memory settings store, nothing will be persisted");
            Ok(Arc::new(MemoryStore::new()))
        }
        #[cfg(feature = "storage-sqlite")]
        StorageConfig::Sqlite { path } => Ok(Arc::new(sqlite::SqliteStore::new(path).await?)),
        #[cfg(not(feature = "storage-sqlite"))]
        StorageConfig::Sqlite { .. } => Err(StorageError::Unavailable(
            "built without the storage-sqlite feature".to_string(),
        )),
    }
}
