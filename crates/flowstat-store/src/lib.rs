//! flowstat store - Execution records and status history
//!
//! Two interchangeable backends behind [`StatusStore`]:
//! - `MemoryStore`: in-process, for development and single-instance use
//! - `SqliteStore`: durable, two tables (executions, events)
//!
//! The backend is chosen once from configuration; there is no runtime
//! fallback from one to the other.

pub mod error;
pub mod memory_store;
pub mod metrics;
pub mod sqlite_store;
pub mod status_store;

pub use error::{Result, StoreError};
pub use memory_store::MemoryStore;
pub use sqlite_store::SqliteStore;
pub use status_store::{page_window, StatusStore};

use flowstat_core::{StoreBackend, StoreConfig};
use std::sync::Arc;
use tracing::info;

/// Build the configured store.
///
/// Returns `StoreError::Disabled` when the store is switched off, and a
/// configuration or database error when the durable backend cannot be
/// built.
pub async fn open_store(config: &StoreConfig) -> Result<Arc<dyn StatusStore>> {
    if !config.enabled {
        return Err(StoreError::Disabled);
    }

    let store: Arc<dyn StatusStore> = match config.backend {
        StoreBackend::Memory => Arc::new(MemoryStore::new(config.max_records)),
        StoreBackend::Sqlite => Arc::new(SqliteStore::connect(&config.sqlite).await?),
    };
    info!(backend = store.backend(), "Status store ready");
    Ok(store)
}
