pub mod memory;
pub mod postgres;
mod sql;
pub mod sqlite;
pub mod trait_def;

pub use memory::MemoryStore;
pub use postgres::PostgresStorage;
pub use sqlite::SqliteStorage;
pub use trait_def::{EventStore, StorageError, StorageResult};

use crate::config::{DatabaseBackend, DatabaseConfig};
use std::sync::Arc;
use tracing::info;

/// Open the store selected by the configuration
pub async fn connect(config: &DatabaseConfig) -> anyhow::Result<Arc<dyn EventStore>> {
    let store: Arc<dyn EventStore> = match config.backend {
        DatabaseBackend::Sqlite => {
            info!("Using SQLite storage: {}", config.url);
            Arc::new(SqliteStorage::new(&config.url, config.max_connections).await?)
        }
        DatabaseBackend::Postgres => {
            info!("Using PostgreSQL storage: {}", config.url);
            Arc::new(PostgresStorage::new(&config.url, config.max_connections).await?)
        }
        DatabaseBackend::Memory => {
            info!("Using in-memory storage, records are lost on exit");
            Arc::new(MemoryStore::new())
        }
    };

    Ok(store)
}
