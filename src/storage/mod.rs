pub mod postgres;
pub mod sqlite;
pub mod trait_def;

pub use postgres::PostgresStorage;
pub use sqlite::SqliteStorage;
pub use trait_def::{now_millis, LinkStore, StorageError, StorageResult};

use crate::config::{DatabaseBackend, DatabaseConfig};
use std::sync::Arc;

/// Connect to the configured backend. Tables are not created until [`LinkStore::init`] runs.
pub async fn connect(config: &DatabaseConfig) -> anyhow::Result<Arc<dyn LinkStore>> {
    let store: Arc<dyn LinkStore> = match config.backend {
        DatabaseBackend::Sqlite => {
            Arc::new(SqliteStorage::new(&config.url, config.max_connections).await?)
        }
        DatabaseBackend::Postgres => {
            Arc::new(PostgresStorage::new(&config.url, config.max_connections).await?)
        }
    };
    Ok(store)
}
