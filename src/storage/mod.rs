pub mod duckdb;
pub mod memory;
pub mod traits;

pub use traits::{RecordId, Repository, StorageError, StoredRecord};

use crate::config::types::{StorageBackend, StorageConfig};
use tracing::info;

/// Open the repository selected by `config.backend`.
pub async fn connect(config: &StorageConfig) -> Result<Box<dyn Repository>, StorageError> {
    info!(
        backend = config.backend.name(),
        url = %config.url,
        database = %config.database,
        collection = %config.collection,
        "Connecting to storage"
    );

    match config.backend {
        StorageBackend::DuckDb => {
            if config.username.is_some() || config.password.is_some() {
                tracing::warn!("DuckDB storage does not use credentials, ignoring them");
            }
            let repo =
                self::duckdb::DuckDbRepository::open(&config.url, &config.database, &config.collection)?;
            repo.init_schema().await?;
            Ok(Box::new(repo))
        }
        StorageBackend::Memory => Ok(Box::new(self::memory::MemoryRepository::new())),
    }
}
