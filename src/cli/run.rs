use crate::config::Config;
use crate::pipeline::{run_pipeline, shutdown_signal, Stats};
use crate::storage::{self, StorageError};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("failed to drop stored records: {0}")]
    Drop(#[source] StorageError),
}

/// Connect storage, run the pipeline until completion or a termination
/// signal, and return the final counts.
pub async fn run_config(config: Config) -> Result<Stats, RunError> {
    if let Ok(pretty) = serde_json::to_string_pretty(&config) {
        debug!("Current config:\n{}", pretty);
    }

    let mut repository = storage::connect(&config.storage).await?;
    repository
        .drop_collection(config.drop_before_start)
        .await
        .map_err(RunError::Drop)?;

    info!(files = config.files.len(), "Starting ingestion, press Ctrl+C to stop");
    let (stats, reason) = run_pipeline(&config, repository, shutdown_signal()).await;
    info!(reason = %reason, "Ingestion finished");

    Ok(stats)
}
