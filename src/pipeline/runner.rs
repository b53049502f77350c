use crate::config::types::Config;
use crate::pipeline::aggregator::{Aggregator, Stats, StopReason};
use crate::pipeline::completion::{completion, CompletionGuard};
use crate::source::record::Record;
use crate::source::watcher::{FileWatcher, WatchError, WatchOptions};
use crate::storage::Repository;
use std::future::Future;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Capacity of the fan-in channels. One slot keeps hand-off close to
/// direct, so a slow repository throttles every watcher.
pub const CHANNEL_CAPACITY: usize = 1;

/// Start one watcher task per configured file.
///
/// Tasks are detached: they are not joined on shutdown and end with the
/// runtime. Each holds a clone of `guard` for as long as it runs.
pub fn spawn_watchers(
    config: &Config,
    results: &mpsc::Sender<Record>,
    errors: &mpsc::Sender<WatchError>,
    guard: &CompletionGuard,
) -> usize {
    let options = WatchOptions {
        must_exist: config.files_must_exist,
        follow: config.follow_files,
        poll_interval: config.poll_interval,
    };

    for (path, format_tag) in &config.files {
        let watcher = FileWatcher::new(path.clone(), format_tag.clone(), options.clone());
        let results = results.clone();
        let errors = errors.clone();
        let guard = guard.clone();

        tokio::spawn(async move {
            let _guard = guard;
            watcher.run(results, errors).await;
        });
    }

    config.files.len()
}

/// Run the ingestion pipeline until every watcher is done or `shutdown`
/// resolves. The repository is closed before this returns.
pub async fn run_pipeline<S>(
    config: &Config,
    repository: Box<dyn Repository>,
    shutdown: S,
) -> (Stats, StopReason)
where
    S: Future<Output = ()>,
{
    run_with_aggregator(config, Aggregator::new(repository), shutdown).await
}

/// Same as [`run_pipeline`] with a caller-built aggregator
pub async fn run_with_aggregator<S>(
    config: &Config,
    aggregator: Aggregator,
    shutdown: S,
) -> (Stats, StopReason)
where
    S: Future<Output = ()>,
{
    let (results_tx, results_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (errors_tx, errors_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (guard, done) = completion();

    let started = spawn_watchers(config, &results_tx, &errors_tx, &guard);
    if started == 0 {
        warn!("No files configured, nothing to ingest");
    }
    info!(watchers = started, follow = config.follow_files, "Pipeline started");

    // Only the watchers may keep these alive
    drop(results_tx);
    drop(errors_tx);
    drop(guard);

    aggregator.run(results_rx, errors_rx, done, shutdown).await
}

/// Resolves on SIGINT or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C signal"),
        _ = terminate => info!("Received terminate signal"),
    }
}
