use crate::pipeline::completion::CompletionWatch;
use crate::source::record::Record;
use crate::source::watcher::WatchError;
use crate::storage::Repository;
use std::fmt;
use std::future::Future;
use std::io::Write;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// Counters kept by the aggregator for the final summary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub received: u64,
    pub stored: u64,
    pub failed: u64,
}

impl fmt::Display for Stats {
    /// Three right-aligned columns separated by `|`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let headers = ["Total records received", "Stored", "Failed to store"];
        let values = [
            self.received.to_string(),
            self.stored.to_string(),
            self.failed.to_string(),
        ];
        let widths: Vec<usize> = headers
            .iter()
            .zip(&values)
            .map(|(h, v)| h.len().max(v.len()))
            .collect();

        writeln!(f, "Execution statistics:")?;
        let header_row: Vec<String> = headers
            .iter()
            .zip(&widths)
            .map(|(h, w)| format!("{:>w$}", h, w = w))
            .collect();
        writeln!(f, "{}", header_row.join("|"))?;
        let value_row: Vec<String> = values
            .iter()
            .zip(&widths)
            .map(|(v, w)| format!("{:>w$}", v, w = w))
            .collect();
        writeln!(f, "{}", value_row.join("|"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Termination signal received
    Shutdown,
    /// Every watcher finished on its own
    WatchersDone,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Shutdown => f.write_str("shutdown signal"),
            StopReason::WatchersDone => f.write_str("all watchers finished"),
        }
    }
}

/// Single consumer of every watcher's output.
///
/// Owns the repository and the counters. `run` consumes the aggregator,
/// so the repository is closed exactly once.
pub struct Aggregator {
    repository: Box<dyn Repository>,
    summary_out: Box<dyn Write + Send>,
    stats: Stats,
}

impl Aggregator {
    pub fn new(repository: Box<dyn Repository>) -> Self {
        Self {
            repository,
            summary_out: Box::new(std::io::stdout()),
            stats: Stats::default(),
        }
    }

    /// Write the final summary somewhere other than stdout
    pub fn with_summary_output(mut self, out: Box<dyn Write + Send>) -> Self {
        self.summary_out = out;
        self
    }

    /// Drain records and errors until `shutdown` resolves or every watcher
    /// is done, then close the repository and emit the summary.
    ///
    /// Records already queued when the watchers finish are still drained:
    /// the select is biased towards the data channels over completion.
    pub async fn run<S>(
        mut self,
        mut results: mpsc::Receiver<Record>,
        mut errors: mpsc::Receiver<WatchError>,
        mut done: CompletionWatch,
        shutdown: S,
    ) -> (Stats, StopReason)
    where
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!("Aggregator started");

        let reason = loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => break StopReason::Shutdown,

                Some(record) = results.recv() => self.handle_record(record).await,

                Some(err) = errors.recv() => {
                    error!(error = %err, "Received error");
                }

                _ = done.all_done() => {
                    self.drain_queued(&mut results, &mut errors).await;
                    break StopReason::WatchersDone;
                }
            }
        };

        info!(reason = %reason, "Aggregator stopping");
        self.finish(reason).await
    }

    /// Handle what the last watchers queued in the same poll that
    /// completion became ready. Their senders are gone, so this terminates.
    async fn drain_queued(
        &mut self,
        results: &mut mpsc::Receiver<Record>,
        errors: &mut mpsc::Receiver<WatchError>,
    ) {
        while let Ok(record) = results.try_recv() {
            self.handle_record(record).await;
        }
        while let Ok(err) = errors.try_recv() {
            error!(error = %err, "Received error");
        }
    }

    async fn handle_record(&mut self, record: Record) {
        self.stats.received += 1;
        debug!(
            source = %record.source_file.display(),
            timestamp = %record.timestamp,
            received = self.stats.received,
            "Received record"
        );

        match self.repository.store(&record).await {
            Ok(id) => {
                self.stats.stored += 1;
                debug!(id = %id, stored = self.stats.stored, "Stored record");
            }
            Err(e) => {
                self.stats.failed += 1;
                error!(
                    source = %record.source_file.display(),
                    error = %e,
                    "Failed to store record"
                );
            }
        }
    }

    async fn finish(mut self, reason: StopReason) -> (Stats, StopReason) {
        if let Err(e) = self.repository.close().await {
            error!(error = %e, "Failed to close repository");
        }

        if let Err(e) = write!(self.summary_out, "{}", self.stats)
            .and_then(|_| self.summary_out.flush())
        {
            error!(error = %e, "Failed to print execution summary");
        }

        info!(
            received = self.stats.received,
            stored = self.stats.stored,
            failed = self.stats.failed,
            "Aggregator shutdown complete"
        );

        (self.stats, reason)
    }
}
