pub mod aggregator;
pub mod completion;
pub mod runner;

pub use aggregator::{Aggregator, Stats, StopReason};
pub use completion::{completion, CompletionGuard, CompletionWatch};
pub use runner::{run_pipeline, run_with_aggregator, shutdown_signal, spawn_watchers};
