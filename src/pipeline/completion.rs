use tokio::sync::mpsc;

/// Held by each running watcher task. Dropping the last guard completes
/// the matching [`CompletionWatch`].
///
/// Dropping happens on every exit path of the task (return, panic,
/// abort), so completion is signalled exactly once per watcher.
#[derive(Debug, Clone)]
pub struct CompletionGuard {
    _tx: mpsc::Sender<()>,
}

/// Resolves once every [`CompletionGuard`] is gone
#[derive(Debug)]
pub struct CompletionWatch {
    rx: mpsc::Receiver<()>,
}

/// Create a countdown. Clone the guard once per watcher and drop the original.
pub fn completion() -> (CompletionGuard, CompletionWatch) {
    let (tx, rx) = mpsc::channel(1);
    (CompletionGuard { _tx: tx }, CompletionWatch { rx })
}

impl CompletionWatch {
    /// Wait until all guards have been dropped
    pub async fn all_done(&mut self) {
        // Nothing is ever sent; recv returns None once every sender is dropped
        while self.rx.recv().await.is_some() {}
    }
}
