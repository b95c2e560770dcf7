use ferroq_core::Batch;
use tokio::sync::oneshot;

/// A message sent to a worker.
#[derive(Debug)]
pub enum WorkRequest {
    /// Fulfill one dispatched batch. Nobody waits on the outcome.
    Fulfill { batch: Batch },
    /// Stop after acknowledging on `response`.
    Shutdown { response: oneshot::Sender<()> },
}
