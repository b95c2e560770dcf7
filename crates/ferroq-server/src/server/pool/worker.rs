use crate::server::{
    pool::request::WorkRequest,
    telemetry::{increment_fulfill_errors, increment_ids_fulfilled},
};
use ferroq_core::{queue::Fulfiller, store::Store};
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Worker task responsible for processing [`WorkRequest`] messages.
///
/// Each worker owns a [`Fulfiller`] handle and runs the batches it receives
/// one at a time until it is told to shut down. Once `shutdown_token` is
/// cancelled, batches still queued are dropped; their ids remain pending in
/// the store and will be dispatched again.
///
/// `in_flight` is decremented once per received batch, whatever the outcome.
pub async fn worker_loop<S: Store>(
    worker_id: usize,
    mut rx: mpsc::Receiver<WorkRequest>,
    fulfiller: Fulfiller<S>,
    in_flight: Arc<AtomicUsize>,
    shutdown_token: CancellationToken,
) {
    tracing::trace!(worker_id, "worker started");

    while let Some(work) = rx.recv().await {
        match work {
            WorkRequest::Fulfill { batch } => {
                if shutdown_token.is_cancelled() {
                    tracing::warn!(
                        worker_id,
                        shard = %batch.shard,
                        ids = ?batch.ids,
                        "dropping batch after cancellation; ids stay pending"
                    );
                } else {
                    match fulfiller.fulfill(batch.shard, &batch.ids).await {
                        Ok(()) => increment_ids_fulfilled(batch.len() as u64),
                        Err(e) => {
                            increment_fulfill_errors();
                            tracing::error!(
                                worker_id,
                                shard = %batch.shard,
                                ids = ?batch.ids,
                                error = %e,
                                "failed to fulfill batch"
                            );
                        }
                    }
                }
                in_flight.fetch_sub(1, Ordering::AcqRel);
            }
            WorkRequest::Shutdown { response } => {
                tracing::debug!(worker_id, "worker received shutdown signal");
                if response.send(()).is_err() {
                    tracing::error!(worker_id, "worker failed to acknowledge shutdown");
                }
                break;
            }
        }
    }

    tracing::trace!(worker_id, "worker stopped");
}
