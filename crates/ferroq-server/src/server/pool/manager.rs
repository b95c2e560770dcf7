//! Asynchronous worker pool for batch fulfillment.
//!
//! This module defines the [`WorkerPool`] struct, which manages a set of
//! asynchronous workers responsible for processing [`WorkRequest`]s. It
//! distributes work using round-robin scheduling and supports coordinated
//! shutdown via a shared [`CancellationToken`].
//!
//! The pool is also the queue's [`Invoker`]: handing a batch to the pool is
//! the fire-and-forget submission the dispatcher needs. `invoke` resolves as
//! soon as the batch is enqueued on a worker channel.

use crate::server::pool::{request::WorkRequest, worker::worker_loop};
use core::time::Duration;
use ferroq_core::{
    Batch, Error, InvokeError, invoke::Invoker, queue::Fulfiller, store::Store,
};
use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};
use tokio::{
    sync::{mpsc, oneshot},
    time::{sleep, timeout},
};
use tokio_util::sync::CancellationToken;

/// How long each worker gets to acknowledge shutdown.
const SHUTDOWN_ACK_TIMEOUT: Duration = Duration::from_secs(3);

/// A cooperative pool of asynchronous workers that fulfill batches.
///
/// Workers receive requests over bounded MPSC channels. Work is distributed in
/// round-robin fashion and the pool supports graceful, cancellable shutdown.
pub struct WorkerPool {
    workers: Vec<mpsc::Sender<WorkRequest>>,
    next_worker: AtomicUsize,
    in_flight: Arc<AtomicUsize>,
    closing: AtomicBool,
    shutdown_token: CancellationToken,
    shutdown_timeout: Duration,
    target: String,
}

impl WorkerPool {
    /// Spawns `num_workers` workers, each owning a clone of `fulfiller` and a
    /// channel of `buffer_size` requests. Both are clamped to at least one.
    ///
    /// `target` is the only invocation target this pool accepts.
    pub fn spawn<S: Store>(
        fulfiller: &Fulfiller<S>,
        target: impl Into<String>,
        num_workers: usize,
        buffer_size: usize,
        shutdown_timeout: Duration,
    ) -> Self {
        let shutdown_token = CancellationToken::new();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let num_workers = num_workers.max(1);
        let mut workers = Vec::with_capacity(num_workers);

        for worker_id in 0..num_workers {
            let (tx, rx) = mpsc::channel(buffer_size.max(1));
            workers.push(tx);
            tokio::spawn(worker_loop(
                worker_id,
                rx,
                fulfiller.clone(),
                Arc::clone(&in_flight),
                shutdown_token.clone(),
            ));
        }

        Self {
            workers,
            next_worker: AtomicUsize::new(0),
            in_flight,
            closing: AtomicBool::new(false),
            shutdown_token,
            shutdown_timeout,
            target: target.into(),
        }
    }

    /// Returns the index of the next worker to receive work (round-robin).
    ///
    /// Uses a relaxed atomic increment to minimize contention.
    pub fn next_worker_index(&self) -> usize {
        self.next_worker.fetch_add(1, Ordering::Relaxed) % self.workers.len()
    }

    /// `false` once shutdown has started.
    pub fn is_accepting(&self) -> bool {
        !self.closing.load(Ordering::Acquire) && !self.shutdown_token.is_cancelled()
    }

    /// Number of batches handed to workers and not yet finished.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Enqueues `batch` for fulfillment on the next worker.
    ///
    /// # Errors
    ///
    /// See [`WorkerPool::send_to_next_worker`].
    pub async fn fulfill(&self, batch: Batch) -> Result<(), Error> {
        self.send_to_next_worker(WorkRequest::Fulfill { batch }).await
    }

    /// Sends a [`WorkRequest`] to the next available worker in the pool.
    ///
    /// Waits for channel capacity if the worker is backed up. Cancelling the
    /// returned future before it resolves leaves nothing enqueued.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The pool is shutting down.
    /// - The worker's channel is closed.
    pub async fn send_to_next_worker(&self, request: WorkRequest) -> Result<(), Error> {
        if !self.is_accepting() {
            return Err(Error::ServiceShutdown);
        }

        let worker_idx = self.next_worker_index();
        let worker = &self.workers[worker_idx];

        // Only the reservation awaits. Once a slot is held, counting and
        // sending cannot be interrupted, so a dropped caller never leaves a
        // phantom in-flight batch behind.
        let permit = worker.reserve().await.map_err(|_| Error::ChannelError {
            context: format!("Worker {worker_idx} channel closed"),
        })?;

        if matches!(request, WorkRequest::Fulfill { .. }) {
            self.in_flight.fetch_add(1, Ordering::AcqRel);
        }
        permit.send(request);
        Ok(())
    }

    /// Gracefully shuts down all workers in the pool.
    ///
    /// - Refuses new batches.
    /// - Waits up to the configured shutdown timeout for queued batches to
    ///   finish.
    /// - Cancels the shared [`CancellationToken`]; batches still queued are
    ///   dropped and stay pending in the store.
    /// - Sends a [`WorkRequest::Shutdown`] to each worker and waits for the
    ///   acknowledgements.
    pub async fn shutdown(&self) -> Result<(), Error> {
        // === Phase 0: Stop accepting new batches ===
        tracing::info!("Refusing new batches");
        self.closing.store(true, Ordering::Release);

        // === Phase 1: Let queued batches drain ===
        tracing::info!(in_flight = self.in_flight(), "Draining queued batches");
        let drain_result = timeout(self.shutdown_timeout, async {
            while self.in_flight() > 0 {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await;

        match drain_result {
            Ok(()) => tracing::debug!("All queued batches drained"),
            Err(_) => tracing::warn!(
                in_flight = self.in_flight(),
                "Graceful drain timed out; remaining batches stay pending"
            ),
        }

        // === Phase 2: Cancel any remaining work ===
        tracing::debug!("Cancelling remaining work via shutdown token");
        self.shutdown_token.cancel();

        // === Phase 3: Notify workers to shut down ===
        tracing::debug!("Notifying all workers to shut down");
        let mut shutdown_handles = Vec::with_capacity(self.workers.len());

        for (i, worker) in self.workers.iter().enumerate() {
            let (tx, rx) = oneshot::channel();
            if let Err(e) = worker.send(WorkRequest::Shutdown { response: tx }).await {
                tracing::error!("Failed to send shutdown to worker {i}: {e}");
            } else {
                shutdown_handles.push((i, rx));
            }
        }

        let ack_futures = shutdown_handles.into_iter().map(|(i, rx)| async move {
            match timeout(SHUTDOWN_ACK_TIMEOUT, rx).await {
                Ok(Ok(())) => tracing::trace!("Worker {i} shutdown acknowledged"),
                Ok(Err(e)) => tracing::error!("Worker {i} returned error: {e}"),
                Err(_) => tracing::warn!("Worker {i} shutdown timed out"),
            }
        });

        futures::future::join_all(ack_futures).await;

        tracing::info!("Worker pool shutdown complete");
        Ok(())
    }
}

impl Invoker for WorkerPool {
    async fn invoke(&self, target: &str, payload: serde_json::Value) -> Result<(), InvokeError> {
        if target != self.target {
            return Err(InvokeError::UnknownTarget(target.to_string()));
        }
        let batch = Batch::from_json(payload).map_err(|e| InvokeError::Payload {
            reason: e.to_string(),
        })?;
        self.fulfill(batch)
            .await
            .map_err(|e| InvokeError::Rejected {
                reason: e.to_string(),
            })
    }
}
