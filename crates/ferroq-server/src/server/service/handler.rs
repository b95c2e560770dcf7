//! HTTP service implementation for the task queue.
//!
//! This module defines [`QueueService`], the shared state behind every route,
//! and [`router`], which exposes it over HTTP.
//!
//! ## Routes
//!
//! | Method | Path        | Success               | Purpose                       |
//! |--------|-------------|-----------------------|-------------------------------|
//! | POST   | `/tasks`    | `204 No Content`      | Submit `{"task": "..."}`      |
//! | POST   | `/dispatch` | `200` + report        | Run one dispatch pass         |
//! | POST   | `/fulfill`  | `202 Accepted`        | Queue `{"shard", "ids"}`      |
//! | GET    | `/counters` | `200` + counters      | Inspect every shard counter   |
//! | GET    | `/health`   | `200 ok`              | `503` once shutdown starts    |
//!
//! ## Responsibilities
//!
//! - Spawn and manage the worker pool that fulfills batches.
//! - Spawn the periodic dispatch scheduler, if enabled.
//! - Validate incoming requests and map failures onto status codes.
//! - Coordinate graceful shutdown.

use crate::server::{
    config::ServerConfig,
    pool::WorkerPool,
    scheduler::{dispatch_loop, run_dispatch},
    service::{
        config::{Backend, QueueDispatcher, QueueSubmitter},
        error::ApiError,
    },
    telemetry::{increment_submit_errors, increment_tasks_submitted},
};
use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use ferroq_core::{
    Batch, Error, ShardCounter, SubmitRequest,
    id::UlidGenerator,
    queue::{DispatchReport, Dispatcher, Fulfiller, Submitter},
    shard::RandomShardAssigner,
    store::{MemoryStore, TaskStore},
};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Shared state of the task queue service.
///
/// Cheap to clone: every component is behind an `Arc` or is itself a handle.
#[derive(Clone)]
pub struct QueueService {
    config: ServerConfig,
    store: TaskStore<Backend>,
    submitter: Arc<QueueSubmitter>,
    dispatcher: QueueDispatcher,
    worker_pool: Arc<WorkerPool>,
    scheduler: Arc<Mutex<Option<JoinHandle<()>>>>,
    scheduler_token: CancellationToken,
}

impl QueueService {
    /// Creates a service over a fresh in-memory store.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_store(config, Arc::new(MemoryStore::new()))
    }

    /// Creates a service over `backend`, spawning the worker pool and, if a
    /// dispatch interval is configured, the dispatch scheduler.
    pub fn with_store(config: ServerConfig, backend: Arc<Backend>) -> Self {
        let queue = &config.queue;
        let store = TaskStore::new(backend, queue);

        let submitter = Submitter::new(
            store.clone(),
            UlidGenerator::new(),
            RandomShardAssigner::new(queue.shard_count),
            queue,
        );

        let worker_pool = Arc::new(WorkerPool::spawn(
            &Fulfiller::new(store.clone(), queue),
            queue.fulfiller_name.clone(),
            config.num_workers,
            config.worker_buffer_size,
            config.shutdown_timeout,
        ));

        let dispatcher = Dispatcher::new(store.clone(), Arc::clone(&worker_pool), queue);

        let scheduler_token = CancellationToken::new();
        let scheduler = config.dispatch_interval.map(|period| {
            tokio::spawn(dispatch_loop(
                dispatcher.clone(),
                period,
                scheduler_token.clone(),
            ))
        });

        Self {
            config,
            store,
            submitter: Arc::new(submitter),
            dispatcher,
            worker_pool,
            scheduler: Arc::new(Mutex::new(scheduler)),
            scheduler_token,
        }
    }

    /// Stops the scheduler, then drains and stops the worker pool.
    ///
    /// A dispatch run already in progress is allowed to finish; its batches
    /// are then drained with everything else.
    pub async fn shutdown(&self) -> Result<(), Error> {
        self.scheduler_token.cancel();
        let scheduler = self.scheduler.lock().take();
        if let Some(handle) = scheduler {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "dispatch scheduler panicked");
            }
        }
        self.worker_pool.shutdown().await
    }
}

/// Builds the HTTP router for `service`.
pub fn router(service: QueueService) -> Router {
    Router::new()
        .route("/tasks", post(submit_task))
        .route("/dispatch", post(dispatch))
        .route("/fulfill", post(fulfill))
        .route("/counters", get(counters))
        .route("/health", get(health))
        .with_state(service)
}

/// `POST /tasks`: persists a new task.
#[tracing::instrument(skip_all, fields(len = body.len()))]
async fn submit_task(
    State(service): State<QueueService>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let res = async {
        let request = SubmitRequest::from_slice(&body)?;
        service.submitter.submit(request.task).await
    }
    .await;

    match res {
        Ok(_) => {
            increment_tasks_submitted();
            Ok(StatusCode::NO_CONTENT)
        }
        Err(e) => {
            increment_submit_errors();
            Err(e.into())
        }
    }
}

/// `POST /dispatch`: runs one dispatch pass and reports what was handed off.
async fn dispatch(State(service): State<QueueService>) -> Result<Json<DispatchReport>, ApiError> {
    Ok(Json(run_dispatch(&service.dispatcher).await?))
}

/// `POST /fulfill`: queues a batch on the worker pool without waiting for it.
async fn fulfill(
    State(service): State<QueueService>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let batch: Batch = serde_json::from_slice(&body).map_err(Error::from)?;
    let queue = &service.config.queue;
    if !queue.contains(batch.shard) {
        return Err(Error::InvalidRequest {
            reason: format!("shard {} is outside 1..={}", batch.shard, queue.shard_count),
        }
        .into());
    }

    service.worker_pool.fulfill(batch).await?;
    Ok(StatusCode::ACCEPTED)
}

/// `GET /counters`: every configured shard counter in shard order.
async fn counters(
    State(service): State<QueueService>,
) -> Result<Json<Vec<ShardCounter>>, ApiError> {
    let counters = service
        .store
        .read_counters(service.config.queue.shards())
        .await?;
    Ok(Json(counters.into_values().collect()))
}

/// `GET /health`
async fn health(State(service): State<QueueService>) -> impl IntoResponse {
    if service.worker_pool.is_accepting() {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "shutting down")
    }
}
