//! HTTP front end, worker pool and background dispatch for the task queue.
//!
//! ## Structure
//!
//! - [`config`] - CLI/environment configuration.
//! - [`service`] - HTTP routes and the shared [`service::handler::QueueService`].
//! - [`pool`] - worker pool that runs fulfillment off the request path.
//! - [`scheduler`] - periodic dispatch loop.
//! - [`telemetry`] - logging, tracing and metrics bootstrap.

pub mod config;
pub mod pool;
pub mod scheduler;
pub mod service;
pub mod telemetry;
