//! HTTP service implementation and worker coordination logic.
//!
//! This module contains the client-facing HTTP routes and the shared
//! [`handler::QueueService`] that wires the queue components to the worker
//! pool and the dispatch scheduler.
//!
//! ## Structure
//!
//! - [`handler`] - service state, routes and handlers.
//! - [`error`] - mapping of queue errors onto HTTP responses.
//! - [`config`] - concrete component types used by the service.

pub mod config;
pub mod error;
pub mod handler;
