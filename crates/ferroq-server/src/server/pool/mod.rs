//! Worker pool that runs fulfillment off the request path.
//!
//! ## Structure
//!
//! - [`manager`] - [`WorkerPool`]: round-robin submission, shutdown, and the
//!   [`Invoker`](ferroq_core::invoke::Invoker) the dispatcher fans out through.
//! - [`worker`] - the per-worker receive loop.
//! - [`request`] - messages sent to workers.

pub mod manager;
pub mod request;
pub mod worker;

#[cfg(test)]
mod tests;

pub use manager::WorkerPool;
pub use request::WorkRequest;
