//! The three operations of the queue.
//!
//! - [`Submitter`]: accepts a payload, assigns shard and id, persists the task
//!   and increments its shard counter in one transaction.
//! - [`Dispatcher`]: reads every shard counter, partitions the pending ids
//!   into bounded batches and hands each batch to the fulfiller without
//!   waiting for it.
//! - [`Fulfiller`]: deletes a batch of tasks and decrements their shard
//!   counter.
//!
//! Each operation is a short-lived, stateless call against shared
//! collaborators; any number of them may run concurrently.

mod dispatcher;
mod fulfiller;
mod submitter;


pub use dispatcher::{DispatchFailure, DispatchReport, Dispatcher};
pub use fulfiller::Fulfiller;
pub use submitter::Submitter;
