use ferroq_core::{
    id::UlidGenerator,
    queue::{Dispatcher, Submitter},
    shard::RandomShardAssigner,
    store::MemoryStore,
};

use crate::server::pool::WorkerPool;

/// Store backing the service.
///
/// Swapping in a networked store only requires a [`ferroq_core::store::Store`]
/// implementation and a change here.
pub type Backend = MemoryStore;

/// Submitter used for `POST /tasks`.
pub type QueueSubmitter = Submitter<Backend, UlidGenerator, RandomShardAssigner>;

/// Dispatcher fanning out to the in-process worker pool.
pub type QueueDispatcher = Dispatcher<Backend, WorkerPool>;
