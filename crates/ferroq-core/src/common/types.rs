//! # Queue Entities
//!
//! This module defines the entities shared by every component of the queue:
//! the shard and task identifiers, the immutable [`Task`], the per-shard
//! [`ShardCounter`] and the ephemeral [`Batch`] that travels from the
//! dispatcher to the fulfiller.
//!
//! ## Wire shapes
//!
//! - [`SubmitRequest`] is the submission body: `{"task": "..."}`.
//! - [`Batch`] doubles as the fulfillment payload: `{"shard": 1, "ids": [..]}`.
//!
//! Both are plain `serde` types so the same definitions are used by the
//! invoker payload, the HTTP interface and the tests.

use core::fmt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Identifier of one shard of the task namespace.
///
/// Shards are numbered from `1` up to the configured shard count.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ShardId(u32);

impl ShardId {
    pub const fn new(shard: u32) -> Self {
        Self(shard)
    }

    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A lexicographically sortable, time-ordered task identifier.
///
/// Produced by an [`IdGenerator`](crate::id::IdGenerator); in production this
/// is the 26 character Crockford base32 form of a ULID.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for TaskId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl AsRef<str> for TaskId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A submitted unit of work. Immutable once created; identity is
/// `(shard, id)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub shard: ShardId,
    pub id: TaskId,
    pub payload: String,
}

/// Pending-work aggregate for a single shard.
///
/// `count` and `pending_ids` are always written together by one atomic store
/// update, so `count == pending_ids.len()` holds for every completed mutation
/// as long as no batch is fulfilled twice.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardCounter {
    pub shard: ShardId,
    pub count: i64,
    pub pending_ids: BTreeSet<TaskId>,
}

impl ShardCounter {
    /// The state of a counter that has never been written.
    pub const fn empty(shard: ShardId) -> Self {
        Self {
            shard,
            count: 0,
            pending_ids: BTreeSet::new(),
        }
    }

    /// Returns `true` if `count` matches the cardinality of `pending_ids`.
    pub fn is_consistent(&self) -> bool {
        usize::try_from(self.count).is_ok_and(|count| count == self.pending_ids.len())
    }

    /// Splits the pending ids into contiguous batches of at most
    /// `max_batch_size` ids. The last batch may be smaller. An empty counter
    /// yields no batches.
    pub fn batches(&self, max_batch_size: usize) -> Vec<Batch> {
        let max_batch_size = max_batch_size.max(1);
        let ids: Vec<&TaskId> = self.pending_ids.iter().collect();
        ids.chunks(max_batch_size)
            .map(|chunk| Batch {
                shard: self.shard,
                ids: chunk.iter().map(|id| (*id).clone()).collect(),
            })
            .collect()
    }
}

/// A bounded group of task ids from one shard, dispatched together.
///
/// Never persisted: it only exists between a dispatch run and the
/// fulfillment invocation it triggers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    pub shard: ShardId,
    pub ids: Vec<TaskId>,
}

impl Batch {
    pub fn new(shard: ShardId, ids: impl IntoIterator<Item = TaskId>) -> Self {
        Self {
            shard,
            ids: ids.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Decodes a batch from an invocation payload.
    pub fn from_json(value: serde_json::Value) -> crate::Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// Encodes the batch as an invocation payload.
    pub fn to_json(&self) -> crate::Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Body accepted by the submission interface.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub task: String,
}

impl SubmitRequest {
    /// Parses a raw request body.
    ///
    /// Any malformed body (not JSON, missing `task`, wrong type) is reported
    /// as [`Error::Serialization`](crate::Error::Serialization).
    pub fn from_slice(body: &[u8]) -> crate::Result<Self> {
        Ok(serde_json::from_slice(body)?)
    }
}
