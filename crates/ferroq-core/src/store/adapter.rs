//! Mapping between queue entities and store items.
//!
//! ## Item layout
//!
//! | Entity         | `pk`            | `sk`            | Attributes                 |
//! |----------------|-----------------|-----------------|----------------------------|
//! | Task           | `TASK#{shard}`  | `TASK#{id}`     | `task` (S)                 |
//! | Shard counter  | `COUNT#{shard}` | `COUNT#{shard}` | `count` (N), `ids` (SS)    |
//!
//! Counter items are never written directly: they are created by the first
//! `ADD` update and only ever changed through update expressions, so the
//! count and the id set always move in the same atomic request.

use super::{
    AttributeValue, Item, ItemKey, MAX_BATCH_GET_KEYS, MAX_BATCH_WRITE_KEYS, Store,
    TransactWriteItem, UpdateExpression,
};
use crate::{
    Error, QueueConfig, Result, StoreError,
    deadline::with_deadline,
    types::{ShardCounter, ShardId, Task, TaskId},
};
use core::time::Duration;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

pub const TASK_PREFIX: &str = "TASK#";
pub const COUNT_PREFIX: &str = "COUNT#";
pub const TASK_ATTR: &str = "task";
pub const COUNT_ATTR: &str = "count";
pub const IDS_ATTR: &str = "ids";

/// Key of the task item `(shard, id)`.
pub fn task_key(shard: ShardId, id: &TaskId) -> ItemKey {
    ItemKey::new(format!("{TASK_PREFIX}{shard}"), format!("{TASK_PREFIX}{id}"))
}

/// Key of the counter item for `shard`.
pub fn counter_key(shard: ShardId) -> ItemKey {
    let k = format!("{COUNT_PREFIX}{shard}");
    ItemKey::new(k.clone(), k)
}

fn corrupt(key: &ItemKey, reason: impl Into<String>) -> StoreError {
    StoreError::Corrupt {
        key: key.to_string(),
        reason: reason.into(),
    }
}

/// Decodes a counter item. A missing `ids` attribute is an empty set (stores
/// drop empty sets); a missing `count` is corruption.
pub fn decode_counter(key: &ItemKey, item: &Item) -> core::result::Result<ShardCounter, StoreError> {
    let shard = key
        .sk
        .strip_prefix(COUNT_PREFIX)
        .and_then(|s| s.parse::<u32>().ok())
        .map(ShardId::new)
        .ok_or_else(|| corrupt(key, "sort key is not a counter key"))?;

    let count = match item.get(COUNT_ATTR) {
        Some(AttributeValue::N(n)) => *n,
        Some(_) => return Err(corrupt(key, "`count` is not a number")),
        None => return Err(corrupt(key, "missing `count`")),
    };

    let pending_ids = match item.get(IDS_ATTR) {
        Some(AttributeValue::Ss(ids)) => ids.iter().map(|id| TaskId::new(id.as_str())).collect(),
        Some(_) => return Err(corrupt(key, "`ids` is not a string set")),
        None => BTreeSet::new(),
    };

    Ok(ShardCounter {
        shard,
        count,
        pending_ids,
    })
}

/// Decodes a task item.
pub fn decode_task(key: &ItemKey, item: &Item) -> core::result::Result<Task, StoreError> {
    let shard = key
        .pk
        .strip_prefix(TASK_PREFIX)
        .and_then(|s| s.parse::<u32>().ok())
        .map(ShardId::new)
        .ok_or_else(|| corrupt(key, "partition key is not a task key"))?;
    let id = key
        .sk
        .strip_prefix(TASK_PREFIX)
        .filter(|s| !s.is_empty())
        .map(TaskId::new)
        .ok_or_else(|| corrupt(key, "sort key is not a task key"))?;
    let payload = match item.get(TASK_ATTR) {
        Some(AttributeValue::S(s)) => s.clone(),
        Some(_) => return Err(corrupt(key, "`task` is not a string")),
        None => return Err(corrupt(key, "missing `task`")),
    };
    Ok(Task { shard, id, payload })
}

/// The queue's only interface to persistence.
pub struct TaskStore<S> {
    store: Arc<S>,
    table: String,
    request_timeout: Duration,
}

impl<S> Clone for TaskStore<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            table: self.table.clone(),
            request_timeout: self.request_timeout,
        }
    }
}

impl<S: Store> TaskStore<S> {
    pub fn new(store: Arc<S>, config: &QueueConfig) -> Self {
        Self {
            store,
            table: config.table_name.clone(),
            request_timeout: config.request_timeout,
        }
    }

    /// The underlying store.
    pub const fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Inserts `task` and increments its shard counter in one transaction.
    ///
    /// Either both the task item and the counter update (`count + 1`, id added
    /// to `ids`) are applied, or neither is.
    #[tracing::instrument(skip_all, fields(shard = %task.shard, id = %task.id))]
    pub async fn create_task_and_increment(&self, task: &Task) -> Result<()> {
        let put = TransactWriteItem::Put {
            key: task_key(task.shard, &task.id),
            item: Item::from([(TASK_ATTR.to_string(), AttributeValue::S(task.payload.clone()))]),
        };
        let increment = TransactWriteItem::Update {
            key: counter_key(task.shard),
            update: UpdateExpression::new()
                .add(COUNT_ATTR, 1)
                .add_to_set(IDS_ATTR, [task.id.as_str()]),
        };

        with_deadline("create task", self.request_timeout, async {
            self.store
                .transact_write(&self.table, vec![put, increment])
                .await
                .map_err(Error::from)
        })
        .await
    }

    /// Reads the counters of every shard in `shards`.
    ///
    /// Shards without a counter item yet are reported as empty counters. Any
    /// unprocessed key fails the whole read: a partial view would cause missed
    /// or double-counted batches downstream.
    #[tracing::instrument(skip_all)]
    pub async fn read_counters(
        &self,
        shards: impl IntoIterator<Item = ShardId>,
    ) -> Result<BTreeMap<ShardId, ShardCounter>> {
        let shards: BTreeSet<ShardId> = shards.into_iter().collect();
        let keys: Vec<ItemKey> = shards.iter().map(|s| counter_key(*s)).collect();
        let mut counters: BTreeMap<ShardId, ShardCounter> = shards
            .iter()
            .map(|s| (*s, ShardCounter::empty(*s)))
            .collect();

        for chunk in keys.chunks(MAX_BATCH_GET_KEYS) {
            let out = with_deadline("read counters", self.request_timeout, async {
                self.store
                    .batch_get(&self.table, chunk.to_vec())
                    .await
                    .map_err(Error::from)
            })
            .await?;

            if !out.unprocessed_keys.is_empty() {
                tracing::error!(
                    unprocessed = ?out.unprocessed_keys,
                    "counter read incomplete"
                );
                return Err(StoreError::Unprocessed {
                    requested: chunk.len(),
                    unprocessed: out.unprocessed_keys.len(),
                }
                .into());
            }

            for (key, item) in &out.items {
                let counter = decode_counter(key, item)?;
                if !counter.is_consistent() {
                    tracing::warn!(
                        shard = %counter.shard,
                        count = counter.count,
                        pending = counter.pending_ids.len(),
                        "counter drift detected"
                    );
                }
                counters.insert(counter.shard, counter);
            }
        }

        Ok(counters)
    }

    /// Deletes the task items for `ids` on `shard`, then decrements the shard
    /// counter by `ids.len()` and removes exactly those ids from it.
    ///
    /// The delete and the decrement are separate requests. A failed or
    /// partial delete is logged and the decrement is still applied; a failed
    /// decrement is returned to the caller.
    #[tracing::instrument(skip_all, fields(shard = %shard, n = ids.len()))]
    pub async fn delete_tasks_and_decrement(&self, shard: ShardId, ids: &[TaskId]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let keys: Vec<ItemKey> = ids.iter().map(|id| task_key(shard, id)).collect();
        for chunk in keys.chunks(MAX_BATCH_WRITE_KEYS) {
            let res = with_deadline("delete tasks", self.request_timeout, async {
                self.store
                    .batch_delete(&self.table, chunk.to_vec())
                    .await
                    .map_err(Error::from)
            })
            .await;

            match res {
                Ok(out) if out.unprocessed_keys.is_empty() => {}
                Ok(out) => {
                    tracing::warn!(
                        %shard,
                        ?ids,
                        unprocessed = ?out.unprocessed_keys,
                        "batch delete left items behind; decrementing anyway"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        %shard,
                        ?ids,
                        error = %e,
                        "batch delete failed; decrementing anyway"
                    );
                }
            }
        }

        let delta = i64::try_from(ids.len()).map_err(|_| StoreError::Backend {
            message: "batch too large to decrement".to_string(),
        })?;
        let decrement = UpdateExpression::new()
            .add(COUNT_ATTR, -delta)
            .delete_from_set(IDS_ATTR, ids.iter().map(TaskId::as_str));

        let res = with_deadline("decrement counter", self.request_timeout, async {
            self.store
                .update_item(&self.table, counter_key(shard), decrement)
                .await
                .map_err(Error::from)
        })
        .await;

        if let Err(e) = &res {
            tracing::error!(%shard, ?ids, error = %e, "failed to decrement shard counter");
        }
        res
    }

    /// Reads a single task item.
    pub async fn get_task(&self, shard: ShardId, id: &TaskId) -> Result<Option<Task>> {
        let key = task_key(shard, id);
        let out = with_deadline("get task", self.request_timeout, async {
            self.store
                .batch_get(&self.table, vec![key.clone()])
                .await
                .map_err(Error::from)
        })
        .await?;

        if !out.unprocessed_keys.is_empty() {
            return Err(StoreError::Unprocessed {
                requested: 1,
                unprocessed: out.unprocessed_keys.len(),
            }
            .into());
        }

        out.items
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(k, item)| decode_task(k, item))
            .transpose()
            .map_err(Error::from)
    }
}
