use crate::{
    Error, QueueConfig, Result, ShardId, TaskId,
    store::{Store, TaskStore},
};
use std::collections::HashSet;

/// Completes dispatched batches.
pub struct Fulfiller<S> {
    store: TaskStore<S>,
    config: QueueConfig,
}

impl<S> Clone for Fulfiller<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            config: self.config.clone(),
        }
    }
}

impl<S: Store> Fulfiller<S> {
    pub fn new(store: TaskStore<S>, config: &QueueConfig) -> Self {
        Self {
            store,
            config: config.clone(),
        }
    }

    /// Deletes the tasks `ids` on `shard` and decrements the shard counter by
    /// `ids.len()`.
    ///
    /// Not idempotent: fulfilling the same batch twice decrements twice.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidRequest`] for a shard outside the configured range or
    ///   a batch that repeats an id. Nothing is touched in that case.
    /// - Any store or timeout error from the decrement.
    #[tracing::instrument(skip_all, fields(%shard, n = ids.len()))]
    pub async fn fulfill(&self, shard: ShardId, ids: &[TaskId]) -> Result<()> {
        if !self.config.contains(shard) {
            return Err(Error::invalid(format!(
                "shard {shard} is outside 1..={}",
                self.config.shard_count
            )));
        }
        if ids.is_empty() {
            return Ok(());
        }
        let mut seen = HashSet::with_capacity(ids.len());
        if let Some(dup) = ids.iter().find(|id| !seen.insert(*id)) {
            return Err(Error::invalid(format!("id {dup} appears twice in batch")));
        }

        self.store.delete_tasks_and_decrement(shard, ids).await?;
        tracing::debug!(%shard, n = ids.len(), "batch fulfilled");
        Ok(())
    }
}
