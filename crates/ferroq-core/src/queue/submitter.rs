use crate::{
    Error, QueueConfig, Result, Task,
    id::IdGenerator,
    shard::ShardAssigner,
    store::{Store, TaskStore},
};

/// Accepts new tasks.
pub struct Submitter<S, G, A> {
    store: TaskStore<S>,
    ids: G,
    shards: A,
    max_payload_bytes: usize,
}

impl<S, G, A> Submitter<S, G, A>
where
    S: Store,
    G: IdGenerator,
    A: ShardAssigner,
{
    pub const fn new(store: TaskStore<S>, ids: G, shards: A, config: &QueueConfig) -> Self {
        Self {
            store,
            ids,
            shards,
            max_payload_bytes: config.max_payload_bytes,
        }
    }

    /// Persists `payload` as a new pending task and returns it.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidRequest`] if the payload exceeds the configured size.
    /// - Any store or timeout error from the transactional write. On error
    ///   nothing was written.
    #[tracing::instrument(skip_all, fields(len = tracing::field::Empty))]
    pub async fn submit(&self, payload: impl Into<String>) -> Result<Task> {
        let payload = payload.into();
        tracing::Span::current().record("len", payload.len());
        if payload.len() > self.max_payload_bytes {
            return Err(Error::invalid(format!(
                "task payload is {} bytes, limit is {}",
                payload.len(),
                self.max_payload_bytes
            )));
        }

        let task = Task {
            shard: self.shards.assign(),
            id: self.ids.next_id(),
            payload,
        };
        self.store.create_task_and_increment(&task).await?;
        tracing::debug!(shard = %task.shard, id = %task.id, "task submitted");
        Ok(task)
    }
}
