use crate::{
    Batch, Error, QueueConfig, Result, ShardId, TaskId,
    deadline::with_deadline,
    invoke::Invoker,
    store::{Store, TaskStore},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One batch that could not be handed to the fulfiller.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchFailure {
    pub shard: ShardId,
    pub ids: Vec<TaskId>,
    pub reason: String,
}

/// Outcome of a single dispatch run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchReport {
    pub shards_read: usize,
    pub batches_dispatched: usize,
    pub ids_dispatched: usize,
    pub failures: Vec<DispatchFailure>,
}

impl DispatchReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Fans pending work out to the fulfiller.
pub struct Dispatcher<S, I> {
    store: TaskStore<S>,
    invoker: Arc<I>,
    config: QueueConfig,
}

impl<S, I> Clone for Dispatcher<S, I> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            invoker: Arc::clone(&self.invoker),
            config: self.config.clone(),
        }
    }
}

impl<S: Store, I: Invoker> Dispatcher<S, I> {
    pub fn new(store: TaskStore<S>, invoker: Arc<I>, config: &QueueConfig) -> Self {
        Self {
            store,
            invoker,
            config: config.clone(),
        }
    }

    /// Runs one dispatch pass over every configured shard.
    ///
    /// Batches are submitted in ascending shard order and never awaited past
    /// submission. A failed submission is logged and recorded in the report;
    /// its ids stay pending for the next run.
    ///
    /// # Errors
    ///
    /// Fails only if the counters cannot be read, in which case nothing was
    /// dispatched.
    #[tracing::instrument(skip_all, fields(shards = self.config.shard_count))]
    pub async fn dispatch(&self) -> Result<DispatchReport> {
        let counters = self.store.read_counters(self.config.shards()).await?;
        let mut report = DispatchReport {
            shards_read: counters.len(),
            ..DispatchReport::default()
        };

        for counter in counters.values() {
            for batch in counter.batches(self.config.max_batch_size) {
                let n = batch.len();
                match self.submit(batch).await {
                    Ok(()) => {
                        report.batches_dispatched += 1;
                        report.ids_dispatched += n;
                    }
                    Err(Error::DispatchSubmission { shard, ids, source }) => {
                        tracing::error!(%shard, ?ids, error = %source, "failed to dispatch batch");
                        report.failures.push(DispatchFailure {
                            shard,
                            ids,
                            reason: source.to_string(),
                        });
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        tracing::info!(
            batches = report.batches_dispatched,
            ids = report.ids_dispatched,
            failed = report.failures.len(),
            "dispatch complete"
        );
        Ok(report)
    }

    /// Hands one batch to the fulfiller target.
    async fn submit(&self, batch: Batch) -> Result<()> {
        let payload = batch.to_json()?;
        let target = self.config.fulfiller_name.as_str();
        let res = with_deadline("dispatch batch", self.config.request_timeout, async {
            Ok(self.invoker.invoke(target, payload).await)
        })
        .await;

        match res {
            Ok(Ok(())) => Ok(()),
            Ok(Err(source)) => Err(Error::DispatchSubmission {
                shard: batch.shard,
                ids: batch.ids,
                source,
            }),
            Err(Error::Timeout { operation }) => Err(Error::DispatchSubmission {
                shard: batch.shard,
                ids: batch.ids,
                source: crate::InvokeError::Rejected {
                    reason: format!("timed out during {operation}"),
                },
            }),
            Err(e) => Err(e),
        }
    }
}
