use super::Invoker;
use crate::{Batch, InvokeError};
use parking_lot::Mutex;
use std::sync::Arc;

/// A single accepted or rejected submission.
#[derive(Clone, Debug, PartialEq)]
pub struct Invocation {
    pub target: String,
    pub payload: serde_json::Value,
    pub accepted: bool,
}

#[derive(Debug, Default)]
struct State {
    invocations: Vec<Invocation>,
    reject: usize,
}

/// [`Invoker`] that records every submission instead of running it.
///
/// Useful wherever the dispatch side needs to be observed in isolation:
/// tests, dry runs and local tooling.
#[derive(Debug, Clone, Default)]
pub struct RecordingInvoker {
    state: Arc<Mutex<State>>,
}

impl RecordingInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects the next `n` submissions with [`InvokeError::Rejected`].
    pub fn reject_next(&self, n: usize) {
        self.state.lock().reject += n;
    }

    /// All submissions seen so far, in order.
    pub fn invocations(&self) -> Vec<Invocation> {
        self.state.lock().invocations.clone()
    }

    /// Accepted submissions decoded as batches. Payloads that are not
    /// batches are skipped.
    pub fn batches(&self) -> Vec<Batch> {
        self.state
            .lock()
            .invocations
            .iter()
            .filter(|i| i.accepted)
            .filter_map(|i| Batch::from_json(i.payload.clone()).ok())
            .collect()
    }

    pub fn clear(&self) {
        self.state.lock().invocations.clear();
    }
}

impl Invoker for RecordingInvoker {
    async fn invoke(&self, target: &str, payload: serde_json::Value) -> Result<(), InvokeError> {
        let mut state = self.state.lock();
        let accepted = state.reject == 0;
        if !accepted {
            state.reject -= 1;
        }
        state.invocations.push(Invocation {
            target: target.to_string(),
            payload,
            accepted,
        });

        if accepted {
            Ok(())
        } else {
            Err(InvokeError::Rejected {
                reason: "rejected by recording invoker".to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ShardId, TaskId};

    #[tokio::test]
    async fn records_and_rejects() {
        let invoker = RecordingInvoker::new();
        invoker.reject_next(1);
        let batch = Batch::new(ShardId::new(1), [TaskId::from("a")]);

        let first = invoker.invoke("f", batch.to_json().unwrap()).await;
        let second = invoker.invoke("f", batch.to_json().unwrap()).await;

        assert!(matches!(first, Err(InvokeError::Rejected { .. })));
        assert!(second.is_ok());
        assert_eq!(invoker.invocations().len(), 2);
        assert_eq!(invoker.batches(), vec![batch]);
    }
}
