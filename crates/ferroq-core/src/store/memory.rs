//! In-process store with operation tracing and failure injection.
//!
//! [`MemoryStore`] implements the full [`Store`] contract: transactions are
//! validated as a whole before anything is applied, update expressions are
//! upserts with `ADD`/`DELETE` semantics, and empty string sets are dropped
//! from the item. Every mutation runs under one lock, which is what makes
//! transactions and update expressions atomic here.
//!
//! ## Limitations
//!
//! - Not durable: contents live as long as the process.
//! - Single-process only.

use super::{
    AttributeValue, BatchDeleteOutput, BatchGetOutput, Item, ItemKey, Store, TransactWriteItem,
    UpdateExpression,
};
use crate::StoreError;
use core::time::Duration;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

/// The kind of a store operation, used to target injected failures.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum StoreOpKind {
    TransactWrite,
    BatchGet,
    BatchDelete,
    UpdateItem,
}

/// Record of a store operation for test assertions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreOp {
    TransactWrite { table: String, keys: Vec<ItemKey> },
    BatchGet { table: String, keys: Vec<ItemKey> },
    BatchDelete { table: String, keys: Vec<ItemKey> },
    UpdateItem { table: String, key: ItemKey },
}

impl StoreOp {
    pub const fn kind(&self) -> StoreOpKind {
        match self {
            Self::TransactWrite { .. } => StoreOpKind::TransactWrite,
            Self::BatchGet { .. } => StoreOpKind::BatchGet,
            Self::BatchDelete { .. } => StoreOpKind::BatchDelete,
            Self::UpdateItem { .. } => StoreOpKind::UpdateItem,
        }
    }
}

#[derive(Debug, Default)]
struct State {
    tables: HashMap<String, BTreeMap<ItemKey, Item>>,
    operations: Vec<StoreOp>,
    failures: Vec<StoreOpKind>,
    unprocessed: HashMap<StoreOpKind, usize>,
}

impl State {
    /// Consumes one injected failure for `kind`, if any.
    fn take_failure(&mut self, kind: StoreOpKind) -> Result<(), StoreError> {
        match self.failures.iter().position(|k| *k == kind) {
            Some(idx) => {
                self.failures.remove(idx);
                Err(StoreError::Backend {
                    message: format!("injected {kind:?} failure"),
                })
            }
            None => Ok(()),
        }
    }

    /// Splits `keys` into (processed, unprocessed) according to any injected
    /// unprocessed-key count for `kind`. Unprocessed keys are taken from the
    /// tail.
    fn split_unprocessed(
        &mut self,
        kind: StoreOpKind,
        mut keys: Vec<ItemKey>,
    ) -> (Vec<ItemKey>, Vec<ItemKey>) {
        match self.unprocessed.remove(&kind) {
            Some(n) => {
                let at = keys.len().saturating_sub(n);
                let rest = keys.split_off(at);
                (keys, rest)
            }
            None => (keys, Vec::new()),
        }
    }
}

/// In-memory [`Store`] for tests, local development and the default server
/// backend.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
    latency: Option<Duration>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that sleeps for `latency` before every operation.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    /// Makes the next operation of `kind` fail with [`StoreError::Backend`]
    /// without applying anything. Injections queue up.
    pub fn fail_next(&self, kind: StoreOpKind) {
        self.state.lock().failures.push(kind);
    }

    /// Makes the next operation of `kind` leave its last `count` keys
    /// unprocessed. Only meaningful for batch reads and deletes.
    pub fn leave_unprocessed(&self, kind: StoreOpKind, count: usize) {
        self.state.lock().unprocessed.insert(kind, count);
    }

    /// Returns all recorded operations.
    pub fn operations(&self) -> Vec<StoreOp> {
        self.state.lock().operations.clone()
    }

    /// Clears recorded operations.
    pub fn clear_operations(&self) {
        self.state.lock().operations.clear();
    }

    /// Returns a copy of the item at `key`.
    pub fn get(&self, table: &str, key: &ItemKey) -> Option<Item> {
        self.state
            .lock()
            .tables
            .get(table)
            .and_then(|t| t.get(key))
            .cloned()
    }

    /// Number of items in `table`.
    pub fn len(&self, table: &str) -> usize {
        self.state.lock().tables.get(table).map_or(0, BTreeMap::len)
    }

    pub fn is_empty(&self, table: &str) -> bool {
        self.len(table) == 0
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

/// Applies `update` to `item` in place.
fn apply_update(item: &mut Item, update: &UpdateExpression) -> Result<(), String> {
    for (attr, delta) in &update.add_numbers {
        match item.get_mut(attr) {
            Some(AttributeValue::N(n)) => {
                *n = n
                    .checked_add(*delta)
                    .ok_or_else(|| format!("numeric overflow on `{attr}`"))?;
            }
            Some(_) => return Err(format!("`{attr}` is not a number")),
            None => {
                item.insert(attr.clone(), AttributeValue::N(*delta));
            }
        }
    }

    for (attr, values) in &update.add_to_sets {
        if values.is_empty() {
            return Err(format!("empty set added to `{attr}`"));
        }
        match item.get_mut(attr) {
            Some(AttributeValue::Ss(set)) => set.extend(values.iter().cloned()),
            Some(_) => return Err(format!("`{attr}` is not a string set")),
            None => {
                item.insert(attr.clone(), AttributeValue::Ss(values.clone()));
            }
        }
    }

    for (attr, values) in &update.delete_from_sets {
        match item.get_mut(attr) {
            Some(AttributeValue::Ss(set)) => {
                set.retain(|v| !values.contains(v));
                if set.is_empty() {
                    item.remove(attr);
                }
            }
            Some(_) => return Err(format!("`{attr}` is not a string set")),
            None => {}
        }
    }

    Ok(())
}

impl Store for MemoryStore {
    async fn transact_write(
        &self,
        table: &str,
        items: Vec<TransactWriteItem>,
    ) -> Result<(), StoreError> {
        self.simulate_latency().await;

        let mut state = self.state.lock();
        state.operations.push(StoreOp::TransactWrite {
            table: table.to_string(),
            keys: items.iter().map(|i| i.key().clone()).collect(),
        });
        state.take_failure(StoreOpKind::TransactWrite)?;

        let mut seen = HashSet::with_capacity(items.len());
        if let Some(dup) = items.iter().find(|i| !seen.insert(i.key())) {
            return Err(StoreError::TransactionCanceled {
                reason: format!("multiple operations on {}", dup.key()),
            });
        }

        // Stage every write against a copy first so a failing element leaves
        // the table untouched.
        let current = state.tables.get(table);
        let mut staged = Vec::with_capacity(items.len());
        for write in items {
            match write {
                TransactWriteItem::Put { key, item } => staged.push((key, item)),
                TransactWriteItem::Update { key, update } => {
                    let mut item = current
                        .and_then(|t| t.get(&key))
                        .cloned()
                        .unwrap_or_default();
                    apply_update(&mut item, &update).map_err(|reason| {
                        StoreError::TransactionCanceled {
                            reason: format!("{key}: {reason}"),
                        }
                    })?;
                    staged.push((key, item));
                }
            }
        }

        let table = state.tables.entry(table.to_string()).or_default();
        table.extend(staged);
        Ok(())
    }

    async fn batch_get(&self, table: &str, keys: Vec<ItemKey>) -> Result<BatchGetOutput, StoreError> {
        self.simulate_latency().await;

        let mut state = self.state.lock();
        state.operations.push(StoreOp::BatchGet {
            table: table.to_string(),
            keys: keys.clone(),
        });
        state.take_failure(StoreOpKind::BatchGet)?;

        let (keys, unprocessed_keys) = state.split_unprocessed(StoreOpKind::BatchGet, keys);
        let items = match state.tables.get(table) {
            Some(t) => keys
                .into_iter()
                .filter_map(|key| t.get(&key).cloned().map(|item| (key, item)))
                .collect(),
            None => Vec::new(),
        };

        Ok(BatchGetOutput {
            items,
            unprocessed_keys,
        })
    }

    async fn batch_delete(
        &self,
        table: &str,
        keys: Vec<ItemKey>,
    ) -> Result<BatchDeleteOutput, StoreError> {
        self.simulate_latency().await;

        let mut state = self.state.lock();
        state.operations.push(StoreOp::BatchDelete {
            table: table.to_string(),
            keys: keys.clone(),
        });
        state.take_failure(StoreOpKind::BatchDelete)?;

        let (keys, unprocessed_keys) = state.split_unprocessed(StoreOpKind::BatchDelete, keys);
        if let Some(t) = state.tables.get_mut(table) {
            for key in &keys {
                t.remove(key);
            }
        }

        Ok(BatchDeleteOutput { unprocessed_keys })
    }

    async fn update_item(
        &self,
        table: &str,
        key: ItemKey,
        update: UpdateExpression,
    ) -> Result<(), StoreError> {
        self.simulate_latency().await;

        let mut state = self.state.lock();
        state.operations.push(StoreOp::UpdateItem {
            table: table.to_string(),
            key: key.clone(),
        });
        state.take_failure(StoreOpKind::UpdateItem)?;

        let t = state.tables.entry(table.to_string()).or_default();
        let mut item = t.get(&key).cloned().unwrap_or_default();
        apply_update(&mut item, &update).map_err(|reason| StoreError::Backend {
            message: format!("update of {key} rejected: {reason}"),
        })?;
        t.insert(key, item);
        Ok(())
    }
}
