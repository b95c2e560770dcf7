//! Durable store abstraction.
//!
//! The queue persists two kinds of items in a single table: task items and
//! per-shard counter items. This module defines the item model and the four
//! primitives the queue needs from a store, and nothing more:
//!
//! - [`Store::transact_write`]: all-or-nothing multi-item write.
//! - [`Store::batch_get`]: batch point read; may leave keys unprocessed.
//! - [`Store::batch_delete`]: batch delete; may leave keys unprocessed.
//! - [`Store::update_item`]: single-item atomic update expression (numeric
//!   `ADD`, set `ADD` and set `DELETE`), applied as an upsert.
//!
//! ## Structure
//!
//! - [`adapter`] - [`TaskStore`], which maps queue entities onto items.
//! - [`memory`] - [`MemoryStore`], an in-process store with the same
//!   semantics plus failure injection.

pub mod adapter;
pub mod memory;

#[cfg(test)]
mod tests;

pub use adapter::TaskStore;
pub use memory::MemoryStore;

use crate::StoreError;
use core::{fmt, future::Future};
use std::collections::{BTreeMap, BTreeSet};

/// Maximum number of keys a single batch read request may carry.
pub const MAX_BATCH_GET_KEYS: usize = 100;

/// Maximum number of keys a single batch write request may carry.
pub const MAX_BATCH_WRITE_KEYS: usize = 25;

/// Primary key of an item: partition key plus sort key.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ItemKey {
    pub pk: String,
    pub sk: String,
}

impl ItemKey {
    pub fn new(pk: impl Into<String>, sk: impl Into<String>) -> Self {
        Self {
            pk: pk.into(),
            sk: sk.into(),
        }
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.pk, self.sk)
    }
}

/// A typed attribute value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AttributeValue {
    /// String.
    S(String),
    /// Number.
    N(i64),
    /// String set. Stores drop a set attribute once it becomes empty.
    Ss(BTreeSet<String>),
}

/// Non-key attributes of an item.
pub type Item = BTreeMap<String, AttributeValue>;

/// An atomic single-item update.
///
/// All clauses are applied together by the store; a caller never reads the
/// item first.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UpdateExpression {
    /// `ADD attr :n` on number attributes. A missing attribute counts as `0`.
    pub add_numbers: Vec<(String, i64)>,
    /// `ADD attr :set` on string set attributes (union).
    pub add_to_sets: Vec<(String, BTreeSet<String>)>,
    /// `DELETE attr :set` on string set attributes (difference).
    pub delete_from_sets: Vec<(String, BTreeSet<String>)>,
}

impl UpdateExpression {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn add(mut self, attr: impl Into<String>, delta: i64) -> Self {
        self.add_numbers.push((attr.into(), delta));
        self
    }

    #[must_use]
    pub fn add_to_set<I, S>(mut self, attr: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.add_to_sets
            .push((attr.into(), values.into_iter().map(Into::into).collect()));
        self
    }

    #[must_use]
    pub fn delete_from_set<I, S>(mut self, attr: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.delete_from_sets
            .push((attr.into(), values.into_iter().map(Into::into).collect()));
        self
    }
}

/// One element of a transactional write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransactWriteItem {
    /// Insert or replace the item at `key`.
    Put { key: ItemKey, item: Item },
    /// Apply `update` to the item at `key`, creating it if missing.
    Update {
        key: ItemKey,
        update: UpdateExpression,
    },
}

impl TransactWriteItem {
    pub const fn key(&self) -> &ItemKey {
        match self {
            Self::Put { key, .. } | Self::Update { key, .. } => key,
        }
    }
}

/// Result of a batch point read.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BatchGetOutput {
    /// Items that exist, with their keys. Missing keys are simply absent.
    pub items: Vec<(ItemKey, Item)>,
    /// Keys the store did not get to. Callers must treat a non-empty list as
    /// an incomplete read.
    pub unprocessed_keys: Vec<ItemKey>,
}

/// Result of a batch delete.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BatchDeleteOutput {
    /// Keys the store did not get to.
    pub unprocessed_keys: Vec<ItemKey>,
}

/// The durable key-value store the queue persists into.
///
/// Implementations must make [`Store::transact_write`] all-or-nothing and
/// [`Store::update_item`] a single atomic read-modify-write that concurrent
/// readers never observe half-applied.
pub trait Store: Send + Sync + 'static {
    fn transact_write(
        &self,
        table: &str,
        items: Vec<TransactWriteItem>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn batch_get(
        &self,
        table: &str,
        keys: Vec<ItemKey>,
    ) -> impl Future<Output = Result<BatchGetOutput, StoreError>> + Send;

    fn batch_delete(
        &self,
        table: &str,
        keys: Vec<ItemKey>,
    ) -> impl Future<Output = Result<BatchDeleteOutput, StoreError>> + Send;

    fn update_item(
        &self,
        table: &str,
        key: ItemKey,
        update: UpdateExpression,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}
