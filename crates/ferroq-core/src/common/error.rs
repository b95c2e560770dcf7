//! Error types for the task queue.
//!
//! This module defines the central `Error` enum, which captures every
//! recoverable and reportable failure of the submission, dispatch and
//! fulfillment paths, together with the two collaborator-specific enums it
//! wraps: [`StoreError`] for the durable store and [`InvokeError`] for the
//! fire-and-forget invoker.
//!
//! ## Error Cases
//! - `Config`: Missing or invalid configuration. Fatal to the invocation.
//! - `Store`: A store operation failed. Always surfaced on write paths.
//! - `Serialization`: A payload could not be decoded. Never retried.
//! - `DispatchSubmission`: A single batch could not be handed to the invoker.
//!   Logged by the dispatcher, which then moves on to the next batch.
//! - `InvalidRequest`: The request was well-formed but out of bounds.
//! - `Timeout`: An operation outlived its request deadline.
//! - `ServiceShutdown`: Work arrived while the service was shutting down.
//! - `ChannelError`: An internal channel between tasks was closed.

use crate::types::{ShardId, TaskId};

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the task queue.
#[derive(Clone, thiserror::Error, Debug)]
pub enum Error {
    /// Configuration is missing or invalid.
    #[error("Config error: {reason}")]
    Config { reason: String },

    /// The durable store rejected or failed an operation.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// A payload could not be decoded.
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// A batch could not be submitted to the invoker.
    #[error("Failed to dispatch {} ids for shard {shard}: {source}", .ids.len())]
    DispatchSubmission {
        shard: ShardId,
        ids: Vec<TaskId>,
        #[source]
        source: InvokeError,
    },

    /// The request was decoded but violates a constraint.
    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    /// The operation did not complete before its deadline.
    #[error("Timed out during {operation}")]
    Timeout { operation: &'static str },

    /// The service is in the process of shutting down.
    #[error("Service is shutting down")]
    ServiceShutdown,

    /// Internal channel send/receive failure (e.g., closed channel).
    #[error("Channel error: {context}")]
    ChannelError { context: String },
}

impl Error {
    pub(crate) fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }

    /// Returns `true` when the failure was caused by the caller's input rather
    /// than by the queue or its collaborators.
    pub const fn is_client_error(&self) -> bool {
        matches!(self, Self::Serialization { .. } | Self::InvalidRequest { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

/// Failures reported by a [`Store`](crate::store::Store) implementation.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
pub enum StoreError {
    /// A transactional write was rejected as a whole; nothing was applied.
    #[error("transaction cancelled: {reason}")]
    TransactionCanceled { reason: String },

    /// A batch operation left keys unprocessed.
    #[error("{unprocessed} of {requested} keys left unprocessed")]
    Unprocessed { requested: usize, unprocessed: usize },

    /// An item exists but does not have the expected shape.
    #[error("corrupt item {key}: {reason}")]
    Corrupt { key: String, reason: String },

    /// The backend itself failed (I/O, throttling, injected failure, ...).
    #[error("backend failure: {message}")]
    Backend { message: String },
}

/// Failures reported by an [`Invoker`](crate::invoke::Invoker) when handing
/// off work. Completion of the work itself is never observed.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
pub enum InvokeError {
    /// No unit of work is registered under the requested name.
    #[error("unknown invocation target `{0}`")]
    UnknownTarget(String),

    /// The transport refused the invocation.
    #[error("invocation rejected: {reason}")]
    Rejected { reason: String },

    /// The payload does not match what the target expects.
    #[error("invalid invocation payload: {reason}")]
    Payload { reason: String },
}
