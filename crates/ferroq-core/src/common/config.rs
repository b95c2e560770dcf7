use crate::{Error, Result, types::ShardId};
use core::time::Duration;

/// Default number of shards the task namespace is spread over.
pub const DEFAULT_SHARD_COUNT: u32 = 2;

/// Default upper bound on the number of ids in one dispatched batch.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 5;

/// Default upper bound on a task payload, kept below the 400 KB item limit
/// common to document stores.
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 256 * 1024;

/// Default deadline applied to every store call and invoker submission.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration shared by every queue component.
///
/// Constructed once at process start and passed into each component
/// constructor. Nothing in the queue reads the environment on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    /// Name of the store table holding task and counter items.
    pub table_name: String,
    /// Name of the invocation target that fulfills dispatched batches.
    pub fulfiller_name: String,
    /// Number of shards; shards are numbered `1..=shard_count`.
    pub shard_count: u32,
    /// Maximum number of ids per dispatched batch.
    pub max_batch_size: usize,
    /// Maximum size of a task payload in bytes.
    pub max_payload_bytes: usize,
    /// Deadline for a single store call or invoker submission.
    pub request_timeout: Duration,
}

impl QueueConfig {
    /// Creates a configuration with default limits for the given table and
    /// fulfiller target.
    pub fn new(table_name: impl Into<String>, fulfiller_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            fulfiller_name: fulfiller_name.into(),
            shard_count: DEFAULT_SHARD_COUNT,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    #[must_use]
    pub const fn with_shard_count(mut self, shard_count: u32) -> Self {
        self.shard_count = shard_count;
        self
    }

    #[must_use]
    pub const fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size;
        self
    }

    #[must_use]
    pub const fn with_max_payload_bytes(mut self, max_payload_bytes: usize) -> Self {
        self.max_payload_bytes = max_payload_bytes;
        self
    }

    #[must_use]
    pub const fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    /// Checks every field and returns the configuration unchanged if valid.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a name is blank or a limit is zero.
    pub fn validate(self) -> Result<Self> {
        if self.table_name.trim().is_empty() {
            return Err(Error::config("table name must not be empty"));
        }
        if self.fulfiller_name.trim().is_empty() {
            return Err(Error::config("fulfiller name must not be empty"));
        }
        if self.shard_count == 0 {
            return Err(Error::config("shard count must be greater than 0"));
        }
        if self.max_batch_size == 0 {
            return Err(Error::config("max batch size must be greater than 0"));
        }
        if self.max_payload_bytes == 0 {
            return Err(Error::config("max payload bytes must be greater than 0"));
        }
        if self.request_timeout.is_zero() {
            return Err(Error::config("request timeout must be greater than 0"));
        }
        Ok(self)
    }

    /// Every configured shard, in ascending order.
    pub fn shards(&self) -> impl Iterator<Item = ShardId> + use<> {
        (1..=self.shard_count).map(ShardId::new)
    }

    /// Returns `true` if `shard` belongs to the configured shard set.
    pub const fn contains(&self, shard: ShardId) -> bool {
        shard.get() >= 1 && shard.get() <= self.shard_count
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self::new("tasks", "task-fulfiller")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = QueueConfig::default().validate().unwrap();
        assert_eq!(config.shard_count, 2);
        assert_eq!(config.max_batch_size, 5);
        assert_eq!(
            config.shards().collect::<Vec<_>>(),
            vec![ShardId::new(1), ShardId::new(2)]
        );
    }

    #[test]
    fn rejects_invalid_values() {
        let cases = [
            QueueConfig::new("", "f"),
            QueueConfig::new("t", "  "),
            QueueConfig::default().with_shard_count(0),
            QueueConfig::default().with_max_batch_size(0),
            QueueConfig::default().with_max_payload_bytes(0),
            QueueConfig::default().with_request_timeout(Duration::ZERO),
        ];
        for config in cases {
            assert!(matches!(config.validate(), Err(Error::Config { .. })));
        }
    }

    #[test]
    fn shard_membership() {
        let config = QueueConfig::default().with_shard_count(3);
        assert!(!config.contains(ShardId::new(0)));
        assert!(config.contains(ShardId::new(1)));
        assert!(config.contains(ShardId::new(3)));
        assert!(!config.contains(ShardId::new(4)));
    }
}
