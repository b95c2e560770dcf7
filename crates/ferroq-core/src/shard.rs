//! Shard assignment for new tasks.
//!
//! Assignment only spreads load: an uneven distribution costs throughput,
//! never correctness, since every later step reads the shard back from the
//! store.

use crate::types::ShardId;
use rand::Rng;

/// Picks the shard a new task is written under.
pub trait ShardAssigner: Send + Sync {
    fn assign(&self) -> ShardId;
}

/// Uniform random assignment over `1..=shard_count`.
#[derive(Debug, Clone, Copy)]
pub struct RandomShardAssigner {
    shard_count: u32,
}

impl RandomShardAssigner {
    /// A `shard_count` of zero is clamped to one shard.
    pub const fn new(shard_count: u32) -> Self {
        Self {
            shard_count: if shard_count == 0 { 1 } else { shard_count },
        }
    }
}

impl ShardAssigner for RandomShardAssigner {
    fn assign(&self) -> ShardId {
        ShardId::new(rand::rng().random_range(1..=self.shard_count))
    }
}

/// Always assigns the same shard. Useful to pin load in tests and tools.
#[derive(Debug, Clone, Copy)]
pub struct FixedShardAssigner(pub ShardId);

impl ShardAssigner for FixedShardAssigner {
    fn assign(&self) -> ShardId {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn random_assignment_stays_in_range_and_covers_all_shards() {
        let assigner = RandomShardAssigner::new(4);
        let mut seen: HashMap<u32, usize> = HashMap::new();
        for _ in 0..4_000 {
            let shard = assigner.assign().get();
            assert!((1..=4).contains(&shard));
            *seen.entry(shard).or_default() += 1;
        }
        assert_eq!(seen.len(), 4);
        // Loose bound: each shard should get a reasonable share.
        assert!(seen.values().all(|&n| n > 500));
    }

    #[test]
    fn zero_shards_clamps_to_one() {
        let assigner = RandomShardAssigner::new(0);
        assert_eq!(assigner.assign(), ShardId::new(1));
    }

    #[test]
    fn fixed_assignment() {
        let assigner = FixedShardAssigner(ShardId::new(2));
        assert!((0..10).all(|_| assigner.assign() == ShardId::new(2)));
    }
}
