#![doc = include_str!("../README.md")]

mod common;
pub mod id;
pub mod invoke;
pub mod queue;
pub mod shard;
pub mod store;

pub use common::*;
// Public re-export so downstream crates can reach the ID types via
// `ferroq_core::ferroid`
pub use ferroid;
