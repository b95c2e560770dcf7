//! Task identifier generation.
//!
//! Task ids are ULIDs rendered in Crockford base32: 26 characters, a 48-bit
//! millisecond timestamp followed by 80 random bits, so ids sort by creation
//! time.
//!
//! [`UlidGenerator`] wraps ferroid's lock-based monotonic generator: ids
//! produced by one process in the same millisecond still increase strictly,
//! and an exhausted random component waits for the next millisecond instead of
//! failing.
//!
//! Ordering is an aid for debugging. Nothing in the queue relies on it for
//! correctness.

use crate::types::TaskId;
use ferroid::{
    base32::Base32UlidExt,
    generator::{IdGenStatus, LockMonoUlidGenerator},
    id::ULID,
    rand::{RandSource, ThreadRandom},
    time::{MonotonicClock, TimeSource},
};

/// Produces unique task identifiers.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> TaskId;
}

/// Process-wide monotonic ULID generator.
pub struct UlidGenerator<T = MonotonicClock, R = ThreadRandom>
where
    T: TimeSource<u128>,
    R: RandSource<u128>,
{
    inner: LockMonoUlidGenerator<ULID, T, R>,
}

impl UlidGenerator {
    /// Creates a generator on the Unix-epoch monotonic clock.
    pub fn new() -> Self {
        Self::with_sources(MonotonicClock::default(), ThreadRandom)
    }
}

impl Default for UlidGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, R> UlidGenerator<T, R>
where
    T: TimeSource<u128>,
    R: RandSource<u128>,
{
    pub fn with_sources(time: T, rng: R) -> Self {
        Self {
            inner: LockMonoUlidGenerator::new(time, rng),
        }
    }

    /// Returns the next ULID, strictly greater than every ULID previously
    /// returned by this generator.
    ///
    /// Yields the thread while the generator is pending on the clock.
    pub fn next_ulid(&self) -> ULID {
        loop {
            match self.inner.next_id() {
                IdGenStatus::Ready { id } => break id,
                IdGenStatus::Pending { .. } => std::thread::yield_now(),
            }
        }
    }
}

impl<T, R> IdGenerator for UlidGenerator<T, R>
where
    T: TimeSource<u128> + Send + Sync,
    R: RandSource<u128> + Send + Sync,
{
    fn next_id(&self) -> TaskId {
        TaskId::new(self.next_ulid().encode().as_str())
    }
}
