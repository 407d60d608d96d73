//! Wall-clock abstraction.
//!
//! Every timestamp the sync rules write (`lastModified`, `enqueuedAt`,
//! `detectedAt`, `resolvedAt`) comes from a [`Clock`]. Runtime code plugs in a
//! system clock; tests use [`ManualClock`] so orderings are reproducible.

use crate::Timestamp;
use std::sync::atomic::{AtomicU64, Ordering};

/// Source of the current time in milliseconds since the Unix epoch.
pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now(&self) -> Timestamp;
}

/// A clock that only moves when told to.
///
/// Each call to [`Clock::now`] returns the current value; [`ManualClock::tick`]
/// can be used to get strictly increasing timestamps.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    /// Create a clock starting at `start`.
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: AtomicU64::new(start),
        }
    }

    /// Set the current time.
    pub fn set(&self, timestamp: Timestamp) {
        self.now.store(timestamp, Ordering::SeqCst);
    }

    /// Move the clock forward and return the new value.
    pub fn advance(&self, millis: u64) -> Timestamp {
        self.now.fetch_add(millis, Ordering::SeqCst) + millis
    }

    /// Advance by one millisecond and return the new value.
    pub fn tick(&self) -> Timestamp {
        self.advance(1)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}
