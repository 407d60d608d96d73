//! Wall clock backed by the system time.

use chrono::Utc;
use clinisync_engine::{Clock, Timestamp};

/// Reads the current UTC time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now().timestamp_millis().max(0) as Timestamp
    }
}
