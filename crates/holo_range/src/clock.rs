//! Timestamps and clock sources.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Hybrid timestamp: wall time in nanoseconds plus a logical counter.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Timestamp {
    pub wall_time: i64,
    pub logical: i32,
}

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp {
        wall_time: 0,
        logical: 0,
    };
    pub const MAX: Timestamp = Timestamp {
        wall_time: i64::MAX,
        logical: i32::MAX,
    };

    pub const fn new(wall_time: i64, logical: i32) -> Self {
        Self { wall_time, logical }
    }

    /// Timestamp shifted by the given wall and logical deltas.
    pub fn add(&self, wall_nanos: i64, logical: i32) -> Self {
        Self {
            wall_time: self.wall_time.saturating_add(wall_nanos),
            logical: self.logical.saturating_add(logical),
        }
    }
}

pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall-clock source backed by `SystemTime`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos().min(i64::MAX as u128) as i64)
            .unwrap_or(0);
        Timestamp::new(nanos, 0)
    }
}

/// Manually advanced clock for tests and deterministic tooling.
#[derive(Debug, Default)]
pub struct ManualClock {
    nanos: AtomicI64,
}

impl ManualClock {
    /// Clock frozen at `nanos` until moved.
    pub fn new(nanos: i64) -> Self {
        Self {
            nanos: AtomicI64::new(nanos),
        }
    }

    pub fn set(&self, nanos: i64) {
        self.nanos.store(nanos, Ordering::SeqCst);
    }

    pub fn increment(&self, nanos: i64) {
        self.nanos.fetch_add(nanos, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::new(self.nanos.load(Ordering::SeqCst), 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_order_by_wall_then_logical() {
        assert!(Timestamp::new(1, 5) < Timestamp::new(2, 0));
        assert!(Timestamp::new(2, 0) < Timestamp::new(2, 1));
        assert!(Timestamp::ZERO < Timestamp::MAX);
        assert_eq!(Timestamp::new(5, 1).add(10, 1), Timestamp::new(15, 2));
    }

    #[test]
    fn manual_clock_only_moves_when_told() {
        let clock = ManualClock::new(100);
        assert_eq!(clock.now(), Timestamp::new(100, 0));
        clock.increment(50);
        assert_eq!(clock.now().wall_time, 150);
        clock.set(7);
        assert_eq!(clock.now().wall_time, 7);
    }
}
