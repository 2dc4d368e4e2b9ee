//! Hybrid logical clock.

use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

/// A clock reading: wall time in milliseconds plus a logical counter that
/// orders readings sharing the same wall time. Field order gives the total
/// order.
#[derive(
    Debug, Clone, Encode, Decode, Ord, PartialOrd, PartialEq, Eq, Serialize, Deserialize, Default,
)]
pub struct HLC {
    pub timestamp: u64,
    pub counter: u64,
}

impl HLC {
    /// Next local reading after `self`.
    fn advance(&self, wall: u64) -> HLC {
        if wall > self.timestamp {
            HLC {
                timestamp: wall,
                counter: 0,
            }
        } else {
            HLC {
                timestamp: self.timestamp,
                counter: self.counter + 1,
            }
        }
    }

    /// Next reading after both `self` and an observed `remote` reading.
    fn observe(&self, remote: &HLC, wall: u64) -> HLC {
        let timestamp = wall.max(self.timestamp).max(remote.timestamp);
        let counter = match (timestamp == self.timestamp, timestamp == remote.timestamp) {
            (true, true) => self.counter.max(remote.counter) + 1,
            (true, false) => self.counter + 1,
            (false, true) => remote.counter + 1,
            (false, false) => 0,
        };
        HLC { timestamp, counter }
    }
}

/// Hybrid logical clock shared by a node and its stores.
///
/// Every reading is strictly greater than the previous one, and observing a
/// remote timestamp via [`Clock::update`] moves the clock past it.
#[derive(Debug)]
pub struct Clock {
    physical: fn() -> u64,
    last: Mutex<HLC>,
}

impl Default for Clock {
    fn default() -> Self {
        Self::new(now_millis)
    }
}

impl Clock {
    pub fn new(physical: fn() -> u64) -> Self {
        Clock {
            physical,
            last: Mutex::new(HLC::default()),
        }
    }

    pub fn now(&self) -> HLC {
        let now = (self.physical)();
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        *last = last.advance(now);
        last.clone()
    }

    pub fn update(&self, remote: &HLC) -> HLC {
        let now = (self.physical)();
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        *last = last.observe(remote, now);
        last.clone()
    }
}

pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frozen() -> u64 {
        1_000
    }

    #[test]
    fn readings_order_by_timestamp_then_counter() {
        let early = HLC {
            timestamp: 100,
            counter: 5,
        };
        let same_ms = HLC {
            timestamp: 100,
            counter: 6,
        };
        let later = HLC {
            timestamp: 200,
            counter: 0,
        };
        assert!(early < same_ms);
        assert!(same_ms < later);
    }

    #[test]
    fn wall_time_ahead_resets_counter() {
        let clock = Clock::new(frozen);
        let merged = clock.update(&HLC {
            timestamp: 10,
            counter: 9,
        });
        assert_eq!(
            merged,
            HLC {
                timestamp: 1_000,
                counter: 0
            }
        );
    }

    #[test]
    fn clock_readings_are_monotonic_with_frozen_wall_time() {
        let clock = Clock::new(frozen);
        let first = clock.now();
        let second = clock.now();
        assert_eq!(first.timestamp, 1_000);
        assert!(second > first);
    }

    #[test]
    fn clock_update_moves_past_remote() {
        let clock = Clock::new(frozen);
        let remote = HLC {
            timestamp: 5_000,
            counter: 7,
        };
        let merged = clock.update(&remote);
        assert!(merged > remote);
        assert!(clock.now() > merged);
    }
}
