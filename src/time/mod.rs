//! Link clock with beacon-driven synchronization
//!
//! Station time is the medium's monotonic clock plus an offset. Beacons
//! only ever move the offset forward, so every station drifts toward the
//! fastest clock it has heard.

use std::sync::atomic::{AtomicI64, Ordering};

use tracing::debug;

use crate::medium::SharedMedium;

/// Adjusted station clock
pub struct Clock {
    medium: SharedMedium,
    offset: AtomicI64,
}

impl Clock {
    /// Creates a clock over the medium's time base with no offset
    pub fn new(medium: SharedMedium) -> Self {
        Clock {
            medium,
            offset: AtomicI64::new(0),
        }
    }

    /// Current adjusted time in milliseconds
    pub fn now(&self) -> u64 {
        self.medium
            .clock()
            .saturating_add_signed(self.offset.load(Ordering::Acquire))
    }

    /// Current offset from the medium clock
    pub fn offset(&self) -> i64 {
        self.offset.load(Ordering::Acquire)
    }

    /// Moves the clock forward to match a beacon, if the beacon is ahead
    ///
    /// `received_at` is the adjusted time at which the beacon arrived; the
    /// processing delay since then is added to the beacon's timestamp.
    /// Returns the forward jump applied, if any.
    pub fn adjust(&self, beacon_timestamp: u64, received_at: u64) -> Option<u64> {
        let now = self.now();
        let elapsed = now.saturating_sub(received_at);
        let candidate = beacon_timestamp.saturating_add(elapsed);
        if candidate <= now {
            return None;
        }

        let jump = candidate - now;
        let step = i64::try_from(jump).unwrap_or(i64::MAX);
        self.offset.fetch_add(step, Ordering::AcqRel);
        debug!(jump_ms = jump, offset_ms = self.offset(), "Clock advanced from beacon");
        Some(jump)
    }
}
