/// Interval timer driven by an externally supplied "now" (milliseconds).
///
/// Used by the sync engine to space beacons out.  It never reads a clock
/// itself so it behaves the same under a simulated clock.
#[derive(Debug, Clone)]
pub struct MilliTimer {
    last_time: i64,
    interval: i64,
}

impl MilliTimer {
    pub fn build(now: i64, interval: i64) -> MilliTimer {
        MilliTimer {
            last_time: now,
            interval: interval,
        }
    }
    /// true once strictly more than `interval` has passed since the last reset
    pub fn expired(&self, now: i64) -> bool {
        now - self.last_time > self.interval
    }
    pub fn reset(&mut self, now: i64) {
        self.last_time = now;
    }
}
