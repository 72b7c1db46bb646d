//! The clock used to stamp commands and sync beacons.
//!
//! Time on the wire is "milliseconds since local midnight".  The numbers stay
//! small enough for the synths to handle without 64 bit math, but they wrap
//! back to zero once a day.  The synths assume the same convention so the
//! wrap is kept as is.  A sync run that straddles midnight will see bogus
//! round trip times for the beacons sent before the wrap.
use chrono::{DateTime, Local, TimeZone, Timelike};

#[cfg(test)]
use mockall::automock;

/// Number of milliseconds in a day.  Timestamps are always below this.
pub const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// Anything that can tell the controller what time it is.
///
/// The sync engine and the command sender only ever ask for "now", so tests
/// can hand them a simulated clock.
#[cfg_attr(test, automock)]
pub trait Clock {
    fn now_millis(&self) -> i64;
}

/// Wall clock implementation of [`Clock`] (local time of day)
#[derive(Debug, Default, Clone, Copy)]
pub struct AllesClock;

impl Clock for AllesClock {
    fn now_millis(&self) -> i64 {
        alles_ms()
    }
}

/// milliseconds since the start of today (local time)
pub fn alles_ms() -> i64 {
    millis_since_midnight(&Local::now())
}

/// milliseconds between local midnight of the day `t` falls on and `t`
pub fn millis_since_midnight<Tz: TimeZone>(t: &DateTime<Tz>) -> i64 {
    let secs = t.num_seconds_from_midnight() as i64;
    // nanosecond() can exceed 1e9 during a leap second
    let millis = (t.nanosecond() / 1_000_000).min(999) as i64;
    secs * 1000 + millis
}
