//! Monotonic timestamp type shared by recorded and wall-clock time.
//!
//! The trace format represents time as a `[sec, usec]` pair (see
//! `trace::Record`); this type gives that pair a total order and a
//! real-valued view without pulling in a full calendar/timezone dependency
//! for what is, in this engine, just a duration since an arbitrary epoch.

use std::{
    cmp::Ordering,
    ops::{Add, Sub},
    time::{Duration, Instant},
};

use serde::{Deserialize, Serialize};

/// A `(seconds, microseconds)` pair, as recorded in a trace or sampled from
/// the host's monotonic clock at replay time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamp {
    pub sec: i64,
    pub usec: i64,
}

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp { sec: 0, usec: 0 };

    pub fn new(sec: i64, usec: i64) -> Timestamp {
        // normalize so 0 <= usec < 1_000_000
        let extra_sec = usec.div_euclid(1_000_000);
        let usec = usec.rem_euclid(1_000_000);
        Timestamp {
            sec: sec + extra_sec,
            usec,
        }
    }

    pub fn from_float(secs: f64) -> Timestamp {
        let sec = secs.floor() as i64;
        let usec = ((secs - secs.floor()) * 1_000_000.0).round() as i64;
        Timestamp::new(sec, usec)
    }

    pub fn as_float(&self) -> f64 {
        self.sec as f64 + (self.usec as f64) / 1_000_000.0
    }
}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.sec, self.usec).cmp(&(other.sec, other.usec))
    }
}

impl Sub for Timestamp {
    type Output = f64;

    fn sub(self, rhs: Timestamp) -> f64 {
        self.as_float() - rhs.as_float()
    }
}

impl Add<f64> for Timestamp {
    type Output = Timestamp;

    fn add(self, rhs: f64) -> Timestamp {
        Timestamp::from_float(self.as_float() + rhs)
    }
}

/// Wall-clock sampler. A thin wrapper over [`Instant`] so the scheduler can
/// express deadlines as `f64` seconds-from-replay-start, matching the
/// recorded-time arithmetic in `Timestamp`, rather than juggling two
/// incompatible clock types.
#[derive(Debug, Clone, Copy)]
pub struct WallClock {
    origin: Instant,
}

impl WallClock {
    pub fn start() -> WallClock {
        WallClock {
            origin: Instant::now(),
        }
    }

    /// Seconds elapsed since this clock started.
    pub fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

impl Default for WallClock {
    fn default() -> Self {
        Self::start()
    }
}

/// Clamp a possibly-negative duration to zero and cap absurdly large waits,
/// shared by `EventScheduler::wait_time` and the `DumbEventScheduler`.
pub fn as_duration(secs: f64) -> Duration {
    Duration::from_secs_f64(secs.max(0.0))
}
