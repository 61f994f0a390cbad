//! Normalized media time shared by all tracks of a session.
//!
//! Track timestamps are integer ticks at a per-track clock rate. [`normalize`]
//! maps them onto [`MediaTime`], a signed nanosecond count, so timestamps of
//! tracks with different clock rates can be compared and subtracted directly.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};
use std::time::Duration;

const NANOS_PER_SEC: i64 = 1_000_000_000;

/// A point or span on the normalized session timeline, in nanoseconds.
///
/// Signed, because the difference between a sample time and a segment start
/// may legitimately be negative (a late sample).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaTime(i64);

impl MediaTime {
    pub const ZERO: MediaTime = MediaTime(0);

    pub const fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    pub const fn from_millis(millis: i64) -> Self {
        Self(millis * 1_000_000)
    }

    pub const fn from_secs(secs: i64) -> Self {
        Self(secs * NANOS_PER_SEC)
    }

    pub const fn as_nanos(self) -> i64 {
        self.0
    }

    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / NANOS_PER_SEC as f64
    }

    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Convert a span back into ticks of `clock_rate`, truncating toward zero.
    ///
    /// Splits seconds and sub-second remainder like [`normalize`]; the result
    /// saturates instead of overflowing.
    pub fn to_ticks(self, clock_rate: u32) -> i64 {
        let rate = i64::from(clock_rate);
        let secs = self.0 / NANOS_PER_SEC;
        let rem = self.0 % NANOS_PER_SEC;
        secs.saturating_mul(rate)
            .saturating_add(rem * rate / NANOS_PER_SEC)
    }

    /// Saturating conversion to a std [`Duration`]; negative spans map to zero.
    pub fn to_duration(self) -> Duration {
        Duration::from_nanos(u64::try_from(self.0).unwrap_or(0))
    }
}

impl From<Duration> for MediaTime {
    fn from(d: Duration) -> Self {
        Self(i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))
    }
}

impl Add for MediaTime {
    type Output = MediaTime;

    fn add(self, rhs: MediaTime) -> MediaTime {
        MediaTime(self.0.saturating_add(rhs.0))
    }
}

impl Sub for MediaTime {
    type Output = MediaTime;

    fn sub(self, rhs: MediaTime) -> MediaTime {
        MediaTime(self.0.saturating_sub(rhs.0))
    }
}

impl fmt::Display for MediaTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}s", self.as_secs_f64())
    }
}

/// Convert a track-native timestamp into normalized media time.
///
/// Pure and total: results outside the representable range (about 292 years)
/// saturate. A zero clock rate is rejected by configuration validation and is
/// treated as 1 here.
pub fn normalize(ticks: i64, clock_rate: u32) -> MediaTime {
    let rate = i64::from(clock_rate.max(1));
    let secs = ticks / rate;
    let rem = ticks % rate;
    MediaTime(
        secs.saturating_mul(NANOS_PER_SEC)
            .saturating_add(rem * NANOS_PER_SEC / rate),
    )
}
