//! Scalar quantities used throughout the simulator (spec §3 "Scalar quantities").
//!
//! `Duration` and `TimePoint` are integer nanosecond counts so that event
//! ordering and budget arithmetic are exact; `Frequency`, `Power` and
//! `Energy` wrap floating values but are still totally ordered.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub};

/// A signed nanosecond duration. Arithmetic is closed under +/-; dividing
/// two durations yields a dimensionless ratio.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Duration(i64);

impl Duration {
    pub const ZERO: Duration = Duration(0);
    pub const MAX: Duration = Duration(i64::MAX);

    pub const fn from_nanos(ns: i64) -> Self {
        Duration(ns)
    }

    pub fn from_secs_f64(secs: f64) -> Self {
        Duration((secs * 1_000_000_000.0).round() as i64)
    }

    pub const fn as_nanos(self) -> i64 {
        self.0
    }

    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / 1_000_000_000.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub fn max(self, other: Duration) -> Duration {
        if self.0 >= other.0 {
            self
        } else {
            other
        }
    }

    pub fn min(self, other: Duration) -> Duration {
        if self.0 <= other.0 {
            self
        } else {
            other
        }
    }

    /// Rounds a fractional nanosecond quantity up, never under-delivering
    /// work (spec §4.3 "Completion scheduling").
    pub fn from_secs_f64_ceil(secs: f64) -> Self {
        Duration((secs * 1_000_000_000.0).ceil() as i64)
    }
}

impl Add for Duration {
    type Output = Duration;
    fn add(self, rhs: Duration) -> Duration {
        Duration(self.0 + rhs.0)
    }
}

impl Sub for Duration {
    type Output = Duration;
    fn sub(self, rhs: Duration) -> Duration {
        Duration(self.0 - rhs.0)
    }
}

impl Neg for Duration {
    type Output = Duration;
    fn neg(self) -> Duration {
        Duration(-self.0)
    }
}

impl AddAssign for Duration {
    fn add_assign(&mut self, rhs: Duration) {
        self.0 += rhs.0;
    }
}

impl Div<Duration> for Duration {
    type Output = f64;
    fn div(self, rhs: Duration) -> f64 {
        self.0 as f64 / rhs.0 as f64
    }
}

impl Div<f64> for Duration {
    type Output = Duration;
    fn div(self, rhs: f64) -> Duration {
        Duration((self.0 as f64 / rhs).round() as i64)
    }
}

impl Mul<f64> for Duration {
    type Output = Duration;
    fn mul(self, rhs: f64) -> Duration {
        Duration((self.0 as f64 * rhs).round() as i64)
    }
}

impl Mul<i64> for Duration {
    type Output = Duration;
    fn mul(self, rhs: i64) -> Duration {
        Duration(self.0 * rhs)
    }
}

impl std::fmt::Debug for Duration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ns", self.0)
    }
}

/// A point in simulated time, measured as a `Duration` offset from the
/// zero epoch. `TimePoint + TimePoint` is intentionally not implemented.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimePoint(Duration);

impl TimePoint {
    pub const ZERO: TimePoint = TimePoint(Duration::ZERO);

    pub const fn from_duration_since_epoch(d: Duration) -> Self {
        TimePoint(d)
    }

    pub const fn time_since_epoch(self) -> Duration {
        self.0
    }

    pub fn as_secs_f64(self) -> f64 {
        self.0.as_secs_f64()
    }
}

impl Add<Duration> for TimePoint {
    type Output = TimePoint;
    fn add(self, rhs: Duration) -> TimePoint {
        TimePoint(self.0 + rhs)
    }
}

impl AddAssign<Duration> for TimePoint {
    fn add_assign(&mut self, rhs: Duration) {
        self.0 += rhs;
    }
}

impl Sub<TimePoint> for TimePoint {
    type Output = Duration;
    fn sub(self, rhs: TimePoint) -> Duration {
        self.0 - rhs.0
    }
}

impl Sub<Duration> for TimePoint {
    type Output = TimePoint;
    fn sub(self, rhs: Duration) -> TimePoint {
        TimePoint(self.0 - rhs)
    }
}

impl std::fmt::Debug for TimePoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "t={:?}", self.0)
    }
}

macro_rules! total_ord_f64_newtype {
    ($name:ident, $unit:literal) => {
        #[derive(Clone, Copy, PartialEq, Serialize, Deserialize)]
        pub struct $name(pub f64);

        impl $name {
            pub fn value(self) -> f64 {
                self.0
            }
        }

        impl Eq for $name {}

        impl PartialOrd for $name {
            fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                Some(self.cmp(other))
            }
        }

        impl Ord for $name {
            fn cmp(&self, other: &Self) -> Ordering {
                self.0.total_cmp(&other.0)
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}{}", self.0, $unit)
            }
        }

        impl Add for $name {
            type Output = $name;
            fn add(self, rhs: $name) -> $name {
                $name(self.0 + rhs.0)
            }
        }

        impl AddAssign for $name {
            fn add_assign(&mut self, rhs: $name) {
                self.0 += rhs.0;
            }
        }
    };
}

total_ord_f64_newtype!(Frequency, "MHz");
total_ord_f64_newtype!(Power, "mW");
total_ord_f64_newtype!(Energy, "mJ");

impl Mul<Duration> for Power {
    type Output = Energy;

    /// Integrates power over a (non-negative) interval: mW * s -> mJ.
    fn mul(self, rhs: Duration) -> Energy {
        Energy(self.0 * rhs.as_secs_f64())
    }
}
