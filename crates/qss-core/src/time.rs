//! Simulation time.
//!
//! [`SimTime`] is a totally ordered number of seconds. NaN is rejected at
//! construction so time values can be sorted, compared and used as calendar
//! keys. `POSITIVE_INFINITY` is the "never" sentinel.

use core::cmp::Ordering;
use core::fmt;

use uom::si::f64::Time as UomTime;
use uom::si::time::second;

use crate::{CoreError, CoreResult};

pub type Time = UomTime;

#[inline]
pub fn s(v: f64) -> Time {
    Time::new::<second>(v)
}

#[derive(Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "f64", into = "f64"))]
pub struct SimTime(f64);

impl SimTime {
    pub const ZERO: SimTime = SimTime(0.0);
    pub const POSITIVE_INFINITY: SimTime = SimTime(f64::INFINITY);

    pub fn new(seconds: f64) -> CoreResult<Self> {
        if seconds.is_nan() {
            return Err(CoreError::NonFinite {
                what: "simulation time",
                value: seconds,
            });
        }
        // -0.0 and 0.0 must be the same instant
        Ok(Self(seconds + 0.0))
    }

    pub fn seconds(self) -> f64 {
        self.0
    }

    pub fn is_positive_infinite(self) -> bool {
        self.0 == f64::INFINITY
    }

    /// Shift by `dt` seconds. A NaN sum (`inf - inf`) saturates to
    /// [`SimTime::POSITIVE_INFINITY`].
    #[must_use]
    pub fn add_secs(self, dt: f64) -> SimTime {
        let t = self.0 + dt;
        if t.is_nan() {
            Self::POSITIVE_INFINITY
        } else {
            Self(t + 0.0)
        }
    }

    /// `self - earlier` in seconds.
    pub fn subtract_to_f64(self, earlier: SimTime) -> f64 {
        self.0 - earlier.0
    }
}

impl PartialEq for SimTime {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SimTime {}

impl PartialOrd for SimTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SimTime {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl core::hash::Hash for SimTime {
    fn hash<H: core::hash::Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

impl TryFrom<f64> for SimTime {
    type Error = CoreError;

    fn try_from(seconds: f64) -> Result<Self, Self::Error> {
        SimTime::new(seconds)
    }
}

impl From<SimTime> for f64 {
    fn from(t: SimTime) -> Self {
        t.0
    }
}

impl TryFrom<Time> for SimTime {
    type Error = CoreError;

    fn try_from(t: Time) -> Result<Self, Self::Error> {
        SimTime::new(t.get::<second>())
    }
}

impl fmt::Debug for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SimTime({})", self.0)
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_positive_infinite() {
            write!(f, "Infinity")
        } else {
            write!(f, "{}", self.0)
        }
    }
}
