//! Temporal scalars carried by the extended JSON codec.
//!
//! Both types hold microsecond precision, which is what the wire format can
//! express. Constructors truncate anything finer so that a value always
//! survives an encode/decode cycle unchanged.
//!
//! # Wire format
//!
//! * [`Instant`] renders as `YYYY-MM-DDTHH:MM:SS.ffffff` (naive, no zone).
//! * [`Interval`] renders as `<days>:<micros>` where `micros` is the
//!   normalised sub-day remainder.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, TimeDelta, Timelike, Utc};

/// Microseconds in one day; upper bound (exclusive) of [`Interval::micros`].
pub const MICROS_PER_DAY: i64 = 86_400_000_000;

const INSTANT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// Failure to parse a temporal wire payload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ParseTemporalError(String);

/// A naive point in time (date plus time of day) at microsecond precision.
///
/// No timezone is attached and none is ever applied: the gateway carries
/// instants opaquely between caller and procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Instant(NaiveDateTime);

impl Instant {
    /// Wraps a `NaiveDateTime`, truncating it to whole microseconds.
    #[must_use]
    pub fn new(datetime: NaiveDateTime) -> Self {
        let nanos = datetime.nanosecond();
        let truncated = datetime
            .with_nanosecond(nanos - nanos % 1_000)
            .unwrap_or(datetime);
        Self(truncated)
    }

    /// Builds an instant from calendar fields. Returns `None` for invalid dates or times.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn from_ymd_hms_micro(
        year: i32,
        month: u32,
        day: u32,
        hour: u32,
        minute: u32,
        second: u32,
        micro: u32,
    ) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day)?
            .and_hms_micro_opt(hour, minute, second, micro)
            .map(Self)
    }

    /// The current UTC wall-clock time as a naive instant.
    #[must_use]
    pub fn now() -> Self {
        Self::new(Utc::now().naive_utc())
    }

    /// Returns the underlying `chrono` value.
    #[must_use]
    pub fn as_naive(&self) -> NaiveDateTime {
        self.0
    }
}

impl From<NaiveDateTime> for Instant {
    fn from(datetime: NaiveDateTime) -> Self {
        Self::new(datetime)
    }
}

impl fmt::Display for Instant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(INSTANT_FORMAT))
    }
}

impl FromStr for Instant {
    type Err = ParseTemporalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<NaiveDateTime>()
            .map(Self::new)
            .map_err(|e| ParseTemporalError(format!("expected YYYY-MM-DDTHH:MM:SS[.ffffff]: {e}")))
    }
}

/// A signed elapsed duration: whole days plus a sub-day remainder.
///
/// The remainder is always normalised into `0..MICROS_PER_DAY`, so a
/// negative interval carries a negative day count and a positive remainder
/// (minus one microsecond is `-1` days and `86_399_999_999` micros).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Interval {
    days: i64,
    micros: i64,
}

impl Interval {
    /// Builds a normalised interval. Returns `None` if the day count overflows.
    #[must_use]
    pub fn new(days: i64, micros: i64) -> Option<Self> {
        let carry = micros.div_euclid(MICROS_PER_DAY);
        Some(Self {
            days: days.checked_add(carry)?,
            micros: micros.rem_euclid(MICROS_PER_DAY),
        })
    }

    /// Builds an interval from days and seconds, like a calendar-style constructor.
    #[must_use]
    pub fn from_days_seconds(days: i64, seconds: i64) -> Option<Self> {
        Self::new(days, seconds.checked_mul(1_000_000)?)
    }

    /// Converts a `chrono::TimeDelta`, truncating sub-microsecond precision.
    #[must_use]
    pub fn from_time_delta(delta: TimeDelta) -> Self {
        let days = delta.num_days();
        let remainder = delta - TimeDelta::days(days);
        // |remainder| < 1 day, which always fits in microseconds.
        let micros = remainder.num_microseconds().unwrap_or(0);
        if micros < 0 {
            Self {
                days: days - 1,
                micros: micros + MICROS_PER_DAY,
            }
        } else {
            Self { days, micros }
        }
    }

    /// Converts back to `chrono`. Returns `None` when out of `TimeDelta` range.
    #[must_use]
    pub fn to_time_delta(&self) -> Option<TimeDelta> {
        TimeDelta::try_days(self.days)?.checked_add(&TimeDelta::microseconds(self.micros))
    }

    /// Whole days, possibly negative.
    #[must_use]
    pub fn days(&self) -> i64 {
        self.days
    }

    /// Sub-day remainder in microseconds, always in `0..MICROS_PER_DAY`.
    #[must_use]
    pub fn micros(&self) -> i64 {
        self.micros
    }
}

impl From<TimeDelta> for Interval {
    fn from(delta: TimeDelta) -> Self {
        Self::from_time_delta(delta)
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.days, self.micros)
    }
}

impl FromStr for Interval {
    type Err = ParseTemporalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (days, micros) = s
            .split_once(':')
            .ok_or_else(|| ParseTemporalError("expected <days>:<micros>".to_string()))?;
        let days: i64 = days
            .trim()
            .parse()
            .map_err(|e| ParseTemporalError(format!("bad day count {days:?}: {e}")))?;
        let micros: i64 = micros
            .trim()
            .parse()
            .map_err(|e| ParseTemporalError(format!("bad microsecond count {micros:?}: {e}")))?;
        Self::new(days, micros).ok_or_else(|| ParseTemporalError("interval out of range".to_string()))
    }
}
