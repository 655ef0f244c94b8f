//! Wall-clock time and the time-wait calculator.
//!
//! Every timed phase (a voting trial, a gathering window) is anchored to a
//! chat message: its creation time, or its edit time once edited. The
//! remaining wait is recomputed from that anchor whenever it is needed, which
//! is what lets a restarted process pick up exactly where it left off.

use std::time::Duration;

use chrono::{DateTime, Datelike, TimeDelta, Utc, Weekday};
use serde::{Deserialize, Serialize};

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a [`Timestamp`] from a [`DateTime<Utc>`].
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Creates a [`Timestamp`] from whole seconds since the Unix epoch.
    pub fn from_unix_seconds(secs: i64) -> Option<Self> {
        DateTime::from_timestamp(secs, 0).map(Self)
    }

    /// Returns the underlying [`DateTime<Utc>`].
    pub fn as_datetime(self) -> DateTime<Utc> {
        self.0
    }

    /// Returns this timestamp shifted forward by `duration`, saturating at the
    /// maximum representable time.
    pub fn plus(self, duration: Duration) -> Self {
        let delta = TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX);
        Self(self.0.checked_add_signed(delta).unwrap_or(DateTime::<Utc>::MAX_UTC))
    }
}

impl Timestamp {
    /// `true` when this instant falls on a Saturday (UTC).
    pub fn is_saturday(self) -> bool {
        self.0.weekday() == Weekday::Sat
    }

    /// Whole days elapsed from `earlier` to `self`, truncated toward zero.
    pub fn days_since(self, earlier: Timestamp) -> i64 {
        (self.0 - earlier.0).num_days()
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

// ---------------------------------------------------------------------------
// Time-wait calculator
// ---------------------------------------------------------------------------

/// Time left until a deadline, split into whole days and the remaining
/// seconds of the last partial day (`seconds < 86_400`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WaitRemaining {
    pub days: u64,
    pub seconds: u64,
}

impl WaitRemaining {
    /// Total remaining wait in seconds.
    pub fn total_seconds(self) -> u64 {
        self.days * SECONDS_PER_DAY + self.seconds
    }

    /// Total remaining wait as a [`Duration`], suitable for `tokio::time::sleep`.
    pub fn as_duration(self) -> Duration {
        Duration::from_secs(self.total_seconds())
    }

    /// `true` when the deadline has already passed.
    pub fn is_elapsed(self) -> bool {
        self.total_seconds() == 0
    }

    /// Hours, minutes and seconds of the partial-day remainder.
    pub fn partial_day(self) -> Hms {
        Hms::from_seconds(self.seconds)
    }
}

/// Computes how long remains until `anchor + window`, as seen at `now`.
///
/// Never negative: a deadline at or before `now` yields `(0, 0)`. Sub-second
/// remainders are truncated.
pub fn remaining_wait(anchor: Timestamp, window: Duration, now: Timestamp) -> WaitRemaining {
    let deadline = anchor.plus(window);
    let left = deadline.as_datetime() - now.as_datetime();
    if left <= TimeDelta::zero() {
        return WaitRemaining::default();
    }
    let total = left.num_seconds().max(0) as u64;
    WaitRemaining {
        days: total / SECONDS_PER_DAY,
        seconds: total % SECONDS_PER_DAY,
    }
}

/// An hours/minutes/seconds breakdown used when announcing windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Hms {
    pub hours: u64,
    pub minutes: u64,
    pub seconds: u64,
}

impl Hms {
    /// Splits `total` seconds; `hours` is unbounded (it is not reduced mod 24).
    pub fn from_seconds(total: u64) -> Self {
        Self {
            hours: total / 3600,
            minutes: (total % 3600) / 60,
            seconds: total % 60,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> Timestamp {
        Timestamp::from_unix_seconds(secs).unwrap()
    }

    #[test]
    fn splits_remaining_into_days_and_seconds() {
        let window = Duration::from_secs(3 * SECONDS_PER_DAY + 125);
        let wait = remaining_wait(at(1_000), window, at(1_000));
        assert_eq!(wait, WaitRemaining { days: 3, seconds: 125 });
        assert_eq!(wait.total_seconds(), 3 * SECONDS_PER_DAY + 125);
    }

    #[test]
    fn counts_down_from_the_anchor() {
        let window = Duration::from_secs(100);
        let wait = remaining_wait(at(1_000), window, at(1_060));
        assert_eq!(wait, WaitRemaining { days: 0, seconds: 40 });
    }

    #[test]
    fn clamps_to_zero_once_the_deadline_passes() {
        let window = Duration::from_secs(600);
        assert_eq!(remaining_wait(at(0), window, at(600)), WaitRemaining::default());
        assert_eq!(remaining_wait(at(0), window, at(601)), WaitRemaining::default());
        assert_eq!(remaining_wait(at(0), window, at(10_000_000)), WaitRemaining::default());
        assert!(remaining_wait(at(0), window, at(601)).is_elapsed());
    }

    #[test]
    fn weekday_and_day_differences() {
        // 1970-01-03 was a Saturday.
        assert!(at(2 * SECONDS_PER_DAY as i64 + 10).is_saturday());
        assert!(!at(0).is_saturday());
        assert_eq!(at(16 * SECONDS_PER_DAY as i64 - 1).days_since(at(0)), 15);
    }

    #[test]
    fn hms_keeps_hours_unbounded() {
        let hms = Hms::from_seconds(2 * SECONDS_PER_DAY + 3_725);
        assert_eq!(
            hms,
            Hms {
                hours: 49,
                minutes: 2,
                seconds: 5
            }
        );
    }
}
