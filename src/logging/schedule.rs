//! Rollover schedule arithmetic.
//!
//! Everything here is pure: given an instant and a [`LocalZone`], compute
//! when the next rollover is due and how the archive suffix is spelled.
//! Instants are UTC; local wall-clock time only matters for the
//! midnight-aligned schedules when the schedule is not UTC-anchored.
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, FixedOffset, Offset, TimeDelta, Timelike, Utc};
use serde::{Deserialize, Serialize};

use super::clock::LocalZone;
use crate::error::ConfigError;

const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

/// Unit of the rotation interval.
///
/// `Midnight` and `Weekday` are aligned to the wall clock; the others count
/// from the moment the file was opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum When {
    /// Every `interval` seconds (`S`).
    Seconds,
    /// Every `interval` minutes (`M`).
    Minutes,
    /// Every `interval` hours (`H`).
    Hours,
    /// Every `interval` days, counted from open time (`D`).
    Days,
    /// At midnight (`midnight`).
    Midnight,
    /// At the midnight that ends the given weekday, 0 = Monday (`W0`..`W6`).
    Weekday(u8),
}

impl When {
    const fn unit_secs(self) -> i64 {
        match self {
            Self::Seconds => 1,
            Self::Minutes => 60,
            Self::Hours => 60 * 60,
            Self::Days | Self::Midnight => SECONDS_PER_DAY,
            Self::Weekday(_) => 7 * SECONDS_PER_DAY,
        }
    }

    /// `strftime` pattern used for the archive suffix.
    #[must_use]
    pub const fn suffix_format(self) -> &'static str {
        match self {
            Self::Seconds => "%Y-%m-%d_%H-%M-%S",
            Self::Minutes => "%Y-%m-%d_%H-%M",
            Self::Hours => "%Y-%m-%d_%H",
            Self::Days | Self::Midnight | Self::Weekday(_) => "%Y-%m-%d",
        }
    }

    const fn is_wall_clock_aligned(self) -> bool {
        matches!(self, Self::Midnight | Self::Weekday(_))
    }
}

impl fmt::Display for When {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Seconds => f.write_str("S"),
            Self::Minutes => f.write_str("M"),
            Self::Hours => f.write_str("H"),
            Self::Days => f.write_str("D"),
            Self::Midnight => f.write_str("midnight"),
            Self::Weekday(day) => write!(f, "W{day}"),
        }
    }
}

impl FromStr for When {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, ConfigError> {
        let upper = s.to_ascii_uppercase();
        match upper.as_str() {
            "S" => Ok(Self::Seconds),
            "M" => Ok(Self::Minutes),
            "H" => Ok(Self::Hours),
            "D" => Ok(Self::Days),
            "MIDNIGHT" => Ok(Self::Midnight),
            other => other
                .strip_prefix('W')
                .and_then(|day| day.parse::<u8>().ok())
                .filter(|day| *day <= 6)
                .map(Self::Weekday)
                .ok_or_else(|| ConfigError::UnknownSchedule(s.to_string())),
        }
    }
}

impl TryFrom<String> for When {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, ConfigError> {
        value.parse()
    }
}

impl From<When> for String {
    fn from(when: When) -> Self {
        when.to_string()
    }
}

/// Check that `candidate` has exactly the shape `format` produces.
///
/// Only the fields the suffix formats use are understood: `%Y` is four
/// digits, `%m %d %H %M %S` are two; every other character must match
/// literally.
#[must_use]
pub fn matches_suffix(format: &str, candidate: &str) -> bool {
    let mut text = candidate.chars();
    let mut pattern = format.chars();
    while let Some(c) = pattern.next() {
        if c == '%' {
            let width = match pattern.next() {
                Some('Y') => 4,
                Some('m' | 'd' | 'H' | 'M' | 'S') => 2,
                _ => return false,
            };
            for _ in 0..width {
                if !text.next().is_some_and(|d| d.is_ascii_digit()) {
                    return false;
                }
            }
        } else if text.next() != Some(c) {
            return false;
        }
    }
    text.next().is_none()
}

/// When and how often the live file is rolled over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationSchedule {
    when: When,
    interval: u32,
    utc: bool,
}

impl Default for RotationSchedule {
    fn default() -> Self {
        Self::daily_utc()
    }
}

impl RotationSchedule {
    /// Create a schedule. An `interval` of zero is treated as one.
    #[must_use]
    pub const fn new(when: When, interval: u32, utc: bool) -> Self {
        let interval = if interval == 0 { 1 } else { interval };
        Self {
            when,
            interval,
            utc,
        }
    }

    /// Midnight UTC, every day.
    #[must_use]
    pub const fn daily_utc() -> Self {
        Self::new(When::Midnight, 1, true)
    }

    /// Unit of the schedule.
    #[must_use]
    pub const fn when(&self) -> When {
        self.when
    }

    /// Whether boundaries are computed in UTC rather than local time.
    #[must_use]
    pub const fn is_utc(&self) -> bool {
        self.utc
    }

    /// Length of one rotation period.
    #[must_use]
    pub fn interval(&self) -> TimeDelta {
        TimeDelta::seconds(self.when.unit_secs() * i64::from(self.interval))
    }

    /// `strftime` pattern for archive suffixes.
    #[must_use]
    pub const fn suffix_format(&self) -> &'static str {
        self.when.suffix_format()
    }

    fn offset_at(&self, instant: DateTime<Utc>, zone: &dyn LocalZone) -> FixedOffset {
        if self.utc {
            Utc.fix()
        } else {
            zone.offset_at(instant)
        }
    }

    /// Spell the archive suffix for the period starting at `period_start`.
    #[must_use]
    pub fn format_suffix(&self, period_start: DateTime<Utc>, zone: &dyn LocalZone) -> String {
        period_start
            .with_timezone(&self.offset_at(period_start, zone))
            .format(self.suffix_format())
            .to_string()
    }

    /// First rollover boundary after a file was (re)started at `current`.
    ///
    /// Counting schedules simply add one interval. Midnight schedules roll at
    /// the next local (or UTC) midnight; weekday schedules additionally wait
    /// for the configured day. Boundaries are measured at the offset in force
    /// at `current`; [`Self::next_rollover`] applies the DST shift.
    #[must_use]
    pub fn compute_rollover(&self, current: DateTime<Utc>, zone: &dyn LocalZone) -> DateTime<Utc> {
        if !self.when.is_wall_clock_aligned() {
            return current + self.interval();
        }

        let local = current.with_timezone(&self.offset_at(current, zone));
        let since_midnight = i64::from(local.num_seconds_from_midnight());
        let midnight = current + TimeDelta::seconds(SECONDS_PER_DAY - since_midnight);

        let When::Weekday(target) = self.when else {
            return midnight;
        };
        let day = local.weekday().num_days_from_monday();
        let target = u32::from(target);
        if day == target {
            return midnight;
        }
        let days_to_wait = if day < target {
            target - day
        } else {
            6 - day + target + 1
        };
        midnight + TimeDelta::days(i64::from(days_to_wait))
    }

    /// Boundary to arm after a rollover performed at `current`.
    ///
    /// The result is strictly after `current`. For local midnight-aligned
    /// schedules it is shifted by an hour when a DST transition falls in
    /// between.
    #[must_use]
    pub fn next_rollover(&self, current: DateTime<Utc>, zone: &dyn LocalZone) -> DateTime<Utc> {
        let mut next = self.compute_rollover(current, zone);
        while next <= current {
            next += self.interval();
        }
        if self.when.is_wall_clock_aligned() {
            next = self.adjust_for_dst(current, next, zone);
        }
        next
    }

    fn adjust_for_dst(
        &self,
        current: DateTime<Utc>,
        candidate: DateTime<Utc>,
        zone: &dyn LocalZone,
    ) -> DateTime<Utc> {
        if self.utc {
            return candidate;
        }
        let now = zone.offset_at(current).local_minus_utc();
        let then = zone.offset_at(candidate).local_minus_utc();
        match then.cmp(&now) {
            // clocks go forward before the boundary: local midnight comes an hour sooner
            Ordering::Greater => candidate - TimeDelta::hours(1),
            Ordering::Less => candidate + TimeDelta::hours(1),
            Ordering::Equal => candidate,
        }
    }
}
