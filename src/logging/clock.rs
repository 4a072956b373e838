//! Time sources and local-offset lookup.
//!
//! The dispatch thread never calls `Utc::now()` directly: it asks a
//! [`Clock`], so tests can walk a sink across a midnight boundary with a
//! [`ManualClock`]. Local wall-clock questions (DST, rendering timestamps)
//! go through a [`LocalZone`].
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, FixedOffset, Local, Offset, TimeDelta, TimeZone, Utc};

/// Source of the current instant.
pub trait Clock: Send + Sync {
    /// Return the current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// The operating-system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Create a clock frozen at `start`.
    #[must_use]
    pub const fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Jump to `instant`.
    pub fn set(&self, instant: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = instant;
    }

    /// Move forward (or backward, for a negative delta) by `by`.
    pub fn advance(&self, by: TimeDelta) {
        let mut guard = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *guard += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Answers "what is the local UTC offset at this instant".
///
/// A change of offset between two instants is how daylight-saving
/// transitions are detected.
#[cfg_attr(test, mockall::automock)]
pub trait LocalZone {
    /// Offset from UTC in effect at `instant`.
    fn offset_at(&self, instant: DateTime<Utc>) -> FixedOffset;
}

/// The host's configured local time zone.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemZone;

impl LocalZone for SystemZone {
    fn offset_at(&self, instant: DateTime<Utc>) -> FixedOffset {
        Local.offset_from_utc_datetime(&instant.naive_utc()).fix()
    }
}

/// A zone with a constant offset and therefore no DST.
#[derive(Debug, Clone, Copy)]
pub struct FixedZone(FixedOffset);

impl FixedZone {
    /// UTC itself.
    #[must_use]
    pub fn utc() -> Self {
        Self(Utc.fix())
    }

    /// A zone `secs` seconds east of UTC, or `None` if out of range.
    #[must_use]
    pub fn east(secs: i32) -> Option<Self> {
        FixedOffset::east_opt(secs).map(Self)
    }
}

impl LocalZone for FixedZone {
    fn offset_at(&self, _instant: DateTime<Utc>) -> FixedOffset {
        self.0
    }
}

/// Render `instant` in the local offset that `zone` reports for it.
pub fn to_local(instant: DateTime<Utc>, zone: &dyn LocalZone) -> DateTime<FixedOffset> {
    instant.with_timezone(&zone.offset_at(instant))
}
