#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::panic
)]
//! Integration tests for daily rotation: archive naming, retention, the
//! rollover journal and DST-aware boundaries.

mod common;

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, TimeDelta, Utc};
use common::{FILE_NAME, Harness, instant};
use servicelog::logging::{
    Clock, FixedZone, JOURNAL_FILE_NAME, LocalZone, ManualClock, RotatingFileSink,
    RotationOptions, RotationSchedule, When,
};

fn open_sink(dir: &Path, backup_count: usize, clock: &Arc<ManualClock>) -> RotatingFileSink {
    RotatingFileSink::open(
        dir,
        "service.log",
        RotationOptions {
            backup_count,
            reopen_delay: Duration::ZERO,
            ..RotationOptions::default()
        },
        Arc::clone(clock) as Arc<dyn Clock>,
        Arc::new(FixedZone::utc()),
    )
    .expect("sink opens")
}

fn seed_archives(dir: &Path, days: &[u32]) {
    for day in days {
        fs::write(dir.join(format!("service.2024-01-{day:02}.log")), b"old").unwrap();
    }
}

fn archives(dir: &Path) -> Vec<String> {
    common::list(dir)
        .into_iter()
        .filter(|name| name.starts_with("service.2024"))
        .collect()
}

// ---------------------------------------------------------------------------
// Midnight rollover through the logger
// ---------------------------------------------------------------------------

/// Crossing midnight archives yesterday's records and restarts the live file.
#[test]
fn midnight_produces_one_archive_and_fresh_live_file() {
    let h = Harness::started("2024-01-15T23:59:58Z");
    h.log.info("late on the 15th");
    h.log.flush();

    h.clock.advance(TimeDelta::seconds(3));
    h.log.info("early on the 16th");
    h.log.flush();

    let archive = h.path("svc.2024-01-15.log");
    assert_eq!(
        common::read(&archive),
        "2024-01-15T23:59:58 -- svc|INFO    |late on the 15th\n"
    );
    assert_eq!(
        h.live(),
        "2024-01-16T00:00:01 -- svc|INFO    |early on the 16th\n"
    );
    assert_eq!(
        h.files(),
        [JOURNAL_FILE_NAME, "svc.2024-01-15.log", FILE_NAME]
    );
    assert!(h.errors.contents().is_empty());
    h.log.shutdown();
}

/// Console-only records never trigger a rollover.
#[test]
fn debug_records_do_not_rotate() {
    let h = Harness::started("2024-01-15T23:59:58Z");
    h.clock.advance(TimeDelta::seconds(3));
    h.log.debug("console only");
    h.log.flush();
    assert_eq!(h.files(), [FILE_NAME]);
    h.log.shutdown();
}

/// A live file left over from an earlier day is archived under that day.
#[test]
fn stale_live_file_is_archived_by_mtime() {
    let h = Harness::new("2030-06-01T12:00:00Z");
    fs::write(h.path(FILE_NAME), "from an earlier run\n").unwrap();
    let mtime = fs::metadata(h.path(FILE_NAME)).unwrap().modified().unwrap();
    let period = DateTime::<Utc>::from(mtime).format("%Y-%m-%d").to_string();
    h.setup();

    h.log.info("new run");
    h.log.flush();

    let archive = h.path(&format!("svc.{period}.log"));
    assert_eq!(common::read(&archive), "from an earlier run\n");
    assert!(h.live().ends_with("|new run\n"));
    h.log.shutdown();
}

// ---------------------------------------------------------------------------
// Retention
// ---------------------------------------------------------------------------

/// Retention 2 with five older archives keeps only the two newest.
#[test]
fn retention_two_of_five() {
    let tmp = tempfile::tempdir().unwrap();
    seed_archives(tmp.path(), &[10, 11, 12, 13, 14]);
    let clock = Arc::new(ManualClock::new(instant("2024-01-15T12:00:00Z")));
    let mut sink = open_sink(tmp.path(), 2, &clock);
    sink.write_line("today").unwrap();

    clock.set(instant("2024-01-16T00:00:05Z"));
    let report = sink.rollover();
    assert!(report.is_clean(), "{:?}", report.failures);

    assert_eq!(
        archives(tmp.path()),
        ["service.2024-01-14.log", "service.2024-01-15.log"]
    );
    assert_eq!(report.deleted.len(), 4);
    assert!(tmp.path().join("service.log").exists());
}

/// Retention 5 with three archives deletes nothing.
#[test]
fn retention_five_of_three() {
    let tmp = tempfile::tempdir().unwrap();
    seed_archives(tmp.path(), &[12, 13, 14]);
    let clock = Arc::new(ManualClock::new(instant("2024-01-15T12:00:00Z")));
    let mut sink = open_sink(tmp.path(), 5, &clock);

    clock.set(instant("2024-01-16T00:00:05Z"));
    let report = sink.rollover();
    assert!(report.deleted.is_empty());
    assert_eq!(archives(tmp.path()).len(), 4);
}

/// Retention zero never deletes.
#[test]
fn retention_zero_keeps_everything() {
    let tmp = tempfile::tempdir().unwrap();
    seed_archives(tmp.path(), &[1, 2, 3, 4, 5, 6, 7, 8]);
    let clock = Arc::new(ManualClock::new(instant("2024-01-15T12:00:00Z")));
    let mut sink = open_sink(tmp.path(), 0, &clock);

    clock.set(instant("2024-01-16T00:00:05Z"));
    let report = sink.rollover();
    assert!(report.deleted.is_empty());
    assert_eq!(archives(tmp.path()).len(), 9);
}

// ---------------------------------------------------------------------------
// Failure handling
// ---------------------------------------------------------------------------

/// A stale archive for the same period is replaced rather than blocking.
#[test]
fn existing_archive_is_overwritten() {
    let tmp = tempfile::tempdir().unwrap();
    seed_archives(tmp.path(), &[15]);
    let clock = Arc::new(ManualClock::new(instant("2024-01-15T12:00:00Z")));
    let mut sink = open_sink(tmp.path(), 14, &clock);
    sink.write_line("fresh").unwrap();

    clock.set(instant("2024-01-16T00:00:05Z"));
    let report = sink.rollover();
    assert!(report.is_clean(), "{:?}", report.failures);
    assert_eq!(common::read(&report.archive), "fresh\n");
}

/// A rename that cannot happen is journaled and the logger keeps going.
#[test]
fn rename_failure_is_journaled_and_contained() {
    let h = Harness::started("2024-01-15T12:00:00Z");
    h.log.info("before midnight");
    h.log.flush();

    let blocker = h.path("svc.2024-01-15.log");
    fs::create_dir(&blocker).unwrap();
    fs::write(blocker.join("occupied"), b"x").unwrap();

    h.clock.set(instant("2024-01-16T00:00:01Z"));
    h.log.info("after midnight");
    h.log.flush();
    assert!(h.log.is_running());

    let live = h.live();
    assert!(live.contains("before midnight"));
    assert!(live.contains("after midnight"));

    let journal = common::read(&h.path(JOURNAL_FILE_NAME));
    assert!(journal.contains("FAILURE"), "{journal}");
    assert!(journal.contains("rename"), "{journal}");
    assert!(journal.contains("failed step(s)"), "{journal}");
    assert!(journal.trim_end().ends_with("closing journal"));
    h.log.shutdown();
}

// ---------------------------------------------------------------------------
// DST
// ---------------------------------------------------------------------------

/// UTC-5 until `switch`, UTC-4 afterwards.
struct SpringForward {
    switch: DateTime<Utc>,
}

impl LocalZone for SpringForward {
    fn offset_at(&self, instant: DateTime<Utc>) -> FixedOffset {
        let hours = if instant < self.switch { -5 } else { -4 };
        FixedOffset::east_opt(hours * 3600).unwrap()
    }
}

/// A local-midnight sink arms its boundary an hour early across spring-forward.
#[test]
fn local_midnight_boundary_tracks_dst() {
    let tmp = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(instant("2024-03-09T17:00:00Z")));
    let zone = Arc::new(SpringForward {
        switch: instant("2024-03-10T00:00:00Z"),
    });
    let mut sink = RotatingFileSink::open(
        tmp.path(),
        "service.log",
        RotationOptions {
            schedule: RotationSchedule::new(When::Midnight, 1, false),
            reopen_delay: Duration::ZERO,
            ..RotationOptions::default()
        },
        Arc::clone(&clock) as Arc<dyn Clock>,
        zone,
    )
    .unwrap();
    // the first boundary is the plain next midnight at open-time offset
    assert_eq!(sink.next_rollover(), instant("2024-03-10T05:00:00Z"));

    let report = sink.rollover();
    assert_eq!(report.next_rollover, instant("2024-03-10T04:00:00Z"));
}
