//! Side journal that records every step of a rollover attempt.
//!
//! The live log file is exactly what is being rotated, so rollover progress
//! cannot be written there. Each attempt appends to `rollover.log` next to
//! the live file instead, one timestamped line per step.
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::clock::Clock;

/// File name of the rollover journal, created in the log directory.
pub const JOURNAL_FILE_NAME: &str = "rollover.log";

/// Step kinds recorded in the journal.
///
/// Each variant maps to a short uppercase tag in the journal line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalEvent {
    /// Rollover attempt begins.
    Start,
    /// Active stream flushed and released.
    Close,
    /// Archive name decided, or a stale archive removed.
    Archive,
    /// Live file renamed to the archive name.
    Rename,
    /// An expired archive is being deleted.
    Prune,
    /// A fresh live stream is being opened.
    Reopen,
    /// Next boundary armed.
    Schedule,
    /// A step failed; the attempt continues.
    Failure,
    /// Attempt finished.
    Done,
}

impl JournalEvent {
    const fn tag(self) -> &'static str {
        match self {
            Self::Start => "START",
            Self::Close => "CLOSE",
            Self::Archive => "ARCHIVE",
            Self::Rename => "RENAME",
            Self::Prune => "PRUNE",
            Self::Reopen => "REOPEN",
            Self::Schedule => "SCHEDULE",
            Self::Failure => "FAILURE",
            Self::Done => "DONE",
        }
    }
}

/// One rollover attempt's view of the journal file.
///
/// Opened at the start of an attempt and closed when dropped. If the
/// journal cannot be opened the attempt still runs; notes are discarded.
pub struct RolloverJournal {
    file: Option<fs::File>,
    path: PathBuf,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for RolloverJournal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RolloverJournal")
            .field("path", &self.path)
            .field("open", &self.file.is_some())
            .finish_non_exhaustive()
    }
}

impl RolloverJournal {
    /// Open the journal in `dir` for appending.
    #[must_use]
    pub fn open(dir: &Path, clock: Arc<dyn Clock>) -> Self {
        let path = dir.join(JOURNAL_FILE_NAME);
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .ok();
        Self { file, path, clock }
    }

    /// Whether notes are actually reaching the file.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Path of the journal file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one step.
    ///
    /// Each line is: `<wall_utc_us> - <TAG> <message>`
    pub fn note(&mut self, event: JournalEvent, message: &str) {
        let Some(file) = self.file.as_mut() else {
            return;
        };
        let wall = self.clock.now().format("%Y-%m-%dT%H:%M:%S%.6fZ");
        let tag = event.tag();
        writeln!(file, "{wall} - {tag:<8} {message}").ok();
    }
}

impl Drop for RolloverJournal {
    fn drop(&mut self) {
        self.note(JournalEvent::Done, "closing journal");
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::logging::clock::ManualClock;

    fn clock() -> Arc<dyn Clock> {
        Arc::new(ManualClock::new(
            "2024-01-16T00:00:00Z".parse().expect("valid instant"),
        ))
    }

    #[test]
    fn journal_is_created_in_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let journal = RolloverJournal::open(tmp.path(), clock());
        assert!(journal.is_open());
        assert_eq!(journal.path(), tmp.path().join(JOURNAL_FILE_NAME));
    }

    #[test]
    fn note_writes_tagged_line() {
        let tmp = tempfile::tempdir().unwrap();
        {
            let mut journal = RolloverJournal::open(tmp.path(), clock());
            journal.note(JournalEvent::Rename, "a -> b");
        }
        let content = fs::read_to_string(tmp.path().join(JOURNAL_FILE_NAME)).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "2024-01-16T00:00:00.000000Z - RENAME   a -> b");
    }

    #[test]
    fn drop_writes_closing_line() {
        let tmp = tempfile::tempdir().unwrap();
        drop(RolloverJournal::open(tmp.path(), clock()));
        let content = fs::read_to_string(tmp.path().join(JOURNAL_FILE_NAME)).unwrap();
        assert!(content.trim_end().ends_with("DONE     closing journal"));
    }

    #[test]
    fn journal_appends_across_attempts() {
        let tmp = tempfile::tempdir().unwrap();
        for _ in 0..2 {
            let mut journal = RolloverJournal::open(tmp.path(), clock());
            journal.note(JournalEvent::Start, "starting rollover");
        }
        let content = fs::read_to_string(tmp.path().join(JOURNAL_FILE_NAME)).unwrap();
        assert_eq!(content.matches("starting rollover").count(), 2);
    }

    #[test]
    fn unopenable_journal_is_silent() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("does-not-exist");
        let mut journal = RolloverJournal::open(&missing, clock());
        assert!(!journal.is_open());
        journal.note(JournalEvent::Failure, "nowhere to go");
        assert!(!missing.exists());
    }
}
