//! Time-based rotating file sink.
//!
//! The sink owns the live log file. When the armed boundary passes, the next
//! write first rolls the file over: the live file is renamed to
//! `<stem>.<suffix>.<ext>`, archives beyond the retention count are deleted,
//! and a fresh live file is opened. Every step is journaled and no step
//! aborts the attempt.
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::clock::{Clock, LocalZone};
use super::journal::{JournalEvent, RolloverJournal};
use super::schedule::{RotationSchedule, matches_suffix};
use crate::error::{RotationError, SinkError};

/// Tunables of a [`RotatingFileSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationOptions {
    /// When rollovers happen.
    pub schedule: RotationSchedule,
    /// Archives to keep; zero keeps all of them.
    pub backup_count: usize,
    /// Archive extension, without the dot.
    pub extension: String,
    /// Pause between releasing the old file and opening the new one.
    pub reopen_delay: Duration,
}

impl Default for RotationOptions {
    fn default() -> Self {
        Self {
            schedule: RotationSchedule::daily_utc(),
            backup_count: 14,
            extension: "log".to_string(),
            reopen_delay: Duration::from_secs(2),
        }
    }
}

/// Outcome of one rollover attempt.
#[derive(Debug)]
pub struct RolloverReport {
    /// Archive the live file was (or should have been) renamed to.
    pub archive: PathBuf,
    /// Expired archives that were deleted.
    pub deleted: Vec<PathBuf>,
    /// Steps that failed, in order.
    pub failures: Vec<RotationError>,
    /// Boundary armed for the next attempt.
    pub next_rollover: DateTime<Utc>,
}

impl RolloverReport {
    /// True if every step succeeded.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    fn fail(&mut self, journal: &mut RolloverJournal, err: RotationError) {
        journal.note(JournalEvent::Failure, &err.to_string());
        self.failures.push(err);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpenMode {
    Append,
    Truncate,
}

fn open_stream(path: &Path, mode: OpenMode) -> std::io::Result<BufWriter<fs::File>> {
    let mut options = fs::OpenOptions::new();
    options.create(true);
    match mode {
        OpenMode::Append => options.append(true),
        OpenMode::Truncate => options.write(true).truncate(true),
    };
    options.open(path).map(BufWriter::new)
}

/// Archive stem for a live file name: a trailing `.log` is dropped.
#[must_use]
pub fn archive_stem(file_name: &str) -> &str {
    file_name.strip_suffix(".log").unwrap_or(file_name)
}

/// Pick the archives in `names` that exceed `backup_count`.
///
/// A name is an archive of `stem` only if it is exactly
/// `<stem>.<suffix>.<extension>` and the suffix has the shape of
/// `suffix_format`. Archives sort chronologically by name; the oldest ones
/// beyond `backup_count` are returned. A `backup_count` of zero keeps
/// everything.
#[must_use]
pub fn expired_archives(
    names: &[String],
    stem: &str,
    extension: &str,
    suffix_format: &str,
    backup_count: usize,
) -> Vec<String> {
    if backup_count == 0 {
        return Vec::new();
    }
    let mut archives: Vec<&String> = names
        .iter()
        .filter(|name| {
            name.strip_prefix(stem)
                .and_then(|rest| rest.strip_prefix('.'))
                .and_then(|rest| rest.strip_suffix(extension))
                .and_then(|rest| rest.strip_suffix('.'))
                .is_some_and(|suffix| matches_suffix(suffix_format, suffix))
        })
        .collect();
    if archives.len() <= backup_count {
        return Vec::new();
    }
    archives.sort();
    let excess = archives.len() - backup_count;
    archives.into_iter().take(excess).cloned().collect()
}

/// A log file that is renamed aside and restarted on a schedule.
pub struct RotatingFileSink {
    directory: PathBuf,
    file_name: String,
    path: PathBuf,
    stream: Option<BufWriter<fs::File>>,
    options: RotationOptions,
    rollover_at: DateTime<Utc>,
    clock: Arc<dyn Clock>,
    zone: Arc<dyn LocalZone + Send + Sync>,
}

impl std::fmt::Debug for RotatingFileSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RotatingFileSink")
            .field("path", &self.path)
            .field("open", &self.stream.is_some())
            .field("options", &self.options)
            .field("rollover_at", &self.rollover_at)
            .finish_non_exhaustive()
    }
}

impl RotatingFileSink {
    /// Open `directory/file_name` for appending and arm the first boundary.
    ///
    /// The first boundary counts from the file's modification time when it
    /// already exists, so a file left over from an earlier period is
    /// archived on the first write.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Open`] if the file cannot be opened.
    pub fn open(
        directory: &Path,
        file_name: &str,
        options: RotationOptions,
        clock: Arc<dyn Clock>,
        zone: Arc<dyn LocalZone + Send + Sync>,
    ) -> Result<Self, SinkError> {
        let path = directory.join(file_name);
        let reference = fs::metadata(&path)
            .and_then(|meta| meta.modified())
            .map_or_else(|_| clock.now(), DateTime::<Utc>::from);
        let rollover_at = options.schedule.compute_rollover(reference, zone.as_ref());
        let stream = open_stream(&path, OpenMode::Append).map_err(|source| SinkError::Open {
            path: path.clone(),
            source,
        })?;
        Ok(Self {
            directory: directory.to_path_buf(),
            file_name: file_name.to_string(),
            path,
            stream: Some(stream),
            options,
            rollover_at,
            clock,
            zone,
        })
    }

    /// Path of the live file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Boundary at which the next write rolls over.
    #[must_use]
    pub const fn next_rollover(&self) -> DateTime<Utc> {
        self.rollover_at
    }

    /// Whether a live stream is currently held.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// True once the clock has reached the armed boundary.
    #[must_use]
    pub fn should_rollover(&self) -> bool {
        self.clock.now() >= self.rollover_at
    }

    /// Archive path for the period that started at `period_start`.
    #[must_use]
    pub fn archive_path(&self, period_start: DateTime<Utc>) -> PathBuf {
        let suffix = self
            .options
            .schedule
            .format_suffix(period_start, self.zone.as_ref());
        self.directory.join(format!(
            "{}.{suffix}.{}",
            archive_stem(&self.file_name),
            self.options.extension
        ))
    }

    /// Write one formatted line, rolling over first if the boundary passed.
    ///
    /// The line is flushed before returning. If an earlier rollover left no
    /// live stream, one is opened in append mode.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] if the live file cannot be opened or written.
    pub fn write_line(&mut self, line: &str) -> Result<(), SinkError> {
        if self.should_rollover() {
            let _report = self.rollover();
        }
        let stream = match self.stream.take() {
            Some(stream) => stream,
            None => open_stream(&self.path, OpenMode::Append).map_err(|source| {
                SinkError::Open {
                    path: self.path.clone(),
                    source,
                }
            })?,
        };
        let stream = self.stream.insert(stream);
        writeln!(stream, "{line}")
            .and_then(|()| stream.flush())
            .map_err(|source| SinkError::Write {
                path: self.path.clone(),
                source,
            })
    }

    /// Rotate the live file now.
    ///
    /// Runs every step regardless of earlier failures and always re-arms
    /// the next boundary.
    pub fn rollover(&mut self) -> RolloverReport {
        let mut journal = RolloverJournal::open(&self.directory, Arc::clone(&self.clock));
        journal.note(JournalEvent::Start, "starting rollover");

        let period_start = self.rollover_at - self.options.schedule.interval();
        let archive = self.archive_path(period_start);
        let mut report = RolloverReport {
            archive: archive.clone(),
            deleted: Vec::new(),
            failures: Vec::new(),
            next_rollover: self.rollover_at,
        };

        if let Some(stream) = self.stream.take() {
            journal.note(JournalEvent::Close, "flushing and closing active stream");
            match stream.into_inner() {
                Ok(file) => {
                    if let Err(err) = file.sync_all() {
                        report.fail(&mut journal, RotationError::Close(err));
                    }
                }
                Err(err) => report.fail(&mut journal, RotationError::Flush(err.into_error())),
            }
        }

        journal.note(
            JournalEvent::Archive,
            &format!("archive name is {}", archive.display()),
        );
        if archive.exists() {
            journal.note(JournalEvent::Archive, "removing existing archive");
            if let Err(source) = fs::remove_file(&archive) {
                report.fail(
                    &mut journal,
                    RotationError::RemoveExisting {
                        path: archive.clone(),
                        source,
                    },
                );
            }
        }

        journal.note(
            JournalEvent::Rename,
            &format!("{} -> {}", self.path.display(), archive.display()),
        );
        let renamed = match fs::rename(&self.path, &archive) {
            Ok(()) => true,
            Err(source) => {
                report.fail(
                    &mut journal,
                    RotationError::Rename {
                        from: self.path.clone(),
                        to: archive,
                        source,
                    },
                );
                false
            }
        };

        if self.options.backup_count > 0 {
            self.prune(&mut report, &mut journal);
        }

        journal.note(JournalEvent::Reopen, "opening new live stream");
        if !self.options.reopen_delay.is_zero() {
            thread::sleep(self.options.reopen_delay);
        }
        // a failed rename leaves old content in place; append rather than truncate it
        let mode = if renamed {
            OpenMode::Truncate
        } else {
            OpenMode::Append
        };
        match open_stream(&self.path, mode) {
            Ok(stream) => self.stream = Some(stream),
            Err(source) => report.fail(
                &mut journal,
                RotationError::Reopen {
                    path: self.path.clone(),
                    source,
                },
            ),
        }

        let now = self.clock.now();
        self.rollover_at = self
            .options
            .schedule
            .next_rollover(now, self.zone.as_ref());
        report.next_rollover = self.rollover_at;
        journal.note(
            JournalEvent::Schedule,
            &format!("next rollover at {}", self.rollover_at.to_rfc3339()),
        );

        if report.is_clean() {
            journal.note(JournalEvent::Done, "rollover complete");
        } else {
            journal.note(
                JournalEvent::Done,
                &format!("rollover finished with {} failed step(s)", report.failures.len()),
            );
        }
        report
    }

    fn prune(&self, report: &mut RolloverReport, journal: &mut RolloverJournal) {
        let names: Vec<String> = match fs::read_dir(&self.directory) {
            Ok(entries) => entries
                .filter_map(Result::ok)
                .filter_map(|entry| entry.file_name().into_string().ok())
                .collect(),
            Err(source) => {
                report.fail(
                    journal,
                    RotationError::ListDir {
                        dir: self.directory.clone(),
                        source,
                    },
                );
                return;
            }
        };
        let expired = expired_archives(
            &names,
            archive_stem(&self.file_name),
            &self.options.extension,
            self.options.schedule.suffix_format(),
            self.options.backup_count,
        );
        for name in expired {
            let path = self.directory.join(&name);
            journal.note(JournalEvent::Prune, &format!("deleting {}", path.display()));
            match fs::remove_file(&path) {
                Ok(()) => report.deleted.push(path),
                Err(source) => report.fail(journal, RotationError::Prune { path, source }),
            }
        }
    }
}
