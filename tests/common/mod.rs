// Shared helpers for integration tests.
//
// Provides a temporary log directory, a manual clock and captured console
// and error streams, so each integration test can drive a `ServiceLog`
// across simulated time without touching the real clock or stderr.
//
// Used by all integration test binaries that declare `mod common;`.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use servicelog::ServiceLog;
use servicelog::config::LogConfig;
use servicelog::logging::{Backends, CaptureBuffer, Clock, FixedZone, ManualClock};

/// Module name used by every harness.
pub const MODULE: &str = "svc";

/// Live file name used by every harness.
pub const FILE_NAME: &str = "svc.log";

/// Parse an RFC 3339 instant.
pub fn instant(s: &str) -> DateTime<Utc> {
    s.parse().expect("valid RFC 3339 instant")
}

/// A logger on a manual clock, writing into a temp directory.
pub struct Harness {
    pub dir: tempfile::TempDir,
    pub clock: Arc<ManualClock>,
    pub console: CaptureBuffer,
    pub errors: CaptureBuffer,
    pub log: ServiceLog,
}

impl Harness {
    /// Build an unconfigured logger frozen at `start`, in UTC.
    pub fn new(start: &str) -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let clock = Arc::new(ManualClock::new(instant(start)));
        let console = CaptureBuffer::new();
        let errors = CaptureBuffer::new();
        let log = ServiceLog::with_backends(
            Backends::default()
                .with_clock(Arc::clone(&clock) as Arc<dyn Clock>)
                .with_zone(Arc::new(FixedZone::utc()))
                .with_console(console.clone())
                .with_errors(errors.clone()),
        );
        Self {
            dir,
            clock,
            console,
            errors,
            log,
        }
    }

    /// Default config pointed at the temp directory, with no reopen delay.
    pub fn config(&self) -> LogConfig {
        let mut config = LogConfig::new(MODULE, self.dir.path(), FILE_NAME);
        config.rotation.reopen_delay_ms = 0;
        config
    }

    /// Set up with [`Harness::config`].
    pub fn setup(&self) {
        self.log
            .setup_with_config(&self.config())
            .expect("setup succeeds");
    }

    /// Build a harness that is already set up.
    pub fn started(start: &str) -> Self {
        let harness = Self::new(start);
        harness.setup();
        harness
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Contents of the live file.
    pub fn live(&self) -> String {
        read(&self.path(FILE_NAME))
    }

    /// Messages (text after the last `|`) of each console line.
    pub fn console_messages(&self) -> Vec<String> {
        messages(&self.console.lines())
    }

    /// Sorted names of every entry in the log directory.
    pub fn files(&self) -> Vec<String> {
        list(self.dir.path())
    }
}

pub fn read(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap_or_else(|e| panic!("read {}: {e}", path.display()))
}

pub fn list(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .expect("list dir")
        .map(|entry| {
            entry
                .expect("dir entry")
                .file_name()
                .into_string()
                .expect("utf-8 name")
        })
        .collect();
    names.sort();
    names
}

pub fn messages(lines: &[String]) -> Vec<String> {
    lines
        .iter()
        .map(|line| line.rsplit('|').next().unwrap_or_default().to_string())
        .collect()
}
