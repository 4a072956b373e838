//! Tracing layers that render queued records to the console and the file.
//!
//! The dispatch thread re-emits every record as a [`tracing`] event with
//! target [`RECORD_TARGET`] and a `severity` field. These layers pick those
//! events up, apply their own threshold and write one formatted line each.
//! Events with any other target are ignored.
use std::error::Error;
use std::fmt;
use std::io::Write as _;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, FixedOffset};
use tracing::field::{Field, Visit};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::Context;

use super::clock::{Clock, LocalZone, to_local};
use super::rotating::RotatingFileSink;
use super::types::{Level, Record};

/// Target of the events the dispatch thread emits for queued records.
pub const RECORD_TARGET: &str = "servicelog::record";

/// Target for the library's own diagnostics, emitted on the caller's thread.
pub(crate) const INTERNAL_TARGET: &str = "servicelog::internal";

/// Render one line: `<local time> -- <module>|<LEVEL padded to 8>|<message>`.
#[must_use]
pub fn format_line(
    module: &str,
    level: Level,
    message: &str,
    stamp: DateTime<FixedOffset>,
) -> String {
    format!(
        "{} -- {module}|{:<8}|{message}",
        stamp.format("%Y-%m-%dT%H:%M:%S"),
        level.as_str()
    )
}

/// Write `err` and its source chain to the error stream.
pub(crate) fn report_failure(errors: &BoxMakeWriter, context: &str, err: &dyn Error) {
    let mut out = errors.make_writer();
    writeln!(out, "servicelog: {context}: {err}").ok();
    let mut source = err.source();
    while let Some(cause) = source {
        writeln!(out, "  caused by: {cause}").ok();
        source = cause.source();
    }
}

/// Pulls the `message` and `severity` fields out of a record event.
#[derive(Default)]
struct RecordExtractor {
    message: String,
    severity: Option<Level>,
}

impl Visit for RecordExtractor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "message" => self.message = value.to_string(),
            "severity" => self.severity = value.parse().ok(),
            _ => {}
        }
    }
}

/// Turn a record event back into a [`Record`]; `None` for any other event.
pub(crate) fn extract_record(event: &tracing::Event<'_>) -> Option<Record> {
    let metadata = event.metadata();
    if metadata.target() != RECORD_TARGET {
        return None;
    }
    let mut extractor = RecordExtractor::default();
    event.record(&mut extractor);
    let level = extractor.severity.unwrap_or(match *metadata.level() {
        tracing::Level::ERROR => Level::Error,
        tracing::Level::WARN => Level::Warning,
        tracing::Level::INFO => Level::Info,
        _ => Level::Debug,
    });
    Some(Record::new(level, extractor.message))
}

/// Stamps and formats records for one module.
#[derive(Clone)]
pub(crate) struct LineFormatter {
    module: String,
    clock: Arc<dyn Clock>,
    zone: Arc<dyn LocalZone + Send + Sync>,
}

impl fmt::Debug for LineFormatter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LineFormatter")
            .field("module", &self.module)
            .finish_non_exhaustive()
    }
}

impl LineFormatter {
    pub(crate) fn new(
        module: &str,
        clock: Arc<dyn Clock>,
        zone: Arc<dyn LocalZone + Send + Sync>,
    ) -> Self {
        Self {
            module: module.to_string(),
            clock,
            zone,
        }
    }

    fn render(&self, record: &Record) -> String {
        let stamp = to_local(self.clock.now(), self.zone.as_ref());
        format_line(&self.module, record.level(), record.message(), stamp)
    }
}

/// Writes records at or above `threshold` to the console stream.
///
/// Console write failures are dropped; there is nowhere left to report them.
pub(crate) struct ConsoleLayer {
    formatter: LineFormatter,
    threshold: Level,
    writer: Arc<BoxMakeWriter>,
}

impl fmt::Debug for ConsoleLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsoleLayer")
            .field("formatter", &self.formatter)
            .field("threshold", &self.threshold)
            .finish_non_exhaustive()
    }
}

impl ConsoleLayer {
    pub(crate) const fn new(
        formatter: LineFormatter,
        threshold: Level,
        writer: Arc<BoxMakeWriter>,
    ) -> Self {
        Self {
            formatter,
            threshold,
            writer,
        }
    }
}

impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for ConsoleLayer {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let Some(record) = extract_record(event) else {
            return;
        };
        if record.level() < self.threshold {
            return;
        }
        let line = self.formatter.render(&record);
        let mut out = self.writer.make_writer();
        writeln!(out, "{line}").ok();
    }
}

/// Writes records at or above `threshold` through the rotating file sink.
///
/// Sink failures go to the error stream with their cause chain.
pub(crate) struct FileLayer {
    formatter: LineFormatter,
    threshold: Level,
    sink: Mutex<RotatingFileSink>,
    errors: Arc<BoxMakeWriter>,
}

impl fmt::Debug for FileLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileLayer")
            .field("formatter", &self.formatter)
            .field("threshold", &self.threshold)
            .field("sink", &self.sink)
            .finish_non_exhaustive()
    }
}

impl FileLayer {
    pub(crate) const fn new(
        formatter: LineFormatter,
        threshold: Level,
        sink: RotatingFileSink,
        errors: Arc<BoxMakeWriter>,
    ) -> Self {
        Self {
            formatter,
            threshold,
            sink: Mutex::new(sink),
            errors,
        }
    }
}

impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for FileLayer {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let Some(record) = extract_record(event) else {
            return;
        };
        if record.level() < self.threshold {
            return;
        }
        let line = self.formatter.render(&record);
        let mut sink = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(err) = sink.write_line(&line) {
            report_failure(&self.errors, "file sink", &err);
        }
    }
}
