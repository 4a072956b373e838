//! Queued service logging with a rotating file sink.
//!
//! Producers on any thread enqueue [`Record`]s through a [`ServiceLog`].
//! A single dispatch thread drains the queue and re-emits each record as a
//! [`tracing`] event into a private subscriber whose layers write the
//! console and the [`RotatingFileSink`].

mod capture;
mod clock;
mod dispatch;
mod facade;
mod journal;
mod layers;
mod queue;
mod rotating;
mod schedule;
mod types;

pub use capture::CaptureBuffer;
pub use clock::{Clock, FixedZone, LocalZone, ManualClock, SystemClock, SystemZone, to_local};
pub use dispatch::THREAD_NAME;
pub use facade::{Backends, ServiceLog, global};
pub use journal::{JOURNAL_FILE_NAME, JournalEvent, RolloverJournal};
pub use layers::{RECORD_TARGET, format_line};
pub use queue::RecordQueue;
pub use rotating::{
    RolloverReport, RotatingFileSink, RotationOptions, archive_stem, expired_archives,
};
pub use schedule::{RotationSchedule, When, matches_suffix};
pub use types::{Level, Record};
