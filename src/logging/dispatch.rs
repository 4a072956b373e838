//! The single consumer thread that drains the queue into the sinks.
use std::any::Any;
use std::io::{self, Write as _};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, mpsc};
use std::thread::{self, JoinHandle};

use tracing::Dispatch;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use super::layers::RECORD_TARGET;
use super::queue::{Command, QueueConsumer};
use super::types::{Level, Record};

/// Name of the dispatch thread, visible in debuggers and panic messages.
pub const THREAD_NAME: &str = "servicelog-dispatch";

/// A dispatch thread that could not be started, with the consumer it would
/// have drained.
#[derive(Debug)]
pub(crate) struct SpawnFailure {
    pub(crate) source: io::Error,
    pub(crate) consumer: QueueConsumer,
}

/// Body handed to a thread spawner.
pub(crate) type ThreadBody = Box<dyn FnOnce() + Send + 'static>;

/// Start the dispatch thread.
///
/// `dispatch` is installed as the thread's default subscriber, so the record
/// events emitted here reach only the layers built for this logger.
pub(crate) fn spawn(
    consumer: QueueConsumer,
    dispatch: Dispatch,
    errors: Arc<BoxMakeWriter>,
) -> Result<JoinHandle<()>, SpawnFailure> {
    spawn_with(consumer, dispatch, errors, |body| {
        thread::Builder::new().name(THREAD_NAME.to_string()).spawn(body)
    })
}

/// Start the dispatch thread through `spawner`.
///
/// The consumer only moves to the thread once it is running; if `spawner`
/// fails it comes back in the [`SpawnFailure`].
pub(crate) fn spawn_with<S>(
    consumer: QueueConsumer,
    dispatch: Dispatch,
    errors: Arc<BoxMakeWriter>,
    spawner: S,
) -> Result<JoinHandle<()>, SpawnFailure>
where
    S: FnOnce(ThreadBody) -> io::Result<JoinHandle<()>>,
{
    let (handoff, pickup) = mpsc::sync_channel::<QueueConsumer>(1);
    let body: ThreadBody = Box::new(move || {
        if let Ok(consumer) = pickup.recv() {
            run(&consumer, &dispatch, &errors);
        }
    });
    let handle = match spawner(body) {
        Ok(handle) => handle,
        Err(source) => return Err(SpawnFailure { source, consumer }),
    };
    match handoff.send(consumer) {
        Ok(()) => Ok(handle),
        Err(mpsc::SendError(consumer)) => Err(SpawnFailure {
            source: io::Error::other("dispatch thread exited before taking the queue"),
            consumer,
        }),
    }
}

/// Drain `consumer` until a shutdown command arrives or every sender is gone.
pub(crate) fn run(consumer: &QueueConsumer, dispatch: &Dispatch, errors: &BoxMakeWriter) {
    let _guard = tracing::dispatcher::set_default(dispatch);
    while let Some(command) = consumer.recv() {
        match command {
            Command::Record(record) => deliver(&record, errors),
            Command::Flush(ack) => {
                ack.send(()).ok();
            }
            Command::Shutdown => break,
        }
    }
}

/// Route one record; a panic in a sink is reported and swallowed.
fn deliver(record: &Record, errors: &BoxMakeWriter) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| route(record))) {
        let mut out = errors.make_writer();
        writeln!(
            out,
            "servicelog: delivery of {} record panicked: {}",
            record.level(),
            panic_message(payload.as_ref())
        )
        .ok();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

/// Re-emit a record as a tracing event at the matching severity.
fn route(record: &Record) {
    let message = record.message();
    match record.level() {
        Level::Debug => tracing::debug!(target: RECORD_TARGET, severity = "DEBUG", "{message}"),
        Level::Info => tracing::info!(target: RECORD_TARGET, severity = "INFO", "{message}"),
        Level::Warning => {
            tracing::warn!(target: RECORD_TARGET, severity = "WARNING", "{message}");
        }
        Level::Error => tracing::error!(target: RECORD_TARGET, severity = "ERROR", "{message}"),
        Level::Critical => {
            tracing::error!(target: RECORD_TARGET, severity = "CRITICAL", "{message}");
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::panic
)]
mod tests {
    use super::*;
    use crate::logging::capture::CaptureBuffer;
    use crate::logging::layers::extract_record;
    use crate::logging::queue::RecordQueue;
    use std::sync::{Mutex, PoisonError};
    use tracing_subscriber::layer::{Context, SubscriberExt as _};

    /// Records every delivered record and panics on the message "boom".
    struct Recorder {
        seen: Arc<Mutex<Vec<Record>>>,
    }

    impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for Recorder {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
            let Some(record) = extract_record(event) else {
                return;
            };
            if record.message() == "boom" {
                panic!("sink exploded");
            }
            self.seen
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(record);
        }
    }

    fn recorder() -> (Dispatch, Arc<Mutex<Vec<Record>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let layer = Recorder {
            seen: Arc::clone(&seen),
        };
        (
            Dispatch::new(tracing_subscriber::registry().with(layer)),
            seen,
        )
    }

    #[test]
    fn every_level_is_routed_with_its_own_severity() {
        let queue = RecordQueue::new();
        for level in Level::ALL {
            queue.push(Record::new(level, level.as_str()));
        }
        queue.send(Command::Shutdown);
        let (dispatch, seen) = recorder();
        let errors = BoxMakeWriter::new(CaptureBuffer::new());

        run(&queue.take_consumer().unwrap(), &dispatch, &errors);

        let levels: Vec<Level> = seen.lock().unwrap().iter().map(Record::level).collect();
        assert_eq!(levels, Level::ALL);
    }

    #[test]
    fn panicking_sink_does_not_stop_dispatch() {
        let queue = RecordQueue::new();
        queue.push(Record::new(Level::Info, "before"));
        queue.push(Record::new(Level::Error, "boom"));
        queue.push(Record::new(Level::Info, "after"));
        queue.send(Command::Shutdown);
        let (dispatch, seen) = recorder();
        let errors = CaptureBuffer::new();

        run(
            &queue.take_consumer().unwrap(),
            &dispatch,
            &BoxMakeWriter::new(errors.clone()),
        );

        let messages: Vec<String> = seen
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.message().to_string())
            .collect();
        assert_eq!(messages, ["before", "after"]);
        assert_eq!(
            errors.lines(),
            ["servicelog: delivery of ERROR record panicked: sink exploded"]
        );
    }

    #[test]
    fn flush_is_acknowledged_after_earlier_records() {
        let queue = RecordQueue::new();
        let (ack, done) = mpsc::channel();
        queue.push(Record::new(Level::Info, "first"));
        queue.send(Command::Flush(ack));
        queue.send(Command::Shutdown);
        let (dispatch, seen) = recorder();

        run(
            &queue.take_consumer().unwrap(),
            &dispatch,
            &BoxMakeWriter::new(CaptureBuffer::new()),
        );

        assert!(done.try_recv().is_ok());
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn commands_after_shutdown_are_not_processed() {
        let queue = RecordQueue::new();
        queue.send(Command::Shutdown);
        queue.push(Record::new(Level::Info, "too late"));
        let (dispatch, seen) = recorder();

        run(
            &queue.take_consumer().unwrap(),
            &dispatch,
            &BoxMakeWriter::new(CaptureBuffer::new()),
        );

        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn spawned_thread_is_named() {
        let queue = RecordQueue::new();
        let (dispatch, _seen) = recorder();
        let handle = spawn(
            queue.take_consumer().unwrap(),
            dispatch,
            Arc::new(BoxMakeWriter::new(CaptureBuffer::new())),
        )
        .unwrap();
        assert_eq!(handle.thread().name(), Some(THREAD_NAME));
        queue.send(Command::Shutdown);
        handle.join().unwrap();
    }

    #[test]
    fn failed_spawn_hands_the_consumer_back() {
        let queue = RecordQueue::new();
        queue.push(Record::new(Level::Info, "still queued"));
        let (dispatch, seen) = recorder();

        let failure = spawn_with(
            queue.take_consumer().unwrap(),
            dispatch.clone(),
            Arc::new(BoxMakeWriter::new(CaptureBuffer::new())),
            |_body| Err(io::Error::other("no threads left")),
        )
        .unwrap_err();
        assert_eq!(failure.source.to_string(), "no threads left");

        queue.restore_consumer(failure.consumer);
        let handle = spawn(
            queue.take_consumer().unwrap(),
            dispatch,
            Arc::new(BoxMakeWriter::new(CaptureBuffer::new())),
        )
        .unwrap();
        queue.send(Command::Shutdown);
        handle.join().unwrap();
        assert_eq!(seen.lock().unwrap()[0].message(), "still queued");
    }
}
