//! The process-wide logger handle producers talk to.
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::thread::JoinHandle;

use tracing::Dispatch;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt as _;

use super::clock::{Clock, LocalZone, SystemClock, SystemZone};
use super::dispatch::{self, SpawnFailure};
use super::layers::{ConsoleLayer, FileLayer, INTERNAL_TARGET, LineFormatter};
use super::queue::{Command, QueueConsumer, RecordQueue};
use super::rotating::RotatingFileSink;
use super::types::{Level, Record};
use crate::config::LogConfig;
use crate::error::SetupError;

/// Generate one enqueue method per severity.
macro_rules! level_methods {
    ($($method:ident => $level:ident),+ $(,)?) => {
        $(
            #[doc = concat!("Enqueue a `", stringify!($level), "` record. Never blocks.")]
            pub fn $method(&self, message: impl Into<String>) {
                self.log(Level::$level, message);
            }
        )+
    };
}

/// Clock, zone and output streams a [`ServiceLog`] is built on.
///
/// The defaults are the system clock, the host time zone, and standard
/// error for both console lines and failure reports.
pub struct Backends {
    /// Time source for line stamps and rollover decisions.
    pub clock: Arc<dyn Clock>,
    /// Local offset lookup for stamps, midnight and DST.
    pub zone: Arc<dyn LocalZone + Send + Sync>,
    /// Destination of console lines.
    pub console: Arc<BoxMakeWriter>,
    /// Destination of sink failure and panic reports.
    pub errors: Arc<BoxMakeWriter>,
}

impl fmt::Debug for Backends {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backends").finish_non_exhaustive()
    }
}

impl Default for Backends {
    fn default() -> Self {
        Self {
            clock: Arc::new(SystemClock),
            zone: Arc::new(SystemZone),
            console: Arc::new(BoxMakeWriter::new(std::io::stderr)),
            errors: Arc::new(BoxMakeWriter::new(std::io::stderr)),
        }
    }
}

impl Backends {
    /// Replace the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the local zone.
    #[must_use]
    pub fn with_zone(mut self, zone: Arc<dyn LocalZone + Send + Sync>) -> Self {
        self.zone = zone;
        self
    }

    /// Replace the console stream.
    #[must_use]
    pub fn with_console<M>(mut self, console: M) -> Self
    where
        M: for<'a> MakeWriter<'a> + Send + Sync + 'static,
    {
        self.console = Arc::new(BoxMakeWriter::new(console));
        self
    }

    /// Replace the error stream.
    #[must_use]
    pub fn with_errors<M>(mut self, errors: M) -> Self
    where
        M: for<'a> MakeWriter<'a> + Send + Sync + 'static,
    {
        self.errors = Arc::new(BoxMakeWriter::new(errors));
        self
    }
}

#[derive(Debug, Default)]
struct State {
    log_path: Option<PathBuf>,
    module: Option<String>,
    dispatcher: Option<JoinHandle<()>>,
}

#[derive(Debug)]
struct Inner {
    queue: RecordQueue,
    backends: Backends,
    state: Mutex<State>,
}

/// Queued logger shared by every thread of a service.
///
/// Producers call the level methods from any thread; each call only
/// enqueues. One dispatch thread, started by [`ServiceLog::setup`], drains
/// the queue in order and writes every record to the console and, at
/// `INFO` and above, to a daily-rotated file.
///
/// Cloning is cheap and every clone feeds the same queue. Records enqueued
/// before setup are delivered once setup runs.
#[derive(Debug, Clone)]
pub struct ServiceLog {
    inner: Arc<Inner>,
}

impl Default for ServiceLog {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceLog {
    /// A logger on the system clock, writing its console output to stderr.
    #[must_use]
    pub fn new() -> Self {
        Self::with_backends(Backends::default())
    }

    /// A logger on custom backends.
    #[must_use]
    pub fn with_backends(backends: Backends) -> Self {
        Self {
            inner: Arc::new(Inner {
                queue: RecordQueue::new(),
                backends,
                state: Mutex::new(State::default()),
            }),
        }
    }

    /// Configure sinks and start the dispatch thread with default levels
    /// and rotation.
    ///
    /// The first successful setup wins; later calls are no-ops.
    ///
    /// # Errors
    ///
    /// See [`ServiceLog::setup_with_config`].
    pub fn setup(
        &self,
        module: &str,
        directory: impl AsRef<Path>,
        file_name: &str,
    ) -> Result<(), SetupError> {
        self.setup_with_config(&LogConfig::new(module, directory.as_ref(), file_name))
    }

    /// Configure sinks from `config` and start the dispatch thread.
    ///
    /// The first successful setup wins; later calls are no-ops. A failed
    /// setup leaves the logger unconfigured so it can be retried.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError`] if the config is invalid, the log directory
    /// or file cannot be created, or the thread cannot be spawned. Once the
    /// logger is configured, later configs are not validated.
    pub fn setup_with_config(&self, config: &LogConfig) -> Result<(), SetupError> {
        self.setup_with_spawner(config, dispatch::spawn)
    }

    fn setup_with_spawner<S>(&self, config: &LogConfig, spawn: S) -> Result<(), SetupError>
    where
        S: FnOnce(
            QueueConsumer,
            Dispatch,
            Arc<BoxMakeWriter>,
        ) -> Result<JoinHandle<()>, SpawnFailure>,
    {
        let mut state = self
            .inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if state.module.is_some() {
            tracing::debug!(
                target: INTERNAL_TARGET,
                module = %config.module,
                "logger already configured; setup skipped"
            );
            return Ok(());
        }
        config.validate()?;

        let backends = &self.inner.backends;
        fs::create_dir_all(&config.directory).map_err(|source| SetupError::CreateDir {
            path: config.directory.clone(),
            source,
        })?;
        let sink = RotatingFileSink::open(
            &config.directory,
            &config.file_name,
            config.rotation.options(),
            Arc::clone(&backends.clock),
            Arc::clone(&backends.zone),
        )?;
        let log_path = sink.path().to_path_buf();

        let formatter = LineFormatter::new(
            &config.module,
            Arc::clone(&backends.clock),
            Arc::clone(&backends.zone),
        );
        let console = ConsoleLayer::new(
            formatter.clone(),
            config.console_level,
            Arc::clone(&backends.console),
        );
        let file = FileLayer::new(
            formatter,
            config.file_level,
            sink,
            Arc::clone(&backends.errors),
        );
        let subscriber = tracing_subscriber::registry().with(console).with(file);

        let consumer = self
            .inner
            .queue
            .take_consumer()
            .ok_or(SetupError::QueueDetached)?;
        let handle = spawn(
            consumer,
            Dispatch::new(subscriber),
            Arc::clone(&backends.errors),
        )
        .map_err(|failure| {
            self.inner.queue.restore_consumer(failure.consumer);
            SetupError::Spawn(failure.source)
        })?;

        tracing::debug!(
            target: INTERNAL_TARGET,
            module = %config.module,
            path = %log_path.display(),
            "dispatch thread started"
        );
        state.module = Some(config.module.clone());
        state.log_path = Some(log_path);
        state.dispatcher = Some(handle);
        Ok(())
    }

    /// Enqueue a record at `level`. Never blocks; records sent after
    /// shutdown are dropped.
    pub fn log(&self, level: Level, message: impl Into<String>) {
        self.inner.queue.push(Record::new(level, message));
    }

    level_methods! {
        debug => Debug,
        info => Info,
        warning => Warning,
        error => Error,
        critical => Critical,
    }

    /// Block until every record enqueued before this call has been written.
    ///
    /// Returns immediately when no dispatch thread is running.
    pub fn flush(&self) {
        if !self.is_running() {
            return;
        }
        let (ack, done) = mpsc::channel();
        if self.inner.queue.send(Command::Flush(ack)) {
            // an Err means the thread stopped first; nothing left to wait for
            done.recv().ok();
        }
    }

    /// Drain what is already queued, then stop the dispatch thread.
    ///
    /// Idempotent. Records enqueued afterwards are dropped.
    pub fn shutdown(&self) {
        let handle = self
            .inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .dispatcher
            .take();
        let Some(handle) = handle else {
            return;
        };
        self.inner.queue.send(Command::Shutdown);
        if handle.join().is_err() {
            tracing::warn!(target: INTERNAL_TARGET, "dispatch thread panicked during shutdown");
        }
        tracing::debug!(target: INTERNAL_TARGET, "dispatch thread stopped");
    }

    /// Whether the dispatch thread is alive.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .dispatcher
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Records enqueued but not yet picked up by the dispatch thread.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.queue.pending()
    }

    /// Path of the live log file, once set up.
    #[must_use]
    pub fn log_path(&self) -> Option<PathBuf> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .log_path
            .clone()
    }
}

/// The process-wide logger, created on first use.
///
/// Every caller in the process gets the same instance.
pub fn global() -> &'static ServiceLog {
    static GLOBAL: OnceLock<ServiceLog> = OnceLock::new();
    GLOBAL.get_or_init(ServiceLog::new)
}
