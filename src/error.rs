//! Domain-specific error types for the logging facility.
//!
//! Library modules return typed errors built with [`thiserror`]; the
//! `servicelog` binary converts them to [`anyhow::Error`] at its boundary via
//! the standard `?` operator.
//!
//! # Error hierarchy
//!
//! ```text
//! SetupError
//! ├── Config(ConfigError)    invalid or unreadable configuration
//! ├── CreateDir              log directory could not be created
//! ├── Sink(SinkError)        live log file could not be opened
//! ├── Spawn                  dispatch thread could not be started
//! └── QueueDetached          record queue has no consumer left to start
//!
//! SinkError                  write path of the rotating file sink
//! RotationError              one failed step of a rollover attempt
//! ```

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or validating a [`LogConfig`](crate::config::LogConfig).
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("IO error reading config file {}: {source}", .path.display())]
    Io {
        /// Path to the file that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// The config file is not valid TOML for the expected schema.
    #[error("Invalid TOML in {}: {source}", .path.display())]
    Parse {
        /// Path to the file that failed to parse.
        path: PathBuf,
        /// Underlying parser error.
        source: toml::de::Error,
    },

    /// A severity name that is not one of debug, info, warning, error, critical.
    #[error("Unknown log level '{0}'")]
    UnknownLevel(String),

    /// A rotation schedule that is not one of S, M, H, D, midnight, W0..W6.
    #[error("Unknown rotation schedule '{0}': expected S, M, H, D, midnight or W0-W6")]
    UnknownSchedule(String),

    /// A field value that parses but is not acceptable.
    #[error("Invalid value for '{field}': {reason}")]
    Invalid {
        /// Name of the offending field.
        field: &'static str,
        /// Human-readable reason.
        reason: String,
    },
}

/// Errors returned by [`ServiceLog::setup`](crate::logging::ServiceLog::setup).
#[derive(Error, Debug)]
pub enum SetupError {
    /// The supplied configuration was rejected.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The log directory did not exist and could not be created.
    #[error("Failed to create log directory {}: {source}", .path.display())]
    CreateDir {
        /// Directory that could not be created.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// The rotating file sink could not be opened.
    #[error("Log sink error: {0}")]
    Sink(#[from] SinkError),

    /// The dispatch thread could not be spawned.
    #[error("Failed to start dispatch thread: {0}")]
    Spawn(#[source] io::Error),

    /// The queue's consuming end was lost, so no dispatch thread can drain it.
    #[error("Record queue has no consumer left for a dispatch thread")]
    QueueDetached,
}

/// Errors raised on the write path of the rotating file sink.
#[derive(Error, Debug)]
pub enum SinkError {
    /// The live log file could not be opened.
    #[error("Failed to open log file {}: {source}", .path.display())]
    Open {
        /// Path of the live log file.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// A formatted line could not be written or flushed.
    #[error("Failed to write log file {}: {source}", .path.display())]
    Write {
        /// Path of the live log file.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },
}

/// A single failed step of a rollover attempt.
///
/// Rollover never aborts on one of these; they are collected into a
/// [`RolloverReport`](crate::logging::RolloverReport) and journaled.
#[derive(Error, Debug)]
pub enum RotationError {
    /// Buffered data could not be flushed before closing.
    #[error("flush of active stream failed: {0}")]
    Flush(#[source] io::Error),

    /// The active handle could not be synced to disk before release.
    #[error("close of active stream failed: {0}")]
    Close(#[source] io::Error),

    /// A stale archive with the target name could not be removed.
    #[error("could not remove existing archive {}: {source}", .path.display())]
    RemoveExisting {
        /// Archive path that already existed.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// The live file could not be renamed to its archive name.
    #[error("rename {} -> {} failed: {source}", .from.display(), .to.display())]
    Rename {
        /// Live file path.
        from: PathBuf,
        /// Archive path.
        to: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// The log directory could not be listed for retention.
    #[error("could not list {}: {source}", .dir.display())]
    ListDir {
        /// Directory that was being scanned.
        dir: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// An expired archive could not be deleted.
    #[error("could not delete expired archive {}: {source}", .path.display())]
    Prune {
        /// Archive that should have been deleted.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// A fresh live file could not be opened.
    #[error("reopen of {} failed: {source}", .path.display())]
    Reopen {
        /// Live file path.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use std::error::Error as StdError;

    #[test]
    fn config_error_unknown_level_display() {
        let e = ConfigError::UnknownLevel("loud".to_string());
        assert_eq!(e.to_string(), "Unknown log level 'loud'");
    }

    #[test]
    fn config_error_invalid_display() {
        let e = ConfigError::Invalid {
            field: "file_name",
            reason: "must not be empty".to_string(),
        };
        assert_eq!(
            e.to_string(),
            "Invalid value for 'file_name': must not be empty"
        );
    }

    #[test]
    fn config_error_io_has_source() {
        let e = ConfigError::Io {
            path: PathBuf::from("/etc/servicelog.toml"),
            source: io::Error::new(io::ErrorKind::NotFound, "no such file"),
        };
        assert!(e.to_string().contains("/etc/servicelog.toml"));
        assert!(e.source().is_some());
    }

    #[test]
    fn setup_error_from_config_error() {
        let e: SetupError = ConfigError::UnknownSchedule("X".to_string()).into();
        assert!(e.to_string().starts_with("Configuration error"));
        assert!(e.to_string().contains("'X'"));
    }

    #[test]
    fn setup_error_spawn_has_source() {
        let e = SetupError::Spawn(io::Error::other("no threads left"));
        assert!(e.source().is_some());
    }

    #[test]
    fn setup_error_queue_detached_display() {
        let e = SetupError::QueueDetached;
        assert!(e.source().is_none());
        assert_eq!(
            e.to_string(),
            "Record queue has no consumer left for a dispatch thread"
        );
    }

    #[test]
    fn rotation_error_rename_display() {
        let e = RotationError::Rename {
            from: PathBuf::from("/var/log/app/service.log"),
            to: PathBuf::from("/var/log/app/service.2024-01-15.log"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(
            e.to_string(),
            "rename /var/log/app/service.log -> /var/log/app/service.2024-01-15.log failed: denied"
        );
    }

    #[test]
    fn sink_error_write_has_source() {
        let e = SinkError::Write {
            path: PathBuf::from("service.log"),
            source: io::Error::other("disk full"),
        };
        assert!(e.source().is_some());
        assert!(e.to_string().contains("disk full"));
    }

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn all_error_types_are_send_sync() {
        assert_send_sync::<ConfigError>();
        assert_send_sync::<SetupError>();
        assert_send_sync::<SinkError>();
        assert_send_sync::<RotationError>();
    }

    #[test]
    fn setup_error_converts_to_anyhow() {
        let e = SetupError::Spawn(io::Error::other("x"));
        let _anyhow_err: anyhow::Error = e.into();
    }
}
