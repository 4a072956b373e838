//! Core logging types: severity levels and the queued record.
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Severity of a log record, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Level {
    /// Diagnostic detail, console only by default.
    Debug,
    /// Normal operational messages.
    Info,
    /// Something unexpected that the service recovered from.
    Warning,
    /// An operation failed.
    Error,
    /// The service cannot continue normally.
    Critical,
}

impl Level {
    /// All levels, least severe first.
    pub const ALL: [Self; 5] = [
        Self::Debug,
        Self::Info,
        Self::Warning,
        Self::Error,
        Self::Critical,
    ];

    /// Upper-case name as it appears in formatted lines.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, ConfigError> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warning" | "warn" => Ok(Self::Warning),
            "error" => Ok(Self::Error),
            "critical" => Ok(Self::Critical),
            _ => Err(ConfigError::UnknownLevel(s.to_string())),
        }
    }
}

impl TryFrom<String> for Level {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, ConfigError> {
        value.parse()
    }
}

impl From<Level> for String {
    fn from(level: Level) -> Self {
        level.as_str().to_ascii_lowercase()
    }
}

/// A single message waiting to be written.
///
/// Created on the producer's thread, consumed once by the dispatch thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    level: Level,
    message: String,
}

impl Record {
    /// Create a record.
    #[must_use]
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }

    /// Severity of the record.
    #[must_use]
    pub const fn level(&self) -> Level {
        self.level
    }

    /// Message text.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn level_as_str() {
        let names: Vec<&str> = Level::ALL.iter().map(|l| l.as_str()).collect();
        assert_eq!(names, ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"]);
    }

    #[test]
    fn level_ordering_is_monotonic() {
        for pair in Level::ALL.windows(2) {
            assert!(pair[0] < pair[1], "{} should be below {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn level_parses_case_insensitively() {
        assert_eq!("INFO".parse::<Level>().unwrap(), Level::Info);
        assert_eq!("Critical".parse::<Level>().unwrap(), Level::Critical);
        assert_eq!("warn".parse::<Level>().unwrap(), Level::Warning);
    }

    #[test]
    fn level_rejects_unknown_name() {
        let err = "verbose".parse::<Level>().unwrap_err();
        assert!(matches!(err, ConfigError::UnknownLevel(name) if name == "verbose"));
    }

    #[test]
    fn level_round_trips_through_string() {
        let s: String = Level::Warning.into();
        assert_eq!(s, "warning");
        assert_eq!(Level::try_from(s).unwrap(), Level::Warning);
    }

    #[test]
    fn record_accessors() {
        let record = Record::new(Level::Error, "disk full");
        assert_eq!(record.level(), Level::Error);
        assert_eq!(record.message(), "disk full");
    }

    // edge case: empty messages are legal records
    #[test]
    fn record_allows_empty_message() {
        assert_eq!(Record::new(Level::Info, "").message(), "");
    }
}
