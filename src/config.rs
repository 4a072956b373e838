//! TOML configuration for the logger.
//!
//! Every field has a default, so an empty (or missing) file yields a
//! console-at-debug, file-at-info logger that rotates at UTC midnight and
//! keeps fourteen archives.
//!
//! ```toml
//! module = "billing"
//! directory = "/var/log/billing"
//! file_name = "billing.log"
//! console_level = "debug"
//! file_level = "info"
//!
//! [rotation]
//! when = "midnight"
//! interval = 1
//! utc = true
//! backup_count = 14
//! extension = "log"
//! reopen_delay_ms = 2000
//! ```
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::logging::{JOURNAL_FILE_NAME, Level, RotationOptions, RotationSchedule, When};

/// Logger configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    /// Name shown in every line.
    pub module: String,
    /// Directory holding the live file, its archives and the rollover journal.
    pub directory: PathBuf,
    /// Live file name inside `directory`.
    pub file_name: String,
    /// Minimum severity written to the console.
    pub console_level: Level,
    /// Minimum severity written to the file.
    pub file_level: Level,
    /// Rollover settings.
    pub rotation: RotationConfig,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            module: "service".to_string(),
            directory: PathBuf::from("log"),
            file_name: "service.log".to_string(),
            console_level: Level::Debug,
            file_level: Level::Info,
            rotation: RotationConfig::default(),
        }
    }
}

/// Rollover settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RotationConfig {
    /// Schedule unit: `S`, `M`, `H`, `D`, `midnight` or `W0`..`W6`.
    pub when: When,
    /// Number of units per period.
    pub interval: u32,
    /// Compute boundaries in UTC instead of local time.
    pub utc: bool,
    /// Archives to keep; zero keeps all of them.
    pub backup_count: usize,
    /// Archive extension, without the dot.
    pub extension: String,
    /// Pause between closing the old file and opening the new one.
    pub reopen_delay_ms: u64,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            when: When::Midnight,
            interval: 1,
            utc: true,
            backup_count: 14,
            extension: "log".to_string(),
            reopen_delay_ms: 2000,
        }
    }
}

impl RotationConfig {
    /// Runtime sink options for these settings.
    #[must_use]
    pub fn options(&self) -> RotationOptions {
        RotationOptions {
            schedule: RotationSchedule::new(self.when, self.interval, self.utc),
            backup_count: self.backup_count,
            extension: self.extension.clone(),
            reopen_delay: Duration::from_millis(self.reopen_delay_ms),
        }
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}

impl LogConfig {
    /// Defaults with the three names every setup call supplies.
    #[must_use]
    pub fn new(module: &str, directory: impl Into<PathBuf>, file_name: &str) -> Self {
        Self {
            module: module.to_string(),
            directory: directory.into(),
            file_name: file_name.to_string(),
            ..Self::default()
        }
    }

    /// Load a config file. A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file exists but cannot be read, or
    /// [`ConfigError::Parse`] if it is not valid TOML for this schema.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Render as TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if a value cannot be represented in TOML.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Reject values that parse but cannot work.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.module.trim().is_empty() {
            return Err(invalid("module", "must not be empty"));
        }
        if self.file_name.is_empty() {
            return Err(invalid("file_name", "must not be empty"));
        }
        if self.file_name.contains(['/', '\\']) {
            return Err(invalid("file_name", "must be a bare file name"));
        }
        if self.file_name == JOURNAL_FILE_NAME {
            return Err(invalid(
                "file_name",
                "is reserved for the rollover journal",
            ));
        }
        if self.rotation.extension.is_empty() {
            return Err(invalid("rotation.extension", "must not be empty"));
        }
        if self.rotation.extension.contains('.') {
            return Err(invalid(
                "rotation.extension",
                "must not contain a dot",
            ));
        }
        if self.rotation.interval == 0 {
            return Err(invalid("rotation.interval", "must be at least 1"));
        }
        Ok(())
    }
}
