//! Command-line arguments for the `servicelog` binary.
use std::path::PathBuf;

use clap::Parser;

use crate::config::LogConfig;
use crate::error::ConfigError;

/// Command-line entry point of the `servicelog` heartbeat service.
#[derive(Parser, Debug)]
#[command(
    name = "servicelog",
    about = "Run a heartbeat service that logs through a rotating file sink",
    version
)]
pub struct Cli {
    /// TOML logging config (missing file means defaults)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Override the module name shown in every line
    #[arg(short, long)]
    pub module: Option<String>,

    /// Override the log directory
    #[arg(long = "dir")]
    pub directory: Option<PathBuf>,

    /// Override the live log file name
    #[arg(long = "file")]
    pub file_name: Option<String>,

    /// Seconds between heartbeat messages
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..))]
    pub heartbeat: u64,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    pub display_config: bool,

    /// Show the logger's own diagnostics on stderr
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Load `--config` (or the defaults) and apply the command-line overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the config file cannot be read or parsed.
    pub fn resolve_config(&self) -> Result<LogConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => LogConfig::load(path)?,
            None => LogConfig::default(),
        };
        if let Some(module) = &self.module {
            config.module.clone_from(module);
        }
        if let Some(directory) = &self.directory {
            config.directory.clone_from(directory);
        }
        if let Some(file_name) = &self.file_name {
            config.file_name.clone_from(file_name);
        }
        Ok(config)
    }
}
