//! Queued, single-writer logging for long-running services.
//!
//! Any thread can log through a cloned [`ServiceLog`] without blocking. One
//! background thread writes every record to the console and to a log file
//! that is archived daily and pruned to a fixed number of archives.
//!
//! The public API is organised into four modules:
//!
//! - **[`logging`]**: the logger handle, the rotating sink and its schedule
//! - **[`config`]**: TOML configuration with defaults and validation
//! - **[`error`]**: typed errors for setup, sinks and rotation steps
//! - **[`cli`]**: arguments of the `servicelog` heartbeat binary
#![deny(clippy::or_fun_call)]
#![deny(clippy::bool_to_int_with_if)]

pub mod cli;
pub mod config;
pub mod error;
pub mod logging;

pub use logging::{Level, ServiceLog, global};
