//! `servicelog` heartbeat service: logs a heartbeat through a rotating file sink until Ctrl-C.
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use servicelog::ServiceLog;
use servicelog::cli::Cli;

/// Show the logger's own events on stderr, filtered by `SERVICELOG_LOG`.
fn init_diagnostics(verbose: bool) {
    let fallback = if verbose {
        "servicelog::internal=debug"
    } else {
        "servicelog::internal=warn"
    };
    let filter = EnvFilter::try_from_env("SERVICELOG_LOG")
        .unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Log a heartbeat every `interval` until `stop` fires or is dropped.
fn run_heartbeat(log: &ServiceLog, interval: Duration, stop: &Receiver<()>) -> u64 {
    let mut beats = 0;
    loop {
        match stop.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {
                beats += 1;
                log.debug(format!("heartbeat {beats}"));
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    beats
}

#[allow(clippy::print_stdout)]
fn main() -> Result<()> {
    let args = Cli::parse();
    let config = args
        .resolve_config()
        .context("Failed to load logging configuration")?;

    if args.display_config {
        print!(
            "{}",
            config.to_toml().context("Failed to render configuration")?
        );
        return Ok(());
    }

    init_diagnostics(args.verbose);
    let log = ServiceLog::new();
    log.setup_with_config(&config)
        .context("Failed to set up logging")?;

    let (stop_tx, stop_rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        stop_tx.send(()).ok();
    })
    .context("Failed to install Ctrl-C handler")?;

    let version = option_env!("SERVICELOG_VERSION").unwrap_or(env!("CARGO_PKG_VERSION"));
    log.info(format!("Starting up {} {version}", config.module));
    let beats = run_heartbeat(&log, Duration::from_secs(args.heartbeat), &stop_rx);
    log.info(format!(
        "Stopping {} after {beats} heartbeat(s)",
        config.module
    ));
    log.shutdown();
    Ok(())
}
