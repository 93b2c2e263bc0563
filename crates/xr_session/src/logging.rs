//! Logging setup for the XR session driver
//
// Every run writes `xr_session.log` into a timestamped folder under the app
// data logs directory. With `--verbose` the same events also go to stdout.
//
// Usage:
//   Call `logging::init(logs_dir, verbose)` at the start of main().
//   Keep the returned guard alive for the program's duration.

use std::fs;
use std::path::Path;

use anyhow::Context;
use chrono::Local;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

#[allow(dead_code)]
pub struct LogGuard(tracing_appender::non_blocking::WorkerGuard);

const DEFAULT_FILTER: &str = "info,pulsar_xr=debug";

/// Initializes logging into `logs_dir`.
///
/// - `verbose`: also log to the console.
/// - Returns: LogGuard, which must be kept alive for file logging.
pub fn init(logs_dir: &Path, verbose: bool) -> anyhow::Result<LogGuard> {
    let run_dir = logs_dir.join(Local::now().format("%Y-%m-%d_%H-%M-%S").to_string());
    fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create log folder {}", run_dir.display()))?;

    let log_file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(run_dir.join("xr_session.log"))
        .context("failed to open xr_session.log for writing")?;
    let (non_blocking, guard) = tracing_appender::non_blocking(log_file);

    let env_filter = match std::env::var("RUST_LOG") {
        Ok(filter) => EnvFilter::new(filter),
        Err(_) => EnvFilter::new(DEFAULT_FILTER),
    };

    // File log: plain formatting, no ANSI codes
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true);

    let registry = tracing_subscriber::registry().with(env_filter).with(file_layer);

    if verbose {
        let console_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stdout)
            .with_target(true)
            .compact();
        registry.with(console_layer).init();
    } else {
        registry.init();
    }

    Ok(LogGuard(guard))
}
