//! Structured logging bootstrap.
//!
//! Grounded on the teacher's `tracing`/`tracing-subscriber` setup in
//! `src/bin/server.rs`, generalized with `tracing-appender` so supervised
//! children's combined stdout/stderr logs (spec §4.7 "Log multiplexing")
//! land in rotated files under `~/.stigmer/logs/` instead of only stdout.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initializes the global `tracing` subscriber for the daemon process
/// itself. Returns a guard that must be held for the process lifetime —
/// dropping it stops the non-blocking writer flushing to the daemon's own
/// log file.
pub fn init(logs_dir: &Path, component: &str) -> anyhow::Result<WorkerGuard> {
    std::fs::create_dir_all(logs_dir)?;
    let file_appender = tracing_appender::rolling::daily(logs_dir, format!("{component}.log"));
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true).with_writer(std::io::stdout))
        .with(fmt::layer().with_target(true).with_ansi(false).with_writer(non_blocking))
        .init();

    Ok(guard)
}
