//! Tracing configuration and log routing.
//!
//! Logs go to stderr through a compact formatter (stdout is reserved for run reports) and to a
//! file. `RUSTY_RFP_LOG_FILE` selects the file path; without it the logger appends to
//! `logs/rusty-rfp.log`.
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Configure tracing subscribers for console and file logging.
///
/// - Respects `RUST_LOG` for filtering (defaults to `info`).
/// - Installs a compact stderr layer and, when available, a file layer.
/// - Calling it twice is harmless; the second subscriber is simply not installed.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact();

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer);

    let installed = match configure_file_writer() {
        Some(writer) => {
            let file_layer = fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_ansi(false)
                .compact();
            registry.with(file_layer).try_init()
        }
        None => registry.try_init(),
    };

    if installed.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}

fn configure_file_writer() -> Option<NonBlocking> {
    let (non_blocking, guard) = match std::env::var("RUSTY_RFP_LOG_FILE") {
        Ok(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .inspect_err(|err| eprintln!("Failed to open log file {path}: {err}"))
                .ok()?;
            tracing_appender::non_blocking(file)
        }
        Err(_) => {
            if let Err(err) = std::fs::create_dir_all("logs") {
                eprintln!("Failed to create logs directory: {err}");
                return None;
            }
            tracing_appender::non_blocking(tracing_appender::rolling::never(
                "logs",
                "rusty-rfp.log",
            ))
        }
    };
    let _ = LOG_GUARD.set(guard);
    Some(non_blocking)
}
