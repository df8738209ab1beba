//! Tracing subscriber setup.
//!
//! The library only emits `tracing` events. Binaries call [`init_logging`]
//! once at startup to print them, and optionally copy them to a file.

use std::path::Path;

use thiserror::Error;
use time::macros::format_description;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::LocalTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Errors installing the global subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// The log file path has no file name component.
    #[error("Invalid log file path: {0}")]
    InvalidPath(String),

    /// The log directory could not be created.
    #[error("Failed to create log directory: {0}")]
    CreateDir(#[from] std::io::Error),

    /// A global subscriber is already installed.
    #[error("Failed to install tracing subscriber: {0}")]
    Install(#[from] tracing_subscriber::util::TryInitError),
}

/// Keeps the file writer alive. Drop it at exit to flush buffered lines.
#[derive(Debug, Default)]
pub struct LoggingGuard {
    _file: Option<WorkerGuard>,
}

/// Default filter for a given `-v` count when `RUST_LOG` is not set.
pub fn default_filter(verbose: u8) -> &'static str {
    match verbose {
        0 => "rasterflow=info",
        1 => "rasterflow=debug",
        _ => "rasterflow=trace",
    }
}

/// Installs the global subscriber.
///
/// Console output goes to stderr with local wall-clock timestamps.
/// `RUST_LOG` overrides the verbosity-derived filter. With `log_file`,
/// events are also written there without ANSI colors through a
/// non-blocking writer.
pub fn init_logging(verbose: u8, log_file: Option<&Path>) -> Result<LoggingGuard, LoggingError> {
    let filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)))
    };

    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_timer(LocalTime::new(format_description!(
            "[hour]:[minute]:[second].[subsecond digits:3]"
        )))
        .with_target(false)
        .with_filter(filter());

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let file_name = path
                .file_name()
                .ok_or_else(|| LoggingError::InvalidPath(path.display().to_string()))?;
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            std::fs::create_dir_all(dir)?;

            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_timer(LocalTime::rfc_3339())
                .with_thread_names(true)
                .with_filter(filter());
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file_layer)
        .try_init()?;

    Ok(LoggingGuard { _file: guard })
}
