//! CLI error type.

use rasterflow::config::ConfigError;
use rasterflow::error::ResourceError;
use rasterflow::logging::LoggingError;
use rasterflow::PipelineError;
use thiserror::Error;

/// Exit code for a run cancelled with Ctrl+C (128 + SIGINT).
const EXIT_INTERRUPTED: i32 = 130;

/// Errors reported by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Pipeline(#[from] PipelineError),

    #[error("Output error: {0}")]
    Output(#[from] ResourceError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Logging error: {0}")]
    Logging(#[from] LoggingError),

    #[error("Failed to set signal handler: {0}")]
    Signal(String),

    #[error("Invalid arguments: {0}")]
    Usage(String),
}

impl CliError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Pipeline(PipelineError::Aborted) => EXIT_INTERRUPTED,
            _ => 1,
        }
    }
}
