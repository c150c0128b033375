//! CLI runner for common setup.
//!
//! Encapsulates logging initialization and startup logging so each command
//! handler only deals with its own work.

use globetile::logging::{default_log_dir, init_logging, LoggingGuard, DEFAULT_LOG_FILE};
use tracing::info;

use crate::error::CliError;

/// Runner that manages the CLI lifecycle.
pub struct CliRunner {
    /// Logging guard - keeps logging active while runner exists
    #[allow(dead_code)]
    logging_guard: LoggingGuard,
}

impl CliRunner {
    /// Create a new CLI runner, initializing logging.
    ///
    /// Only warnings reach the terminal by default so progress output stays
    /// readable. `verbose` turns on debug output for the library. `RUST_LOG`
    /// overrides both.
    pub fn new(verbose: bool) -> Result<Self, CliError> {
        let level = if verbose { "globetile=debug,info" } else { "warn" };
        let logging_guard = init_logging(&default_log_dir(), DEFAULT_LOG_FILE, level)
            .map_err(|e| CliError::LoggingInit(e.to_string()))?;

        Ok(Self { logging_guard })
    }

    /// Log startup information for a command.
    pub fn log_startup(&self, command: &str) {
        info!("Globetile v{}", globetile::VERSION);
        info!("Globetile CLI: {} command", command);
    }
}
