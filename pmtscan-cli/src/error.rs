//! CLI error handling with user-facing messages.

use pmtscan::scan::ScanError;
use pmtscan::session::SessionError;
use std::fmt;
use std::process;

/// CLI-level errors mapped to exit behavior.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(String),
    /// Configuration file could not be loaded
    Config(String),
    /// The scan session failed
    Scan(SessionError),
}

impl CliError {
    /// Prints the error and exits with a nonzero status.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {self}");

        if let CliError::Scan(SessionError::Scan(ScanError::Motion(_))) = self {
            eprintln!();
            eprintln!("Check the [motion] section of the configuration:");
            eprintln!("  reference targets must lie inside the machine limits");
        }

        process::exit(1)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(msg) => write!(f, "failed to initialize logging: {msg}"),
            CliError::Config(msg) => write!(f, "configuration error: {msg}"),
            CliError::Scan(e) => write!(f, "scan failed: {e}"),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Scan(e) => Some(e),
            _ => None,
        }
    }
}

impl From<SessionError> for CliError {
    fn from(e: SessionError) -> Self {
        CliError::Scan(e)
    }
}
