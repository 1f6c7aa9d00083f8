//! Error types for CLI operations.

use contracts::RelayError;
use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Listener or HTTP socket could not be bound
    #[error("Failed to bind {what} on {addr}: {message}")]
    Bind {
        what: &'static str,
        addr: String,
        message: String,
    },

    /// Relay used in the wrong lifecycle state
    #[error("Relay is not running")]
    NotRunning,
}

impl CliError {
    pub fn config_not_found(path: impl std::fmt::Display) -> Self {
        Self::ConfigNotFound {
            path: path.to_string(),
        }
    }

    pub fn bind(what: &'static str, addr: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Bind {
            what,
            addr: addr.into(),
            message: message.to_string(),
        }
    }
}

impl From<CliError> for RelayError {
    fn from(error: CliError) -> Self {
        RelayError::Other(error.to_string())
    }
}
