//! Error types for swworker

use std::fmt;
use std::io;

use crate::network::NetworkError;

/// Result type alias for worker operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the cache worker
#[derive(Debug)]
pub enum Error {
    /// Cache storage error
    Store(swstore::Error),

    /// Network request rejected
    Network(NetworkError),

    /// A manifest entry could not be fetched; nothing was stored
    InstallFailed { path: String, reason: String },

    /// Lifecycle transition not allowed from the current state
    InvalidState(String),

    /// Invalid configuration
    Config(String),

    /// Push payload is not valid JSON
    InvalidPayload(String),

    /// I/O error (config file)
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Store(e) => write!(f, "Cache storage error: {}", e),
            Error::Network(e) => write!(f, "Network error: {}", e),
            Error::InstallFailed { path, reason } => {
                write!(f, "Install failed: {} ({})", path, reason)
            }
            Error::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            Error::Config(msg) => write!(f, "Config error: {}", msg),
            Error::InvalidPayload(msg) => write!(f, "Invalid push payload: {}", msg),
            Error::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Store(e) => Some(e),
            Error::Network(e) => Some(e),
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<swstore::Error> for Error {
    fn from(err: swstore::Error) -> Self {
        Error::Store(err)
    }
}

impl From<NetworkError> for Error {
    fn from(err: NetworkError) -> Self {
        Error::Network(err)
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<regex::Error> for Error {
    fn from(err: regex::Error) -> Self {
        Error::Config(format!("invalid bot pattern: {}", err))
    }
}
