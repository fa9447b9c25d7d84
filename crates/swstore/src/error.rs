//! Error types for swstore

use std::fmt;

/// Result type alias for swstore operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for cache storage operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// URL could not be parsed
    InvalidUrl(String),

    /// Body stream was already consumed
    BodyUsed,

    /// Entry refused by the partition (non-GET request, partial response)
    NotCacheable(String),

    /// Body too large to store (max 16 MiB)
    ValueTooLarge(usize),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidUrl(msg) => write!(f, "Invalid URL: {}", msg),
            Error::BodyUsed => write!(f, "Body has already been consumed"),
            Error::NotCacheable(msg) => write!(f, "Not cacheable: {}", msg),
            Error::ValueTooLarge(size) => {
                write!(f, "Body too large: {} bytes (max 16 MiB)", size)
            }
        }
    }
}

impl std::error::Error for Error {}

impl From<nom::Err<nom::error::Error<&str>>> for Error {
    fn from(err: nom::Err<nom::error::Error<&str>>) -> Self {
        Error::InvalidUrl(format!("{:?}", err))
    }
}
