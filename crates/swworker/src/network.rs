//! Network seam: how the worker reaches the origin

use std::fmt;
use std::future::Future;

use swstore::{Request, Response};

/// A fetch that was rejected before producing any response
///
/// A response with a non-ok status is not a `NetworkError`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    /// Host could not be reached (offline, connection refused, DNS)
    Unreachable(String),
    /// Connection broke mid-exchange
    Io(String),
    /// Upstream sent something that is not HTTP
    Protocol(String),
    /// Scheme the network cannot speak
    UnsupportedScheme(String),
}

impl fmt::Display for NetworkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkError::Unreachable(msg) => write!(f, "unreachable: {}", msg),
            NetworkError::Io(msg) => write!(f, "I/O: {}", msg),
            NetworkError::Protocol(msg) => write!(f, "protocol: {}", msg),
            NetworkError::UnsupportedScheme(scheme) => write!(f, "unsupported scheme: {}", scheme),
        }
    }
}

impl std::error::Error for NetworkError {}

/// Performs live fetches on behalf of the worker
pub trait Network: Send + Sync + 'static {
    /// Fetch `request` from the network
    fn fetch(
        &self,
        request: &Request,
    ) -> impl Future<Output = Result<Response, NetworkError>> + Send;
}
