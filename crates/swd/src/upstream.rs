//! Upstream network: plain HTTP/1.1 over TCP, one connection per fetch

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use swstore::{Method, Request, Response};
use swworker::{Network, NetworkError};

use crate::http::{is_hop_by_hop, parse_response};

/// Maximum upstream response size (32 MiB)
const MAX_RESPONSE_SIZE: u64 = 32 * 1024 * 1024;

/// Fetches over plain TCP with `Connection: close`
#[derive(Debug, Clone, Copy)]
pub struct HttpNetwork {
    max_response_size: u64,
}

impl Default for HttpNetwork {
    fn default() -> Self {
        Self {
            max_response_size: MAX_RESPONSE_SIZE,
        }
    }
}

impl HttpNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap on the raw bytes read from one upstream response
    pub fn with_max_response_size(mut self, max: u64) -> Self {
        self.max_response_size = max;
        self
    }
}

impl Network for HttpNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
        let url = &request.url;
        if url.scheme() != "http" {
            return Err(NetworkError::UnsupportedScheme(url.scheme().to_string()));
        }

        let addr = format!("{}:{}", url.host(), url.port().unwrap_or(80));
        let mut stream = TcpStream::connect(&addr)
            .await
            .map_err(|e| NetworkError::Unreachable(format!("{}: {}", addr, e)))?;

        stream
            .write_all(&encode_request(request))
            .await
            .map_err(|e| NetworkError::Io(e.to_string()))?;

        // One byte past the cap tells an oversized response from one that fits exactly
        let mut raw = Vec::new();
        (&mut stream)
            .take(self.max_response_size.saturating_add(1))
            .read_to_end(&mut raw)
            .await
            .map_err(|e| NetworkError::Io(e.to_string()))?;
        if raw.len() as u64 > self.max_response_size {
            return Err(NetworkError::Protocol(format!(
                "response too large (max: {} bytes)",
                self.max_response_size
            )));
        }

        debug!(url = %url, bytes = raw.len(), "upstream response");
        parse_response(&raw, request.method == Method::Head).map_err(NetworkError::Protocol)
    }
}

/// Serialize a request for the upstream connection
pub fn encode_request(request: &Request) -> Vec<u8> {
    let mut out = format!(
        "{} {} HTTP/1.1\r\nhost: {}\r\n",
        request.method,
        request.url.path_and_query(),
        request.url.authority()
    )
    .into_bytes();

    for (name, value) in request.headers.iter() {
        if is_hop_by_hop(name) || name == "host" || name == "content-length" {
            continue;
        }
        out.extend_from_slice(format!("{}: {}\r\n", name, value).as_bytes());
    }
    if !request.body.is_empty() || matches!(request.method, Method::Post | Method::Put | Method::Patch) {
        out.extend_from_slice(format!("content-length: {}\r\n", request.body.len()).as_bytes());
    }
    out.extend_from_slice(b"connection: close\r\n\r\n");
    out.extend_from_slice(&request.body);
    out
}
