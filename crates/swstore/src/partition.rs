//! Cache partition: a named map from request descriptor to stored response

use std::collections::HashMap;
use std::sync::Arc;

use ahash::RandomState;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::http::{Headers, Request, Response};

/// Maximum stored body size (16 MiB)
const MAX_BODY_SIZE: usize = 16 * 1024 * 1024;

/// Immutable snapshot of a successful response
#[derive(Debug, Clone, PartialEq)]
pub struct StoredResponse {
    pub status: u16,
    pub status_text: String,
    pub headers: Headers,
    pub body: Bytes,
    /// Request header values named by the response's `Vary` header
    pub vary: Vec<(String, Option<String>)>,
    pub stored_at: DateTime<Utc>,
}

impl StoredResponse {
    /// Fresh response with an unread body
    pub fn to_response(&self) -> Response {
        let mut response = Response::new(self.status, self.status_text.clone())
            .with_body(self.body.clone());
        response.headers = self.headers.clone();
        response
    }

    fn matches_vary(&self, request: &Request) -> bool {
        self.vary
            .iter()
            .all(|(name, value)| request.headers.get(name) == value.as_deref())
    }
}

/// Listing entry for a stored response
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EntryInfo {
    pub url: String,
    pub status: u16,
    pub size: usize,
    pub stored_at: DateTime<Utc>,
}

/// Cache key for a request: URL without fragment (only GET is ever stored)
pub fn cache_key(request: &Request) -> String {
    request.url.to_string()
}

/// Named cache bucket
pub struct Partition {
    name: String,
    entries: RwLock<HashMap<String, Arc<StoredResponse>, RandomState>>,
}

impl Partition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: RwLock::new(HashMap::with_hasher(RandomState::new())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Store `response` for `request`, overwriting any previous entry
    ///
    /// The response body is consumed; duplicate the response first if the
    /// caller also needs it.
    pub fn put(&self, request: &Request, mut response: Response) -> Result<()> {
        if !request.is_get() {
            return Err(Error::NotCacheable(format!(
                "{} {}",
                request.method, request.url
            )));
        }
        if response.status == 206 {
            return Err(Error::NotCacheable("partial content".to_string()));
        }

        let vary = vary_snapshot(request, &response.headers)?;
        let body = response.bytes()?;
        if body.len() > MAX_BODY_SIZE {
            return Err(Error::ValueTooLarge(body.len()));
        }

        let stored = StoredResponse {
            status: response.status,
            status_text: response.status_text,
            headers: response.headers,
            body,
            vary,
            stored_at: Utc::now(),
        };

        self.entries
            .write()
            .insert(cache_key(request), Arc::new(stored));
        Ok(())
    }

    /// Look up `request`; only GET requests match
    pub fn match_request(&self, request: &Request) -> Option<Response> {
        self.lookup(request).map(|stored| stored.to_response())
    }

    /// Stored snapshot for `request`
    pub fn lookup(&self, request: &Request) -> Option<Arc<StoredResponse>> {
        if !request.is_get() {
            return None;
        }

        let entries = self.entries.read();
        entries
            .get(&cache_key(request))
            .filter(|stored| stored.matches_vary(request))
            .cloned()
    }

    /// Remove the entry for `request`
    pub fn delete(&self, request: &Request) -> bool {
        self.entries.write().remove(&cache_key(request)).is_some()
    }

    /// Cached URLs, sorted
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Listing of every entry, sorted by URL
    pub fn entries(&self) -> Vec<EntryInfo> {
        let mut infos: Vec<EntryInfo> = self
            .entries
            .read()
            .iter()
            .map(|(url, stored)| EntryInfo {
                url: url.clone(),
                status: stored.status,
                size: stored.body.len(),
                stored_at: stored.stored_at,
            })
            .collect();
        infos.sort_by(|a, b| a.url.cmp(&b.url));
        infos
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

fn vary_snapshot(request: &Request, headers: &Headers) -> Result<Vec<(String, Option<String>)>> {
    let mut vary = Vec::new();
    for value in headers.get_all("vary") {
        for name in value.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            if name == "*" {
                return Err(Error::NotCacheable("Vary: *".to_string()));
            }
            let name = name.to_ascii_lowercase();
            let captured = request.headers.get(&name).map(str::to_string);
            vary.push((name, captured));
        }
    }
    Ok(vary)
}
