//! Request descriptors and one-shot responses
//!
//! A [`Body`] can be read exactly once. Anything that needs to hand the same
//! response to two consumers (the caller and a cache partition) must call
//! [`Response::duplicate`] before either of them reads it.

use std::fmt;

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::url::Url;

/// HTTP request method
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Patch,
    Options,
    Other(String),
}

impl Method {
    /// Parse a method token (case-sensitive, as on the wire)
    pub fn parse(token: &str) -> Self {
        match token {
            "GET" => Method::Get,
            "HEAD" => Method::Head,
            "POST" => Method::Post,
            "PUT" => Method::Put,
            "DELETE" => Method::Delete,
            "PATCH" => Method::Patch,
            "OPTIONS" => Method::Options,
            other => Method::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Patch => "PATCH",
            Method::Options => "OPTIONS",
            Method::Other(token) => token,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered, case-insensitive header multimap
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// First value for `name`
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All values for `name`, in insertion order
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Add a value, keeping existing ones
    pub fn append(&mut self, name: &str, value: impl Into<String>) {
        self.entries.push((name.to_ascii_lowercase(), value.into()));
    }

    /// Replace every value for `name` with a single one
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.remove(name);
        self.append(name, value);
    }

    pub fn remove(&mut self, name: &str) {
        self.entries.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Iterate `(name, value)` pairs; names are lowercase
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (k, v) in iter {
            headers.append(k.as_ref(), v);
        }
        headers
    }
}

/// One-shot body
#[derive(Debug)]
pub struct Body {
    bytes: Option<Bytes>,
}

impl Body {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: Some(bytes.into()),
        }
    }

    pub fn empty() -> Self {
        Self::new(Bytes::new())
    }

    /// Whether the body has been read
    pub fn is_used(&self) -> bool {
        self.bytes.is_none()
    }

    /// Read the body. A second read fails with [`Error::BodyUsed`].
    pub fn take(&mut self) -> Result<Bytes> {
        self.bytes.take().ok_or(Error::BodyUsed)
    }

    /// Independent, unread copy of this body
    pub fn duplicate(&self) -> Result<Body> {
        match &self.bytes {
            Some(bytes) => Ok(Body {
                bytes: Some(bytes.clone()),
            }),
            None => Err(Error::BodyUsed),
        }
    }

    /// Length of the unread body, if any
    pub fn len(&self) -> Option<usize> {
        self.bytes.as_ref().map(Bytes::len)
    }
}

/// Request descriptor: the unit the router decides on and caches by
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub headers: Headers,
    pub body: Bytes,
}

impl Request {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: Headers::new(),
            body: Bytes::new(),
        }
    }

    /// Bare GET for `url`
    pub fn get(url: Url) -> Self {
        Self::new(Method::Get, url)
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn is_get(&self) -> bool {
        self.method == Method::Get
    }

    /// Whether the `Accept` header admits HTML
    pub fn accepts_html(&self) -> bool {
        self.headers
            .get_all("accept")
            .any(|v| v.contains("text/html"))
    }
}

/// HTTP response with a one-shot body
#[derive(Debug)]
pub struct Response {
    pub status: u16,
    pub status_text: String,
    pub headers: Headers,
    body: Body,
}

impl Response {
    pub fn new(status: u16, status_text: impl Into<String>) -> Self {
        Self {
            status,
            status_text: status_text.into(),
            headers: Headers::new(),
            body: Body::empty(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Body::new(body);
        self
    }

    /// Synthesized `503 Service Unavailable` with a plain-text body
    pub fn offline(text: &str) -> Self {
        Response::new(503, "Service Unavailable")
            .with_header("content-type", "text/plain")
            .with_body(Bytes::copy_from_slice(text.as_bytes()))
    }

    /// Status in 200..=299
    pub fn ok(&self) -> bool {
        (200..=299).contains(&self.status)
    }

    pub fn body_used(&self) -> bool {
        self.body.is_used()
    }

    pub fn body_len(&self) -> Option<usize> {
        self.body.len()
    }

    /// `content-type` header, if present
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type")
    }

    /// Read the body
    pub fn bytes(&mut self) -> Result<Bytes> {
        self.body.take()
    }

    /// Read the body as lossy UTF-8
    pub fn text(&mut self) -> Result<String> {
        let bytes = self.body.take()?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Copy this response so two consumers can each read a body.
    /// Fails once the body has been read.
    pub fn duplicate(&self) -> Result<Response> {
        Ok(Response {
            status: self.status,
            status_text: self.status_text.clone(),
            headers: self.headers.clone(),
            body: self.body.duplicate()?,
        })
    }

    /// Split into head and body
    pub fn into_parts(self) -> (u16, String, Headers, Body) {
        (self.status, self.status_text, self.headers, self.body)
    }
}
