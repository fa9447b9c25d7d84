//! URL and origin parsing using nom
//!
//! Accepted forms:
//! ```text
//! scheme://host[:port][/path][?query][#fragment]   (absolute form)
//! /path[?query][#fragment]                        (origin form, resolved against an origin)
//! ```
//!
//! Fragments are dropped on parse; they never take part in cache keys.

use std::fmt;

use nom::{
    bytes::complete::{tag, take_till, take_while1},
    character::complete::{char, digit1},
    combinator::{map_res, opt},
    sequence::{preceded, terminated, tuple},
    IResult,
};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// Default port for a scheme, if it has one
pub fn default_port(scheme: &str) -> Option<u16> {
    match scheme {
        "http" | "ws" => Some(80),
        "https" | "wss" => Some(443),
        _ => None,
    }
}

/// Scheme, host and effective port of a URL
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Origin {
    scheme: String,
    host: String,
    port: Option<u16>,
}

impl Origin {
    /// Build an origin; a missing port falls back to the scheme default
    pub fn new(scheme: &str, host: &str, port: Option<u16>) -> Self {
        let scheme = scheme.to_ascii_lowercase();
        let port = port.or_else(|| default_port(&scheme));
        Self {
            scheme,
            host: host.to_ascii_lowercase(),
            port,
        }
    }

    /// Parse an origin from an absolute URL (path and query are ignored)
    pub fn parse(input: &str) -> Result<Self> {
        Ok(Url::parse(input)?.origin())
    }

    /// URL scheme (lowercase)
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Host name (lowercase)
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Explicit port, or the scheme default
    pub fn port(&self) -> Option<u16> {
        self.port
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.host)?;
        match self.port {
            Some(port) if Some(port) != default_port(&self.scheme) => write!(f, ":{}", port),
            _ => Ok(()),
        }
    }
}

impl Serialize for Origin {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Origin {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Origin::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Parsed absolute URL without fragment
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Url {
    scheme: String,
    host: String,
    port: Option<u16>,
    path: String,
    query: Option<String>,
}

impl Url {
    /// Parse an absolute URL
    pub fn parse(input: &str) -> Result<Self> {
        let (_rest, (scheme, host, port, path, query)) = absolute(input.trim())?;
        if !path.is_empty() && !path.starts_with('/') {
            return Err(Error::InvalidUrl(format!("unexpected path in '{}'", input)));
        }

        Ok(Url {
            scheme: scheme.to_ascii_lowercase(),
            host: host.to_ascii_lowercase(),
            port,
            path: if path.is_empty() { "/".to_string() } else { path.to_string() },
            query: query.map(str::to_string),
        })
    }

    /// Resolve a request target against an origin
    ///
    /// Origin-form targets (`/path?query`) are joined to `origin`;
    /// anything else must be an absolute URL.
    pub fn resolve(origin: &Origin, target: &str) -> Result<Self> {
        if !target.starts_with('/') {
            return Url::parse(target);
        }

        let (_rest, (path, query)) = origin_form(target)?;
        Ok(Url {
            scheme: origin.scheme.clone(),
            host: origin.host.clone(),
            port: origin.port,
            path: path.to_string(),
            query: query.map(str::to_string),
        })
    }

    /// Origin of this URL, with the port defaulted from the scheme
    pub fn origin(&self) -> Origin {
        Origin {
            scheme: self.scheme.clone(),
            host: self.host.clone(),
            port: self.port.or_else(|| default_port(&self.scheme)),
        }
    }

    /// URL scheme (lowercase)
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Host name (lowercase)
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Explicit port, or the scheme default
    pub fn port(&self) -> Option<u16> {
        self.port.or_else(|| default_port(&self.scheme))
    }

    /// Path component, always starting with `/`
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Query string without the leading `?`
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Path plus query, as sent on an HTTP request line
    pub fn path_and_query(&self) -> String {
        match &self.query {
            Some(q) => format!("{}?{}", self.path, q),
            None => self.path.clone(),
        }
    }

    /// `host[:port]` as sent in a `Host` header
    pub fn authority(&self) -> String {
        match self.port {
            Some(port) if Some(port) != default_port(&self.scheme) => {
                format!("{}:{}", self.host, port)
            }
            _ => self.host.clone(),
        }
    }
}

impl fmt::Display for Url {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}{}", self.scheme, self.authority(), self.path_and_query())
    }
}

type AbsoluteParts<'a> = (&'a str, &'a str, Option<u16>, &'a str, Option<&'a str>);

fn absolute(input: &str) -> IResult<&str, AbsoluteParts<'_>> {
    tuple((
        terminated(scheme, tag("://")),
        host,
        opt(port),
        take_till(|c| c == '?' || c == '#'),
        query,
    ))(input)
}

fn origin_form(input: &str) -> IResult<&str, (&str, Option<&str>)> {
    tuple((take_till(|c| c == '?' || c == '#'), query))(input)
}

fn scheme(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.')(input)
}

fn host(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| !matches!(c, ':' | '/' | '?' | '#'))(input)
}

fn port(input: &str) -> IResult<&str, u16> {
    preceded(char(':'), map_res(digit1, |s: &str| s.parse::<u16>()))(input)
}

fn query(input: &str) -> IResult<&str, Option<&str>> {
    opt(preceded(char('?'), take_till(|c| c == '#')))(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_absolute() {
        let url = Url::parse("HTTP://Example.COM:8080/a/b?x=1#top").unwrap();

        assert_eq!(url.scheme(), "http");
        assert_eq!(url.host(), "example.com");
        assert_eq!(url.port(), Some(8080));
        assert_eq!(url.path(), "/a/b");
        assert_eq!(url.query(), Some("x=1"));
        assert_eq!(url.to_string(), "http://example.com:8080/a/b?x=1");
    }

    #[test]
    fn test_empty_path_normalizes() {
        let url = Url::parse("https://example.com").unwrap();
        assert_eq!(url.path(), "/");
        assert_eq!(url.to_string(), "https://example.com/");
    }

    #[test]
    fn test_default_port_same_origin() {
        let a = Url::parse("http://example.com/x").unwrap();
        let b = Url::parse("http://example.com:80/y").unwrap();
        let c = Url::parse("https://example.com/x").unwrap();

        assert_eq!(a.origin(), b.origin());
        assert_ne!(a.origin(), c.origin());
        assert_eq!(b.origin().to_string(), "http://example.com");
    }

    #[test]
    fn test_resolve_origin_form() {
        let origin = Origin::parse("http://localhost:3000").unwrap();
        let url = Url::resolve(&origin, "/style.css?v=2").unwrap();

        assert_eq!(url.to_string(), "http://localhost:3000/style.css?v=2");
        assert_eq!(url.origin(), origin);
        assert_eq!(url.authority(), "localhost:3000");
    }

    #[test]
    fn test_resolve_absolute_target() {
        let origin = Origin::parse("http://localhost:3000").unwrap();
        let url = Url::resolve(&origin, "http://cdn.example.net/lib.js").unwrap();

        assert_eq!(url.host(), "cdn.example.net");
        assert_ne!(url.origin(), origin);
    }

    #[test]
    fn test_invalid_urls() {
        assert!(Url::parse("not a url").is_err());
        assert!(Url::parse("http://").is_err());
        assert!(Url::parse("http://host:abc/").is_err());
        assert!(Url::parse("http://host:99999/").is_err());
    }

    #[test]
    fn test_origin_display_omits_default_port() {
        let origin = Origin::parse("https://example.com:443/ignored").unwrap();
        assert_eq!(origin.to_string(), "https://example.com");
        assert_eq!(origin.port(), Some(443));
    }
}
