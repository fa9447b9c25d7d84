//! HTTP/1.1 codec for the proxy
//!
//! Requests are parsed incrementally from a connection buffer; heads are
//! parsed with nom once the blank line has arrived. Only `Content-Length`
//! request bodies are accepted. Upstream responses are parsed from a
//! complete read (the proxy always sends `Connection: close` upstream) and
//! may be chunked, length-delimited or close-delimited.

use bytes::{Buf, Bytes, BytesMut};
use nom::{
    bytes::complete::{tag, take_till, take_while1, take_while_m_n},
    character::complete::{char, crlf, hex_digit1, one_of, space0},
    combinator::{map_res, opt},
    multi::many0,
    sequence::{preceded, terminated, tuple},
    IResult,
};
use swstore::{Headers, Response};

/// Maximum request/response head size (64 KiB)
const MAX_HEAD_SIZE: usize = 64 * 1024;

/// Maximum request body size (16 MiB)
const MAX_BODY_SIZE: usize = 16 * 1024 * 1024;

/// Headers that describe one connection, never forwarded or stored
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "transfer-encoding",
    "te",
    "trailer",
    "upgrade",
];

/// Whether `name` is connection-scoped
pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.iter().any(|h| h.eq_ignore_ascii_case(name))
}

/// A request read off a client connection
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRequest {
    pub method: String,
    pub target: String,
    pub headers: Headers,
    pub body: Bytes,
    pub keep_alive: bool,
}

impl ParsedRequest {
    /// Parse one request from `buf`, consuming it on success
    ///
    /// Returns `Ok(None)` when more data is needed.
    pub fn parse(buf: &mut BytesMut) -> Result<Option<ParsedRequest>, String> {
        let head_end = match find_head_end(buf) {
            Some(end) => end,
            None if buf.len() > MAX_HEAD_SIZE => {
                return Err(format!("request head too large (max: {} bytes)", MAX_HEAD_SIZE))
            }
            None => return Ok(None),
        };

        let (_, (method, target, minor, raw_headers)) = request_head(&buf[..head_end])
            .map_err(|e| format!("malformed request: {:?}", e.map(|e| e.code)))?;
        let method = String::from_utf8_lossy(method).into_owned();
        let target = String::from_utf8_lossy(target).into_owned();
        let headers = collect_headers(raw_headers);

        if headers
            .get("transfer-encoding")
            .is_some_and(|te| te.to_ascii_lowercase().contains("chunked"))
        {
            return Err("chunked request bodies are not supported".to_string());
        }

        let body_len = match headers.get("content-length") {
            Some(value) => value
                .trim()
                .parse::<usize>()
                .map_err(|_| format!("invalid content-length: {}", value))?,
            None => 0,
        };

        // Security: Prevent DoS via large body allocation
        if body_len > MAX_BODY_SIZE {
            return Err(format!(
                "request body too large: {} bytes (max: {} bytes)",
                body_len, MAX_BODY_SIZE
            ));
        }

        if buf.len() < head_end + body_len {
            return Ok(None); // Need more data
        }

        let connection = headers.get("connection").map(str::to_ascii_lowercase);
        let keep_alive = match (minor, connection.as_deref()) {
            (_, Some(c)) if c.contains("close") => false,
            ('0', Some(c)) => c.contains("keep-alive"),
            ('0', None) => false,
            _ => true,
        };

        buf.advance(head_end);
        let body = buf.split_to(body_len).freeze();

        Ok(Some(ParsedRequest {
            method,
            target,
            headers,
            body,
            keep_alive,
        }))
    }
}

/// Serialize a response for a client connection
///
/// The body is consumed; a response whose body was already read is sent
/// empty. `head_only` keeps `content-length` but omits the body.
pub fn encode_response(mut response: Response, keep_alive: bool, head_only: bool) -> Vec<u8> {
    let body = response.bytes().unwrap_or_default();

    let mut out = format!("HTTP/1.1 {} {}\r\n", response.status, response.status_text).into_bytes();
    for (name, value) in response.headers.iter() {
        if is_hop_by_hop(name) || name == "content-length" {
            continue;
        }
        out.extend_from_slice(format!("{}: {}\r\n", name, value).as_bytes());
    }
    out.extend_from_slice(format!("content-length: {}\r\n", body.len()).as_bytes());
    out.extend_from_slice(if keep_alive {
        b"connection: keep-alive\r\n\r\n".as_slice()
    } else {
        b"connection: close\r\n\r\n".as_slice()
    });
    if !head_only {
        out.extend_from_slice(&body);
    }
    out
}

/// Parse a complete upstream response
///
/// Hop-by-hop headers and `content-length` are dropped; the body is
/// de-chunked.
pub fn parse_response(input: &[u8], head_request: bool) -> Result<Response, String> {
    let head_end = find_head_end(input).ok_or_else(|| "incomplete response head".to_string())?;
    if head_end > MAX_HEAD_SIZE {
        return Err(format!("response head too large (max: {} bytes)", MAX_HEAD_SIZE));
    }

    let (_, (status, reason, raw_headers)) = response_head(&input[..head_end])
        .map_err(|e| format!("malformed response: {:?}", e.map(|e| e.code)))?;
    let all_headers = collect_headers(raw_headers);
    let rest = &input[head_end..];

    let no_body = head_request || status == 204 || status == 304 || (100..200).contains(&status);
    let chunked = all_headers
        .get("transfer-encoding")
        .is_some_and(|te| te.to_ascii_lowercase().contains("chunked"));

    let body = if no_body {
        Vec::new()
    } else if chunked {
        decode_chunked(rest)?
    } else if let Some(value) = all_headers.get("content-length") {
        let len = value
            .trim()
            .parse::<usize>()
            .map_err(|_| format!("invalid content-length: {}", value))?;
        if rest.len() < len {
            return Err(format!("truncated body: {} of {} bytes", rest.len(), len));
        }
        rest[..len].to_vec()
    } else {
        rest.to_vec()
    };

    let mut response = Response::new(status, reason).with_body(body);
    for (name, value) in all_headers.iter() {
        if !is_hop_by_hop(name) && name != "content-length" {
            response.headers.append(name, value);
        }
    }
    Ok(response)
}

/// Decode a chunked body; trailers are ignored
pub fn decode_chunked(mut input: &[u8]) -> Result<Vec<u8>, String> {
    let mut out = Vec::new();
    loop {
        let (rest, size) = chunk_size(input).map_err(|_| "invalid chunk size".to_string())?;
        if size == 0 {
            return Ok(out);
        }
        if size > MAX_BODY_SIZE - out.len() {
            return Err(format!("chunked body too large (max: {} bytes)", MAX_BODY_SIZE));
        }
        let end = size
            .checked_add(2)
            .ok_or_else(|| "invalid chunk size".to_string())?;
        if rest.len() < end {
            return Err("truncated chunk".to_string());
        }
        if &rest[size..end] != b"\r\n" {
            return Err("expected \\r\\n after chunk".to_string());
        }
        out.extend_from_slice(&rest[..size]);
        input = &rest[end..];
    }
}

fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|i| i + 4)
}

fn collect_headers(raw: Vec<(&[u8], &[u8])>) -> Headers {
    raw.into_iter()
        .map(|(name, value)| {
            (
                String::from_utf8_lossy(name).into_owned(),
                String::from_utf8_lossy(value).trim_end().to_string(),
            )
        })
        .collect()
}

fn is_tchar(c: u8) -> bool {
    c.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&c)
}

type RequestHead<'a> = (&'a [u8], &'a [u8], char, Vec<(&'a [u8], &'a [u8])>);

fn request_head(input: &[u8]) -> IResult<&[u8], RequestHead<'_>> {
    tuple((
        terminated(take_while1(is_tchar), char(' ')),
        terminated(take_while1(|c: u8| c != b' ' && c != b'\r'), char(' ')),
        terminated(preceded(tag("HTTP/1."), one_of("01")), crlf),
        terminated(many0(header), crlf),
    ))(input)
}

type ResponseHead<'a> = (u16, String, Vec<(&'a [u8], &'a [u8])>);

fn response_head(input: &[u8]) -> IResult<&[u8], ResponseHead<'_>> {
    let (input, _) = terminated(preceded(tag("HTTP/1."), one_of("01")), char(' '))(input)?;
    let (input, status) = map_res(take_while_m_n(3, 3, |c: u8| c.is_ascii_digit()), |d: &[u8]| {
        std::str::from_utf8(d)
            .map_err(|_| ())
            .and_then(|s| s.parse::<u16>().map_err(|_| ()))
    })(input)?;
    let (input, reason) = terminated(
        opt(preceded(char(' '), take_till(|c| c == b'\r'))),
        crlf,
    )(input)?;
    let (input, headers) = terminated(many0(header), crlf)(input)?;

    let reason = reason
        .map(|r| String::from_utf8_lossy(r).into_owned())
        .unwrap_or_default();
    Ok((input, (status, reason, headers)))
}

fn header(input: &[u8]) -> IResult<&[u8], (&[u8], &[u8])> {
    tuple((
        terminated(take_while1(is_tchar), char(':')),
        preceded(space0, terminated(take_till(|c| c == b'\r'), crlf)),
    ))(input)
}

fn chunk_size(input: &[u8]) -> IResult<&[u8], usize> {
    terminated(
        map_res(hex_digit1, |h: &[u8]| {
            std::str::from_utf8(h)
                .map_err(|_| ())
                .and_then(|s| usize::from_str_radix(s, 16).map_err(|_| ()))
        }),
        tuple((opt(preceded(char(';'), take_till(|c| c == b'\r'))), crlf)),
    )(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_get() {
        let data = b"GET /style.css HTTP/1.1\r\nHost: localhost\r\nAccept: text/css\r\n\r\n";
        let mut buf = BytesMut::from(&data[..]);

        let req = ParsedRequest::parse(&mut buf).unwrap().unwrap();

        assert_eq!(req.method, "GET");
        assert_eq!(req.target, "/style.css");
        assert_eq!(req.headers.get("accept"), Some("text/css"));
        assert!(req.body.is_empty());
        assert!(req.keep_alive);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_parse_post_with_body() {
        let data = b"POST /__sw/message HTTP/1.1\r\nContent-Length: 22\r\n\r\n{\"type\":\"CLEAR_CACHE\"}";
        let mut buf = BytesMut::from(&data[..]);

        let req = ParsedRequest::parse(&mut buf).unwrap().unwrap();

        assert_eq!(req.method, "POST");
        assert_eq!(&req.body[..], b"{\"type\":\"CLEAR_CACHE\"}");
    }

    #[test]
    fn test_incomplete_data() {
        let mut buf = BytesMut::from(&b"GET / HTTP/1.1\r\nHost: a\r\n"[..]);
        assert!(ParsedRequest::parse(&mut buf).unwrap().is_none());

        let mut buf = BytesMut::from(&b"POST / HTTP/1.1\r\nContent-Length: 10\r\n\r\nabc"[..]);
        let before = buf.len();
        assert!(ParsedRequest::parse(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), before); // Nothing consumed
    }

    #[test]
    fn test_pipelined_requests() {
        let data = b"GET /a HTTP/1.1\r\n\r\nGET /b HTTP/1.1\r\nConnection: close\r\n\r\n";
        let mut buf = BytesMut::from(&data[..]);

        let first = ParsedRequest::parse(&mut buf).unwrap().unwrap();
        let second = ParsedRequest::parse(&mut buf).unwrap().unwrap();

        assert_eq!(first.target, "/a");
        assert_eq!(second.target, "/b");
        assert!(!second.keep_alive);
        assert!(ParsedRequest::parse(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_http10_defaults_to_close() {
        let mut buf = BytesMut::from(&b"GET / HTTP/1.0\r\n\r\n"[..]);
        assert!(!ParsedRequest::parse(&mut buf).unwrap().unwrap().keep_alive);

        let mut buf = BytesMut::from(&b"GET / HTTP/1.0\r\nConnection: keep-alive\r\n\r\n"[..]);
        assert!(ParsedRequest::parse(&mut buf).unwrap().unwrap().keep_alive);
    }

    #[test]
    fn test_malformed_request() {
        let mut buf = BytesMut::from(&b"GARBAGE\r\n\r\n"[..]);
        assert!(ParsedRequest::parse(&mut buf).is_err());

        let mut buf = BytesMut::from(&b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n"[..]);
        assert!(ParsedRequest::parse(&mut buf).is_err());
    }

    #[test]
    fn test_encode_response() {
        let resp = Response::new(503, "Service Unavailable")
            .with_header("content-type", "text/plain")
            .with_header("transfer-encoding", "chunked")
            .with_body("Offline");

        let encoded = String::from_utf8(encode_response(resp, false, false)).unwrap();

        assert!(encoded.starts_with("HTTP/1.1 503 Service Unavailable\r\n"));
        assert!(encoded.contains("content-type: text/plain\r\n"));
        assert!(encoded.contains("content-length: 7\r\n"));
        assert!(encoded.contains("connection: close\r\n"));
        assert!(!encoded.contains("transfer-encoding"));
        assert!(encoded.ends_with("\r\n\r\nOffline"));
    }

    #[test]
    fn test_encode_head_response_omits_body() {
        let resp = Response::new(200, "OK").with_body("hello");
        let encoded = String::from_utf8(encode_response(resp, true, true)).unwrap();

        assert!(encoded.contains("content-length: 5\r\n"));
        assert!(encoded.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_parse_length_response() {
        let data = b"HTTP/1.1 200 OK\r\nContent-Type: text/css\r\nContent-Length: 6\r\nConnection: close\r\n\r\nbody{}";
        let mut resp = parse_response(data, false).unwrap();

        assert_eq!(resp.status, 200);
        assert_eq!(resp.status_text, "OK");
        assert_eq!(resp.content_type(), Some("text/css"));
        assert!(!resp.headers.contains("connection"));
        assert_eq!(resp.text().unwrap(), "body{}");
    }

    #[test]
    fn test_parse_chunked_response() {
        let data = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n4\r\nWiki\r\n5;ext=1\r\npedia\r\n0\r\n\r\n";
        let mut resp = parse_response(data, false).unwrap();

        assert!(!resp.headers.contains("transfer-encoding"));
        assert_eq!(resp.text().unwrap(), "Wikipedia");
    }

    #[test]
    fn test_parse_close_delimited_response() {
        let data = b"HTTP/1.0 404 Not Found\r\n\r\nmissing";
        let mut resp = parse_response(data, false).unwrap();

        assert_eq!(resp.status, 404);
        assert_eq!(resp.text().unwrap(), "missing");
    }

    #[test]
    fn test_parse_response_without_reason() {
        let data = b"HTTP/1.1 204\r\n\r\n";
        let resp = parse_response(data, false).unwrap();

        assert_eq!(resp.status, 204);
        assert_eq!(resp.status_text, "");
    }

    #[test]
    fn test_parse_bad_responses() {
        assert!(parse_response(b"SSH-2.0-OpenSSH\r\n\r\n", false).is_err());
        assert!(parse_response(b"HTTP/1.1 200 OK\r\n", false).is_err());
        assert!(parse_response(b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nabc", false).is_err());
        assert!(decode_chunked(b"zz\r\n").is_err());
        assert!(decode_chunked(b"5\r\nab").is_err());
    }

    #[test]
    fn test_oversized_chunk_rejected() {
        let data = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\nffffffffffffffff\r\nab\r\n0\r\n\r\n";
        assert!(parse_response(data, false).is_err());

        assert!(decode_chunked(b"1000001\r\nab\r\n0\r\n\r\n").is_err());
        assert!(decode_chunked(b"fffffffffffffffe\r\n").is_err());
    }
}
