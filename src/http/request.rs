//! HTTP/1.1 request parsing using the [`httparse`] crate.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

use super::{Headers, Method};

/// Errors that can occur while parsing an HTTP/1.1 request.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request is incomplete — more data needed")]
    Incomplete,

    #[error("HTTP parse error: {0}")]
    Parse(#[from] httparse::Error),

    #[error("missing required field: {field}")]
    MissingField { field: &'static str },
}

/// The identity of a request for cache purposes: method plus target.
///
/// Two requests with the same identity are interchangeable as far as the
/// offline cache is concerned. The target includes the query string, so
/// `/api?page=1` and `/api?page=2` are distinct entries.
///
/// # Examples
///
/// ```
/// use portico::http::{Method, RequestIdentity};
///
/// let a = RequestIdentity::new(Method::Get, "/app.js");
/// let b = RequestIdentity::new(Method::Get, "/app.js");
/// assert_eq!(a, b);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestIdentity {
    method: Method,
    target: String,
}

impl RequestIdentity {
    /// Creates an identity from a method and a request target.
    pub fn new(method: Method, target: impl Into<String>) -> Self {
        Self {
            method,
            target: target.into(),
        }
    }

    /// Returns the method component.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the target component (path plus query string).
    pub fn target(&self) -> &str {
        &self.target
    }
}

impl fmt::Display for RequestIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.target)
    }
}

/// A fully parsed HTTP/1.1 request.
///
/// Created by [`Request::parse`] from a raw byte buffer. The body is stored
/// as a [`Bytes`] buffer. A `Request` can be serialized back to wire form
/// with [`Request::to_wire`] for the upstream hop.
///
/// # Examples
///
/// ```
/// use portico::http::request::Request;
///
/// let raw = b"GET /portal/?tab=recent HTTP/1.1\r\nHost: localhost\r\n\r\n";
/// let (request, _offset) = Request::parse(raw).unwrap();
///
/// assert_eq!(request.method().as_str(), "GET");
/// assert_eq!(request.target(), "/portal/?tab=recent");
/// assert_eq!(request.headers().get("host"), Some("localhost"));
/// ```
#[derive(Debug)]
pub struct Request {
    method: Method,
    target: String,
    /// HTTP minor version: 0 for HTTP/1.0, 1 for HTTP/1.1.
    version: u8,
    headers: Headers,
    body: Bytes,
}

impl Request {
    /// Maximum number of headers we support per request.
    const MAX_HEADERS: usize = 64;

    /// Parse a raw HTTP/1.1 request from a byte slice.
    ///
    /// Returns the parsed `Request` and the byte offset at which the body begins
    /// in `buf` (i.e. immediately after the `\r\n\r\n` header terminator).
    ///
    /// # Errors
    ///
    /// - [`RequestError::Incomplete`] — more data is needed to complete the request headers.
    /// - [`RequestError::Parse`] — the data is malformed and cannot be parsed.
    /// - [`RequestError::MissingField`] — a required field (method, target, version) is absent.
    pub fn parse(buf: &[u8]) -> Result<(Self, usize), RequestError> {
        let mut headers = [httparse::EMPTY_HEADER; Self::MAX_HEADERS];
        let mut raw_req = httparse::Request::new(&mut headers);

        let body_offset = match raw_req.parse(buf)? {
            httparse::Status::Complete(offset) => offset,
            httparse::Status::Partial => return Err(RequestError::Incomplete),
        };

        let method: Method = raw_req
            .method
            .ok_or(RequestError::MissingField { field: "method" })?
            .parse()
            .unwrap(); // Infallible

        let target = raw_req
            .path
            .ok_or(RequestError::MissingField { field: "target" })?
            .to_owned();

        let version = raw_req
            .version
            .ok_or(RequestError::MissingField { field: "version" })?;

        let mut header_map = Headers::with_capacity(raw_req.headers.len());
        for header in raw_req.headers.iter() {
            if let Ok(value) = std::str::from_utf8(header.value) {
                header_map.insert(header.name, value);
            }
        }

        // The buffer may hold pipelined bytes past this request. The body is
        // exactly what Content-Length declares; a request without one has no
        // body (RFC 9112 §6.2).
        let declared = header_map
            .get("content-length")
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        let body_end = body_offset + declared.min(buf.len() - body_offset);
        let body = Bytes::copy_from_slice(&buf[body_offset..body_end]);

        Ok((
            Self {
                method,
                target,
                version,
                headers: header_map,
                body,
            },
            body_offset,
        ))
    }

    /// Returns the HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the request target (path plus query string, as received).
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Returns the HTTP minor version number (0 = HTTP/1.0, 1 = HTTP/1.1).
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Returns the request headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the request body bytes.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Returns this request's cache identity (method + target).
    pub fn identity(&self) -> RequestIdentity {
        RequestIdentity::new(self.method.clone(), self.target.clone())
    }

    /// Returns `true` if the connection should be kept alive after this request.
    ///
    /// HTTP/1.1 defaults to keep-alive. HTTP/1.0 defaults to close unless
    /// `Connection: keep-alive` is explicitly set.
    pub fn is_keep_alive(&self) -> bool {
        match self.headers.get("connection") {
            Some(conn) => conn.eq_ignore_ascii_case("keep-alive"),
            None => self.version == 1, // HTTP/1.1 default: keep-alive
        }
    }

    /// Returns the value of the `Content-Length` header parsed as a `usize`, if present.
    pub fn content_length(&self) -> Option<usize> {
        self.headers.get("content-length")?.parse().ok()
    }

    /// Serializes this request for the upstream hop.
    ///
    /// The method, target, headers, and body are relayed as received. The two
    /// hop-by-hop fields are rewritten: `Connection: close` (the upstream
    /// connection carries exactly one exchange) and `Content-Length`
    /// recomputed from the body.
    pub fn to_wire(&self) -> BytesMut {
        let estimated_size = 64 + self.headers.len() * 64 + self.body.len();
        let mut buf = BytesMut::with_capacity(estimated_size);

        buf.put(format!("{} {} HTTP/1.1\r\n", self.method, self.target).as_bytes());

        for (name, value) in self.headers.iter() {
            if name.eq_ignore_ascii_case("connection") || name.eq_ignore_ascii_case("content-length")
            {
                continue;
            }
            buf.put(format!("{name}: {value}\r\n").as_bytes());
        }

        buf.put(&b"Connection: close\r\n"[..]);
        if !self.body.is_empty() {
            buf.put(format!("Content-Length: {}\r\n", self.body.len()).as_bytes());
        }
        buf.put(&b"\r\n"[..]);
        buf.put(self.body.as_ref());

        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_get() {
        let raw = b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n";
        let (req, offset) = Request::parse(raw).unwrap();
        assert_eq!(req.method().as_str(), "GET");
        assert_eq!(req.target(), "/");
        assert_eq!(req.version(), 1);
        assert_eq!(req.headers().get("host"), Some("localhost"));
        assert_eq!(offset, raw.len()); // no body
    }

    #[test]
    fn identity_includes_query() {
        let a = b"GET /search?q=rust HTTP/1.1\r\nHost: x\r\n\r\n";
        let b = b"GET /search?q=tokio HTTP/1.1\r\nHost: x\r\n\r\n";
        let (req_a, _) = Request::parse(a).unwrap();
        let (req_b, _) = Request::parse(b).unwrap();
        assert_ne!(req_a.identity(), req_b.identity());
        assert_eq!(req_a.identity().target(), "/search?q=rust");
    }

    #[test]
    fn incomplete_request() {
        let raw = b"GET / HTTP/1.1\r\nHost:";
        assert!(matches!(Request::parse(raw), Err(RequestError::Incomplete)));
    }

    #[test]
    fn keep_alive_http11_default() {
        let raw = b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n";
        let (req, _) = Request::parse(raw).unwrap();
        assert!(req.is_keep_alive());
    }

    #[test]
    fn connection_close() {
        let raw = b"GET / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n";
        let (req, _) = Request::parse(raw).unwrap();
        assert!(!req.is_keep_alive());
    }

    #[test]
    fn content_length() {
        let raw = b"POST / HTTP/1.1\r\nHost: localhost\r\nContent-Length: 5\r\n\r\nhello";
        let (req, body_offset) = Request::parse(raw).unwrap();
        assert_eq!(req.content_length(), Some(5));
        assert_eq!(&raw[body_offset..], b"hello");
    }

    #[test]
    fn pipelined_bytes_stay_out_of_the_body() {
        let raw =
            b"POST /a HTTP/1.1\r\nHost: x\r\nContent-Length: 5\r\n\r\nhelloGET /b HTTP/1.1\r\nHost: x\r\n\r\n";
        let (req, body_offset) = Request::parse(raw).unwrap();
        assert_eq!(req.body().as_ref(), b"hello");

        // The relayed form keeps the declared length, not an inflated one.
        let wire = String::from_utf8(req.to_wire().to_vec()).unwrap();
        assert!(wire.contains("Content-Length: 5\r\n"));
        assert!(wire.ends_with("\r\n\r\nhello"));

        // The next pipelined request begins right after this body.
        assert_eq!(&raw[body_offset + 5..body_offset + 8], b"GET");
    }

    #[test]
    fn no_content_length_means_no_body() {
        let raw = b"GET /a HTTP/1.1\r\nHost: x\r\n\r\nGET /b HTTP/1.1\r\nHost: x\r\n\r\n";
        let (req, _) = Request::parse(raw).unwrap();
        assert!(req.body().is_empty());
    }

    #[test]
    fn wire_form_rewrites_hop_by_hop() {
        let raw = b"POST /api HTTP/1.1\r\nHost: portal\r\nConnection: keep-alive\r\nContent-Length: 5\r\n\r\nhello";
        let (req, _) = Request::parse(raw).unwrap();
        let wire = String::from_utf8(req.to_wire().to_vec()).unwrap();
        assert!(wire.starts_with("POST /api HTTP/1.1\r\n"));
        assert!(wire.contains("Host: portal\r\n"));
        assert!(wire.contains("Connection: close\r\n"));
        assert!(!wire.contains("keep-alive"));
        assert!(wire.contains("Content-Length: 5\r\n"));
        assert!(wire.ends_with("\r\n\r\nhello"));
    }

    #[test]
    fn wire_form_no_body_omits_content_length() {
        let raw = b"GET /app.js HTTP/1.1\r\nHost: portal\r\n\r\n";
        let (req, _) = Request::parse(raw).unwrap();
        let wire = String::from_utf8(req.to_wire().to_vec()).unwrap();
        assert!(!wire.contains("Content-Length"));
        assert!(wire.ends_with("\r\n\r\n"));
    }
}
