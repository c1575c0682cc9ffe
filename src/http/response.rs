//! HTTP/1.1 response builder, serializer, and parser.
//!
//! Provides a fluent builder API for constructing HTTP responses, wire
//! serialization for transmission over TCP, and parsing of upstream
//! responses received over TCP.

use bytes::{BufMut, BytesMut};
use thiserror::Error;

use super::{Headers, StatusCode};

/// Errors that can occur while parsing an HTTP/1.1 response from an upstream.
#[derive(Debug, Error)]
pub enum ResponseError {
    #[error("response is incomplete — more data needed")]
    Incomplete,

    #[error("HTTP parse error: {0}")]
    Parse(#[from] httparse::Error),

    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("unrecognized status code {0}")]
    UnknownStatus(u16),

    #[error("body truncated: expected {expected} bytes, got {got}")]
    TruncatedBody { expected: usize, got: usize },

    #[error("malformed chunked transfer encoding")]
    BadChunk,
}

/// An HTTP/1.1 response.
///
/// Built fluently for locally generated responses, or produced by
/// [`Response::parse`] from upstream bytes. Cloning is a deep copy; the
/// offline cache stores responses in a cheaper snapshot form instead
/// (see [`crate::cache::StoredResponse`]).
///
/// # Examples
///
/// ```
/// use portico::http::{Response, StatusCode};
///
/// let response = Response::new(StatusCode::Ok)
///     .header("Content-Type", "application/json")
///     .body(r#"{"status":"ok"}"#);
///
/// let bytes = response.into_bytes();
/// let text = std::str::from_utf8(&bytes).unwrap();
/// assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
/// assert!(text.contains("Content-Length: 15\r\n"));
/// ```
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    headers: Headers,
    body: Vec<u8>,
    keep_alive: bool,
}

impl Response {
    /// Maximum number of headers we support per response.
    const MAX_HEADERS: usize = 64;

    /// Creates a new response with the given status and an empty body.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: Vec::new(),
            keep_alive: true,
        }
    }

    /// Creates a response from already-parsed parts. Used when rehydrating a
    /// cached entry.
    pub fn from_parts(status: StatusCode, headers: Headers, body: Vec<u8>) -> Self {
        Self {
            status,
            headers,
            body,
            keep_alive: true,
        }
    }

    /// Parse a complete HTTP/1.1 response from a byte slice.
    ///
    /// `buf` must hold the entire response; the upstream client reads to EOF
    /// before calling this. `Content-Length` and `Connection` entries are not
    /// carried into the parsed header map — both are recomputed when the
    /// response is serialized for the client hop.
    ///
    /// # Errors
    ///
    /// - [`ResponseError::Incomplete`] — the header section never terminated.
    /// - [`ResponseError::Parse`] — malformed response data.
    /// - [`ResponseError::UnknownStatus`] — a status code this crate does not name.
    /// - [`ResponseError::TruncatedBody`] — fewer body bytes than `Content-Length` promised.
    pub fn parse(buf: &[u8]) -> Result<Self, ResponseError> {
        Self::parse_inner(buf, true)
    }

    /// Parse a response to a HEAD request.
    ///
    /// HEAD responses advertise the `Content-Length` a GET would have
    /// returned but carry no body bytes (RFC 9112 §6.3), so the length
    /// check of [`parse`](Self::parse) does not apply.
    pub fn parse_head(buf: &[u8]) -> Result<Self, ResponseError> {
        Self::parse_inner(buf, false)
    }

    fn parse_inner(buf: &[u8], request_has_body: bool) -> Result<Self, ResponseError> {
        let mut headers = [httparse::EMPTY_HEADER; Self::MAX_HEADERS];
        let mut raw_resp = httparse::Response::new(&mut headers);

        let body_offset = match raw_resp.parse(buf)? {
            httparse::Status::Complete(offset) => offset,
            httparse::Status::Partial => return Err(ResponseError::Incomplete),
        };

        let code = raw_resp
            .code
            .ok_or(ResponseError::MissingField { field: "status" })?;
        let status = StatusCode::from_u16(code).ok_or(ResponseError::UnknownStatus(code))?;

        let mut content_length: Option<usize> = None;
        let mut chunked = false;
        let mut header_map = Headers::with_capacity(raw_resp.headers.len());
        for header in raw_resp.headers.iter() {
            let Ok(value) = std::str::from_utf8(header.value) else {
                continue;
            };
            if header.name.eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().ok();
                continue;
            }
            if header.name.eq_ignore_ascii_case("transfer-encoding") {
                chunked = value.to_ascii_lowercase().contains("chunked");
                continue;
            }
            if header.name.eq_ignore_ascii_case("connection") {
                continue;
            }
            header_map.insert(header.name, value);
        }

        // 204, 304, and 1xx responses never carry a body regardless of any
        // declared length (RFC 9112 §6.3); neither does any response to HEAD.
        let bodyless = !request_has_body
            || matches!(status, StatusCode::NoContent | StatusCode::NotModified)
            || status.as_u16() < 200;

        let mut body = if bodyless {
            Vec::new()
        } else if chunked {
            decode_chunked(&buf[body_offset..])?
        } else {
            buf[body_offset..].to_vec()
        };
        if let Some(expected) = content_length.filter(|_| !chunked && !bodyless) {
            if body.len() < expected {
                return Err(ResponseError::TruncatedBody {
                    expected,
                    got: body.len(),
                });
            }
            body.truncate(expected);
        }

        Ok(Self {
            status,
            headers: header_map,
            body,
            keep_alive: true,
        })
    }

    /// Appends a response header. Multiple calls with the same name are additive.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Sets the response body from a string.
    ///
    /// The `Content-Length` header is written automatically by [`into_bytes`](Self::into_bytes).
    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into().into_bytes();
        self
    }

    /// Sets the response body from raw bytes.
    #[must_use]
    pub fn body_bytes(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Controls whether the `Connection: keep-alive` or `Connection: close` header is written.
    #[must_use]
    pub fn keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    /// Returns the status code of this response.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the response headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the response body bytes.
    pub fn body_slice(&self) -> &[u8] {
        &self.body
    }

    /// Serializes the response into a `BytesMut` buffer using HTTP/1.1 wire format.
    ///
    /// Automatically adds:
    /// - `Content-Type: text/plain; charset=utf-8` if the body is non-empty and no
    ///   `Content-Type` header was set.
    /// - `Content-Length: <n>` (always written).
    /// - `Connection: keep-alive` or `Connection: close`.
    pub fn into_bytes(mut self) -> BytesMut {
        let content_length = self.body.len();

        if !self.body.is_empty() && !self.headers.contains("content-type") {
            self.headers
                .insert("Content-Type", "text/plain; charset=utf-8");
        }

        let connection = if self.keep_alive {
            "keep-alive"
        } else {
            "close"
        };
        self.headers.insert("Connection", connection);

        let estimated_size = 128 + self.headers.len() * 64 + content_length;
        let mut buf = BytesMut::with_capacity(estimated_size);

        // Status line
        buf.put(
            format!(
                "HTTP/1.1 {} {}\r\n",
                self.status.as_u16(),
                self.status.canonical_reason()
            )
            .as_bytes(),
        );

        // Headers
        for (name, value) in self.headers.iter() {
            buf.put(format!("{name}: {value}\r\n").as_bytes());
        }

        // Content-Length is always the last header before the blank line
        buf.put(format!("Content-Length: {content_length}\r\n").as_bytes());

        // Header/body separator
        buf.put(&b"\r\n"[..]);

        // Body
        if !self.body.is_empty() {
            buf.put(self.body.as_slice());
        }

        buf
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new(StatusCode::Ok)
    }
}

/// Decodes a complete `Transfer-Encoding: chunked` body.
///
/// Chunk extensions are ignored; trailers after the terminal chunk are
/// dropped.
fn decode_chunked(raw: &[u8]) -> Result<Vec<u8>, ResponseError> {
    let mut out = Vec::with_capacity(raw.len());
    let mut rest = raw;
    loop {
        let line_end = rest
            .windows(2)
            .position(|w| w == b"\r\n")
            .ok_or(ResponseError::BadChunk)?;
        let size_line =
            std::str::from_utf8(&rest[..line_end]).map_err(|_| ResponseError::BadChunk)?;
        let size_hex = size_line.split(';').next().unwrap_or("").trim();
        let size = usize::from_str_radix(size_hex, 16).map_err(|_| ResponseError::BadChunk)?;
        rest = &rest[line_end + 2..];
        if size == 0 {
            return Ok(out);
        }
        // A hostile size line can be up to usize::MAX; the chunk plus its
        // trailing CRLF must fit in what was actually received.
        let framed = size.checked_add(2).ok_or(ResponseError::BadChunk)?;
        if rest.len() < framed {
            return Err(ResponseError::TruncatedBody {
                expected: size,
                got: rest.len().saturating_sub(2),
            });
        }
        if &rest[size..size + 2] != b"\r\n" {
            return Err(ResponseError::BadChunk);
        }
        out.extend_from_slice(&rest[..size]);
        rest = &rest[size + 2..];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn to_string(bytes: BytesMut) -> String {
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn simple_ok_response() {
        let r = Response::new(StatusCode::Ok).body("Hello");
        let s = to_string(r.into_bytes());
        assert!(s.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(s.contains("Content-Length: 5\r\n"));
        assert!(s.ends_with("\r\n\r\nHello"));
    }

    #[test]
    fn custom_header() {
        let r = Response::new(StatusCode::Ok)
            .header("X-Request-Id", "abc-123")
            .body("ok");
        let s = to_string(r.into_bytes());
        assert!(s.contains("X-Request-Id: abc-123\r\n"));
    }

    #[test]
    fn no_body_no_content_type() {
        let r = Response::new(StatusCode::NoContent);
        let s = to_string(r.into_bytes());
        assert!(!s.contains("Content-Type"));
        assert!(s.contains("Content-Length: 0\r\n"));
    }

    #[test]
    fn connection_close() {
        let r = Response::new(StatusCode::Ok).keep_alive(false);
        let s = to_string(r.into_bytes());
        assert!(s.contains("Connection: close\r\n"));
    }

    #[test]
    fn parse_upstream_response() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: 5\r\nConnection: close\r\n\r\nhello";
        let r = Response::parse(raw).unwrap();
        assert_eq!(r.status(), StatusCode::Ok);
        assert_eq!(r.headers().get("content-type"), Some("text/html"));
        assert_eq!(r.body_slice(), b"hello");
        // hop-by-hop fields are recomputed on serialization, not relayed
        assert!(!r.headers().contains("content-length"));
        assert!(!r.headers().contains("connection"));
    }

    #[test]
    fn parse_without_content_length_takes_rest() {
        let raw = b"HTTP/1.1 200 OK\r\n\r\nstreamed-until-eof";
        let r = Response::parse(raw).unwrap();
        assert_eq!(r.body_slice(), b"streamed-until-eof");
    }

    #[test]
    fn parse_truncated_body() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\nshort";
        assert!(matches!(
            Response::parse(raw),
            Err(ResponseError::TruncatedBody { expected: 100, got: 5 })
        ));
    }

    #[test]
    fn parse_unknown_status() {
        let raw = b"HTTP/1.1 418 I'm a teapot\r\n\r\n";
        assert!(matches!(
            Response::parse(raw),
            Err(ResponseError::UnknownStatus(418))
        ));
    }

    #[test]
    fn parse_chunked_body() {
        let raw = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n5\r\nhello\r\n7\r\n, world\r\n0\r\n\r\n";
        let r = Response::parse(raw).unwrap();
        assert_eq!(r.body_slice(), b"hello, world");
        // The chunked framing is consumed, not relayed.
        assert!(!r.headers().contains("transfer-encoding"));
    }

    #[test]
    fn parse_head_response_with_declared_length() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: 5\r\n\r\n";
        let r = Response::parse_head(raw).unwrap();
        assert_eq!(r.status(), StatusCode::Ok);
        assert!(r.body_slice().is_empty());
        assert_eq!(r.headers().get("content-type"), Some("text/html"));
    }

    #[test]
    fn parse_no_content_ignores_declared_length() {
        let raw = b"HTTP/1.1 204 No Content\r\nContent-Length: 5\r\n\r\n";
        let r = Response::parse(raw).unwrap();
        assert_eq!(r.status(), StatusCode::NoContent);
        assert!(r.body_slice().is_empty());
    }

    #[test]
    fn parse_not_modified_ignores_declared_length() {
        let raw = b"HTTP/1.1 304 Not Modified\r\nContent-Length: 42\r\nETag: \"abc\"\r\n\r\n";
        let r = Response::parse(raw).unwrap();
        assert_eq!(r.status(), StatusCode::NotModified);
        assert!(r.body_slice().is_empty());
        assert_eq!(r.headers().get("etag"), Some("\"abc\""));
    }

    #[test]
    fn parse_overflowing_chunk_size_is_rejected() {
        // A chunk-size line near usize::MAX must error, not wrap and panic.
        let raw =
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\nffffffffffffffff\r\nhello\r\n0\r\n\r\n";
        assert!(matches!(Response::parse(raw), Err(ResponseError::BadChunk)));
    }

    #[test]
    fn parse_chunk_larger_than_buffer_is_truncated() {
        let raw = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\nfff\r\nhi\r\n";
        assert!(matches!(
            Response::parse(raw),
            Err(ResponseError::TruncatedBody { .. })
        ));
    }

    #[test]
    fn parse_bad_chunk_size() {
        let raw = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\nxyz\r\nhello\r\n0\r\n\r\n";
        assert!(matches!(Response::parse(raw), Err(ResponseError::BadChunk)));
    }

    #[test]
    fn parse_incomplete_headers() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Type:";
        assert!(matches!(Response::parse(raw), Err(ResponseError::Incomplete)));
    }
}
