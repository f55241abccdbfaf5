//! # HTTP Request
//!
//! Owned request carrier handed to the dispatcher.
//!
//! The body is collected up front (bounded by the server's body limit) so
//! handlers stay synchronous; the query string is parsed once on
//! construction.

use crate::error::{Error, Result};
use http_body_util::BodyExt;
use hyper::body::Bytes;
use hyper::header::{HeaderMap, HeaderName, HeaderValue};
use std::collections::HashMap;

/// Incoming HTTP request
#[derive(Debug, Clone)]
pub struct Request {
    /// HTTP method, as received
    pub method: hyper::Method,
    /// Request path (without query string)
    pub path: String,
    /// Raw query string (e.g., "page=1&limit=10")
    query_string: Option<String>,
    /// Parsed query parameters
    query_params: HashMap<String, String>,
    /// Request headers
    headers: HeaderMap,
    /// Request body (collected)
    body: Option<Bytes>,
}

impl Request {
    /// Create a request from a method and a path with optional query string
    pub fn new(method: hyper::Method, path: impl Into<String>) -> Self {
        let path = path.into();
        let (path, query_string) = match path.split_once('?') {
            Some((p, q)) => (p.to_string(), Some(q.to_string())),
            None => (path, None),
        };
        let query_params = parse_query_string(query_string.as_deref());

        Self {
            method,
            path,
            query_string,
            query_params,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Add a header (builder style)
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.set_header(name, value);
        self
    }

    /// Set the body (builder style)
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Create from hyper request
    ///
    /// # Errors
    ///
    /// Returns `Error::Http` if the body cannot be read.
    pub async fn from_hyper(req: hyper::Request<hyper::body::Incoming>) -> Result<Self> {
        Self::from_hyper_with_limit(req, usize::MAX).await
    }

    /// Create from hyper request with body size limit
    ///
    /// # Errors
    ///
    /// Returns `Error::PayloadTooLarge` when the declared or actual body size
    /// exceeds `max_body_size`, and `Error::Http` if the body cannot be read.
    pub async fn from_hyper_with_limit(
        req: hyper::Request<hyper::body::Incoming>,
        max_body_size: usize,
    ) -> Result<Self> {
        let (parts, body) = req.into_parts();

        if let Some(declared) = parts
            .headers
            .get(hyper::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok())
        {
            if declared > max_body_size {
                return Err(Error::PayloadTooLarge {
                    limit: max_body_size,
                    actual: declared,
                });
            }
        }

        let bytes = body.collect().await?.to_bytes();
        if bytes.len() > max_body_size {
            return Err(Error::PayloadTooLarge {
                limit: max_body_size,
                actual: bytes.len(),
            });
        }

        let query_string = parts.uri.query().map(String::from);
        Ok(Self {
            method: parts.method,
            path: parts.uri.path().to_string(),
            query_params: parse_query_string(query_string.as_deref()),
            query_string,
            headers: parts.headers,
            body: (!bytes.is_empty()).then_some(bytes),
        })
    }

    /// Get a header value by name (case-insensitive)
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Set or override a header
    pub fn set_header(&mut self, name: &str, value: &str) {
        if let (Ok(n), Ok(v)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.insert(n, v);
        }
    }

    /// All request headers
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Media type of the body, without parameters such as `charset`
    #[must_use]
    pub fn content_type(&self) -> &str {
        let raw = self.header("content-type").unwrap_or("");
        raw.split([' ', ';']).next().unwrap_or("")
    }

    /// Whether the headers ask for a websocket upgrade
    #[must_use]
    pub fn is_websocket(&self) -> bool {
        let connection = self.header("connection").unwrap_or("");
        let upgrade = self.header("upgrade").unwrap_or("");
        connection.to_ascii_lowercase().contains("upgrade")
            && upgrade.eq_ignore_ascii_case("websocket")
    }

    /// Get a query parameter
    #[must_use]
    pub fn query(&self, name: &str) -> Option<&str> {
        self.query_params.get(name).map(String::as_str)
    }

    /// Get query parameters as a HashMap
    #[must_use]
    pub fn query_map(&self) -> &HashMap<String, String> {
        &self.query_params
    }

    /// Get raw query string
    #[must_use]
    pub fn query_string(&self) -> Option<&str> {
        self.query_string.as_deref()
    }

    /// Get the request body as bytes
    #[must_use]
    pub fn body_bytes(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    /// Get the request body as string (UTF-8)
    #[must_use]
    pub fn body_str(&self) -> Option<&str> {
        self.body_bytes().and_then(|b| std::str::from_utf8(b).ok())
    }
}

/// Parse query string into HashMap
///
/// Handles URL decoding and duplicate keys (last value wins).
fn parse_query_string(query: Option<&str>) -> HashMap<String, String> {
    query
        .map(|q| {
            q.split('&')
                .filter(|pair| !pair.is_empty())
                .map(|pair| {
                    let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
                    (url_decode(key), url_decode(value))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Query-string decoding: `+` is a space
fn url_decode(s: &str) -> String {
    percent_decode(s, true)
}

/// Percent decoding; malformed escapes are kept verbatim
///
/// `+` becomes a space only when `plus_as_space` is set, as in query
/// strings. Path values keep it literal.
pub(crate) fn percent_decode(s: &str, plus_as_space: bool) -> String {
    if !s.contains('%') && !(plus_as_space && s.contains('+')) {
        return s.to_string();
    }
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' if plus_as_space => out.push(b' '),
            b'%' => match (hex_value(bytes.get(i + 1)), hex_value(bytes.get(i + 2))) {
                (Some(hi), Some(lo)) => {
                    out.push((hi << 4) | lo);
                    i += 2;
                }
                _ => out.push(b'%'),
            },
            b => out.push(b),
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_value(byte: Option<&u8>) -> Option<u8> {
    let b = *byte?;
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query_string_simple() {
        let result = parse_query_string(Some("page=1&limit=10"));
        assert_eq!(result.get("page"), Some(&"1".to_string()));
        assert_eq!(result.get("limit"), Some(&"10".to_string()));
    }

    #[test]
    fn test_parse_query_string_empty() {
        let result = parse_query_string(None);
        assert!(result.is_empty());
        assert!(parse_query_string(Some("")).is_empty());
    }

    #[test]
    fn test_parse_query_string_url_encoded() {
        let result = parse_query_string(Some("name=John+Doe&city=New%20York&flag"));
        assert_eq!(result.get("name"), Some(&"John Doe".to_string()));
        assert_eq!(result.get("city"), Some(&"New York".to_string()));
        assert_eq!(result.get("flag"), Some(&String::new()));
    }

    #[test]
    fn test_url_decode() {
        assert_eq!(url_decode("hello+world"), "hello world");
        assert_eq!(url_decode("hello%20world"), "hello world");
        assert_eq!(url_decode("100%25"), "100%");
        assert_eq!(url_decode("caf%C3%A9"), "café");
        assert_eq!(url_decode("bad%zz"), "bad%zz");
        assert_eq!(url_decode("tail%2"), "tail%2");
        assert_eq!(url_decode("sign%+1"), "sign% 1");
        assert_eq!(url_decode("sign%-1"), "sign%-1");
    }

    #[test]
    fn test_percent_decode_keeps_plus_in_paths() {
        assert_eq!(percent_decode("John%20Doe", false), "John Doe");
        assert_eq!(percent_decode("a+b", false), "a+b");
        assert_eq!(percent_decode("%+1", false), "%+1");
        assert_eq!(percent_decode("%2e%2E", false), "..");
        assert_eq!(percent_decode("plain", false), "plain");
    }

    #[test]
    fn test_new_splits_query() {
        let req = Request::new(hyper::Method::GET, "/search?q=rust&page=2");
        assert_eq!(req.path, "/search");
        assert_eq!(req.query_string(), Some("q=rust&page=2"));
        assert_eq!(req.query("q"), Some("rust"));
        assert_eq!(req.query("missing"), None);
    }

    #[test]
    fn test_content_type_and_websocket() {
        let req = Request::new(hyper::Method::GET, "/ws")
            .with_header("Content-Type", "application/json; charset=utf-8")
            .with_header("Connection", "keep-alive, Upgrade")
            .with_header("Upgrade", "WebSocket");
        assert_eq!(req.content_type(), "application/json");
        assert!(req.is_websocket());

        let plain = Request::new(hyper::Method::GET, "/");
        assert_eq!(plain.content_type(), "");
        assert!(!plain.is_websocket());
    }

    #[test]
    fn test_body_access() {
        let req = Request::new(hyper::Method::POST, "/items").with_body("{\"a\":1}");
        assert_eq!(req.body_str(), Some("{\"a\":1}"));
        assert_eq!(req.body_bytes().map(<[u8]>::len), Some(7));
    }
}
