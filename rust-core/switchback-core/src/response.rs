//! # HTTP Response
//!
//! Buffered response written by handlers through the `Context` and turned
//! into a hyper response once the chain has finished.

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderMap, HeaderName, HeaderValue};
use hyper::StatusCode;

/// Response under construction
#[derive(Debug, Clone)]
pub struct Response {
    /// HTTP status code
    pub status: u16,
    /// Response headers
    pub headers: HeaderMap,
    /// Response body
    pub body: Vec<u8>,
    status_written: bool,
}

impl Default for Response {
    fn default() -> Self {
        Self {
            status: 200,
            headers: HeaderMap::new(),
            body: Vec::new(),
            status_written: false,
        }
    }
}

impl Response {
    /// Create a JSON response
    #[must_use]
    pub fn json(body: impl Into<Vec<u8>>) -> Self {
        Self::default()
            .with_header("Content-Type", "application/json")
            .with_body(body)
    }

    /// Create a text response
    #[must_use]
    pub fn text(body: impl Into<Vec<u8>>) -> Self {
        Self::default()
            .with_header("Content-Type", "text/plain")
            .with_body(body)
    }

    /// Set status code
    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.write_status(status);
        self
    }

    /// Set header
    #[must_use]
    pub fn with_header(mut self, key: &str, value: &str) -> Self {
        self.set_header(key, value);
        self
    }

    /// Replace the body
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Set or override a header; invalid names or values are ignored
    pub fn set_header(&mut self, key: &str, value: &str) {
        if let (Ok(n), Ok(v)) = (
            HeaderName::from_bytes(key.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.insert(n, v);
        }
    }

    /// Header value by name (case-insensitive)
    #[must_use]
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).and_then(|v| v.to_str().ok())
    }

    /// Record the status line
    pub fn write_status(&mut self, status: u16) {
        self.status = status;
        self.status_written = true;
    }

    /// Whether a status has been written explicitly
    #[must_use]
    pub fn status_written(&self) -> bool {
        self.status_written
    }

    /// Append to the body
    pub fn write(&mut self, bytes: &[u8]) {
        self.body.extend_from_slice(bytes);
    }

    /// Body as UTF-8, if valid
    #[must_use]
    pub fn body_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    /// Convert to hyper Response
    ///
    /// A status outside the valid range becomes 500.
    #[must_use]
    pub fn into_hyper(self) -> hyper::Response<Full<Bytes>> {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = hyper::Response::new(Full::new(Bytes::from(self.body)));
        *response.status_mut() = status;
        *response.headers_mut() = self.headers;
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_json() {
        let resp = Response::json(r#"{"status": "ok"}"#);
        assert_eq!(resp.status, 200);
        assert_eq!(resp.header("content-type"), Some("application/json"));
        assert!(!resp.status_written());
    }

    #[test]
    fn test_response_with_status() {
        let resp = Response::text("Not Found").with_status(404);
        assert_eq!(resp.status, 404);
        assert!(resp.status_written());
        assert_eq!(resp.body_str(), Some("Not Found"));
    }

    #[test]
    fn test_invalid_header_ignored() {
        let mut resp = Response::default();
        resp.set_header("bad header", "x");
        resp.set_header("X-Ok", "line\nbreak");
        assert!(resp.headers.is_empty());
    }

    #[test]
    fn test_into_hyper() {
        let resp = Response::text("hi").with_status(201).with_header("X-Trace", "1");
        let hyper_resp = resp.into_hyper();
        assert_eq!(hyper_resp.status(), StatusCode::CREATED);
        assert_eq!(hyper_resp.headers()["x-trace"], "1");

        let odd = Response::default().with_status(42).into_hyper();
        assert_eq!(odd.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
