//! # Error Handling
//!
//! Centralized error types for switchback core.
//! Uses `thiserror` for ergonomic error definitions.
//!
//! Registration errors surface from the builder phase and are meant to stop
//! startup. Errors raised while a request runs never use `Error`; they are
//! attached to the request's `Context` as `ContextError` records.

use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Result type alias for switchback operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for the switchback runtime
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP method string is not one of the supported verbs
    #[error("HTTP method {0} is not valid")]
    InvalidMethod(String),

    /// Invalid route pattern provided
    #[error("Invalid route pattern: {pattern}: {reason}")]
    InvalidRoutePattern {
        /// The invalid pattern
        pattern: String,
        /// Reason for invalidity
        reason: String,
    },

    /// A route with the same method and segment shape is already registered
    #[error("Route conflict: {method} {pattern} is already registered")]
    RouteConflict {
        /// Method of the conflicting registration
        method: String,
        /// Pattern of the conflicting registration
        pattern: String,
    },

    /// Composed handler chain would reach the abort sentinel
    #[error("Too many handlers for {pattern}: {count} (limit {limit})")]
    TooManyHandlers {
        /// Absolute pattern of the route
        pattern: String,
        /// Composed chain length
        count: usize,
        /// Exclusive upper bound on chain length
        limit: usize,
    },

    /// Unknown run mode name
    #[error("Unknown mode: {0} (available modes: debug release test)")]
    InvalidMode(String),

    /// Server failed to bind to the specified address
    #[error("Failed to bind server to {address}: {source}")]
    BindError {
        /// The address we tried to bind to
        address: String,
        /// The underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// HTTP protocol error
    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Request payload too large
    #[error("Payload too large: limit={limit} bytes, received={actual} bytes")]
    PayloadTooLarge {
        /// Max allowed size
        limit: usize,
        /// Actual size
        actual: usize,
    },
}

/// Visibility class of an error attached to a request context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorType {
    /// Raised internally; details stay in server-side logs (default)
    #[default]
    Private,
    /// Supplied deliberately by a handler and safe to show to clients
    Public,
}

/// An error attached to a request context
#[derive(Debug)]
pub struct ContextError {
    /// Underlying error
    pub err: Box<dyn std::error::Error + Send + Sync>,
    /// Visibility class
    pub kind: ErrorType,
    /// Free-form metadata for middleware that reports errors
    pub meta: Option<Value>,
}

impl ContextError {
    /// Wrap an error as private
    pub fn private(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self {
            err: err.into(),
            kind: ErrorType::Private,
            meta: None,
        }
    }

    /// Wrap an error as public
    pub fn public(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self {
            err: err.into(),
            kind: ErrorType::Public,
            meta: None,
        }
    }

    /// Change the visibility class
    pub fn set_type(&mut self, kind: ErrorType) -> &mut Self {
        self.kind = kind;
        self
    }

    /// Attach metadata
    pub fn set_meta(&mut self, meta: Value) -> &mut Self {
        self.meta = Some(meta);
        self
    }

    /// JSON view: metadata object with an `error` field, or `{"error": ...}`
    #[must_use]
    pub fn to_json(&self) -> Value {
        match &self.meta {
            Some(Value::Object(map)) => {
                let mut map = map.clone();
                map.entry("error")
                    .or_insert_with(|| Value::String(self.err.to_string()));
                Value::Object(map)
            }
            Some(other) => serde_json::json!({ "error": self.err.to_string(), "meta": other }),
            None => serde_json::json!({ "error": self.err.to_string() }),
        }
    }
}

impl fmt::Display for ContextError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.err, f)
    }
}

impl std::error::Error for ContextError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.err.source()
    }
}

/// Errors attached to one request, in attachment order
#[derive(Debug, Default)]
pub struct Errors(Vec<ContextError>);

impl Errors {
    /// Append a record and return it for annotation
    pub fn push(&mut self, record: ContextError) -> &mut ContextError {
        let at = self.0.len();
        self.0.push(record);
        &mut self.0[at]
    }

    /// Most recently attached error
    #[must_use]
    pub fn last(&self) -> Option<&ContextError> {
        self.0.last()
    }

    /// Iterate in attachment order
    pub fn iter(&self) -> impl Iterator<Item = &ContextError> {
        self.0.iter()
    }

    /// Records of one visibility class
    #[must_use]
    pub fn by_type(&self, kind: ErrorType) -> Vec<&ContextError> {
        self.0.iter().filter(|e| e.kind == kind).collect()
    }

    /// Error messages in attachment order
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.0.iter().map(ToString::to_string).collect()
    }

    /// Number of attached errors
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if nothing was attached
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Errors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, record) in self.0.iter().enumerate() {
            writeln!(f, "Error #{:02}: {}", i + 1, record)?;
            if let Some(meta) = &record.meta {
                writeln!(f, "     Meta: {meta}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_error_json() {
        let plain = ContextError::private("disk full");
        assert_eq!(plain.to_json(), serde_json::json!({"error": "disk full"}));

        let mut annotated = ContextError::public("bad field");
        annotated.set_meta(serde_json::json!({"field": "email"}));
        assert_eq!(
            annotated.to_json(),
            serde_json::json!({"field": "email", "error": "bad field"})
        );
    }

    #[test]
    fn test_errors_list() {
        let mut errors = Errors::default();
        errors.push(ContextError::private("first"));
        errors
            .push(ContextError::private("second"))
            .set_type(ErrorType::Public)
            .set_meta(Value::from(3));

        assert_eq!(errors.len(), 2);
        assert_eq!(errors.by_type(ErrorType::Public).len(), 1);
        assert_eq!(errors.messages(), vec!["first", "second"]);
        assert_eq!(
            errors.to_string(),
            "Error #01: first\nError #02: second\n     Meta: 3\n"
        );
    }

    #[test]
    fn test_invalid_pattern_error() {
        let err = Error::InvalidRoutePattern {
            pattern: "/files/*path/more".to_string(),
            reason: "wildcard must be the last segment".to_string(),
        };
        assert!(err.to_string().contains("/files/*path/more"));
        assert!(err.to_string().contains("wildcard"));
    }

    #[test]
    fn test_too_many_handlers_error() {
        let err = Error::TooManyHandlers {
            pattern: "/a".to_string(),
            count: 70,
            limit: 63,
        };
        assert_eq!(err.to_string(), "Too many handlers for /a: 70 (limit 63)");
    }

    #[test]
    fn test_bind_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::AddrInUse, "address in use");
        let err = Error::BindError {
            address: "0.0.0.0:8000".to_string(),
            source: io_err,
        };
        assert!(err.to_string().contains("0.0.0.0:8000"));
    }
}
