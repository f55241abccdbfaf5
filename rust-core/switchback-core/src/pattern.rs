//! # Path Patterns
//!
//! Parsing of route templates such as `/users/:id/files/*filepath` into an
//! ordered list of segment descriptors.
//!
//! - `name` - literal segment, matched byte for byte
//! - `:name` - named capture, binds exactly one request segment
//! - `*name` - wildcard capture, binds the rest of the request path; only
//!   allowed as the last segment

use crate::error::{Error, Result};
use crate::router::Method;
use std::fmt;

/// One segment of a parsed route template
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// Literal text
    Literal(String),
    /// Named capture (`:name`)
    Param(String),
    /// Trailing wildcard capture (`*name`)
    Wildcard(String),
}

impl Segment {
    /// Capture name, if this segment binds a parameter
    #[must_use]
    pub fn capture_name(&self) -> Option<&str> {
        match self {
            Self::Literal(_) => None,
            Self::Param(name) | Self::Wildcard(name) => Some(name),
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(text) => f.write_str(text),
            Self::Param(name) => write!(f, ":{name}"),
            Self::Wildcard(name) => write!(f, "*{name}"),
        }
    }
}

/// A single route registration: method plus parsed template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    /// HTTP method the route answers
    pub method: Method,
    /// Template as registered (absolute)
    pub path: String,
    /// Parsed segments, root first
    pub segments: Vec<Segment>,
}

impl PathPattern {
    /// Parse an absolute route template
    ///
    /// Empty segments (`//`, trailing `/`) are skipped, so `/users/` and
    /// `/users` describe the same route.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoutePattern` if the template does not start
    /// with `/`, a wildcard is not last, a capture is unnamed or named twice,
    /// or a segment holds characters that cannot appear in a request path.
    pub fn parse(method: Method, path: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidRoutePattern {
            pattern: path.to_string(),
            reason: reason.to_string(),
        };

        if !path.starts_with('/') {
            return Err(invalid("pattern must begin with '/'"));
        }

        let mut segments: Vec<Segment> = Vec::new();
        for part in path.split('/').filter(|p| !p.is_empty()) {
            if matches!(segments.last(), Some(Segment::Wildcard(_))) {
                return Err(invalid("wildcard must be the last segment"));
            }

            let segment = match part.as_bytes()[0] {
                b':' => Segment::Param(parse_capture_name(&part[1..]).ok_or_else(|| {
                    invalid("named capture needs a name of letters, digits or '_'")
                })?),
                b'*' => Segment::Wildcard(parse_capture_name(&part[1..]).ok_or_else(|| {
                    invalid("wildcard needs a name of letters, digits or '_'")
                })?),
                _ => {
                    if let Some(c) = part.chars().find(|c| !is_literal_char(*c)) {
                        return Err(invalid(&format!("invalid character {c:?} in segment")));
                    }
                    Segment::Literal(part.to_string())
                }
            };

            if let Some(name) = segment.capture_name() {
                if segments.iter().any(|s| s.capture_name() == Some(name)) {
                    return Err(invalid(&format!("capture name '{name}' used twice")));
                }
            }
            segments.push(segment);
        }

        Ok(Self {
            method,
            path: path.to_string(),
            segments,
        })
    }

    /// Capture names in segment order
    pub fn capture_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(Segment::capture_name)
    }

    /// Whether the pattern ends in a wildcard capture
    #[must_use]
    pub fn has_wildcard(&self) -> bool {
        matches!(self.segments.last(), Some(Segment::Wildcard(_)))
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.segments {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

fn parse_capture_name(name: &str) -> Option<String> {
    let valid = !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    valid.then(|| name.to_string())
}

fn is_literal_char(c: char) -> bool {
    !(c.is_whitespace() || c.is_control() || matches!(c, ':' | '*' | '?' | '#'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(path: &str) -> Result<PathPattern> {
        PathPattern::parse(Method::Get, path)
    }

    #[test]
    fn test_parse_root() {
        let pattern = parse("/").unwrap();
        assert!(pattern.segments.is_empty());
        assert_eq!(pattern.to_string(), "/");
    }

    #[test]
    fn test_parse_mixed_segments() {
        let pattern = parse("/user/:id/post/*rest").unwrap();
        assert_eq!(
            pattern.segments,
            vec![
                Segment::Literal("user".to_string()),
                Segment::Param("id".to_string()),
                Segment::Literal("post".to_string()),
                Segment::Wildcard("rest".to_string()),
            ]
        );
        assert_eq!(pattern.capture_names().collect::<Vec<_>>(), vec!["id", "rest"]);
        assert!(pattern.has_wildcard());
    }

    #[test]
    fn test_parse_skips_empty_segments() {
        let pattern = parse("//users///list/").unwrap();
        assert_eq!(pattern.to_string(), "/users/list");
        assert_eq!(pattern.path, "//users///list/");
    }

    #[test]
    fn test_wildcard_must_be_last() {
        let err = parse("/files/*path/more").unwrap_err();
        assert!(err.to_string().contains("last segment"));
    }

    #[test]
    fn test_rejects_malformed() {
        assert!(parse("users").is_err());
        assert!(parse("/users/:").is_err());
        assert!(parse("/files/*").is_err());
        assert!(parse("/a b").is_err());
        assert!(parse("/a:b").is_err());
        assert!(parse("/search?q").is_err());
        assert!(parse("/:id/:id").is_err());
        assert!(parse("/:user-id").is_err());
    }
}
