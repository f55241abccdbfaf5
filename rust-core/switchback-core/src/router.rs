//! # Route Table
//!
//! Per-method prefix tree mapping request paths to registered routes.
//!
//! ## Matching
//!
//! Lookup walks one tree level per request segment. At each level the
//! children are tried most specific first:
//!
//! 1. literal child whose text equals the segment
//! 2. the named-capture child (binds the segment)
//! 3. the wildcard child (binds the raw rest of the path and stops)
//!
//! A branch that dead-ends deeper falls back to the next tier at the same
//! level, so the result is always the most specific registered route.
//! Cost is proportional to the number of request segments, not to the number
//! of registered routes.
//!
//! ## Usage contract
//!
//! The table is filled during a single-threaded registration phase and only
//! read afterwards. `resolve` takes `&self` and never mutates, so a built
//! table can be shared across request tasks without locking.

use crate::error::{Error, Result};
use crate::group::GroupId;
use crate::handler::Handler;
use crate::pattern::{PathPattern, Segment};
use crate::request::percent_decode;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// HTTP methods supported by the router
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// HTTP GET
    Get,
    /// HTTP HEAD
    Head,
    /// HTTP POST
    Post,
    /// HTTP PUT
    Put,
    /// HTTP PATCH
    Patch,
    /// HTTP DELETE
    Delete,
    /// HTTP CONNECT
    Connect,
    /// HTTP OPTIONS
    Options,
    /// HTTP TRACE
    Trace,
}

impl Method {
    /// Every supported method, in the order `any` registers them
    pub const ALL: [Self; 9] = [
        Self::Get,
        Self::Head,
        Self::Post,
        Self::Put,
        Self::Patch,
        Self::Delete,
        Self::Connect,
        Self::Options,
        Self::Trace,
    ];

    /// Canonical upper-case name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Connect => "CONNECT",
            Self::Options => "OPTIONS",
            Self::Trace => "TRACE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_uppercase()) {
            return Err(Error::InvalidMethod(s.to_string()));
        }
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| Error::InvalidMethod(s.to_string()))
    }
}

impl TryFrom<&hyper::Method> for Method {
    type Error = Error;

    fn try_from(method: &hyper::Method) -> Result<Self> {
        method.as_str().parse()
    }
}

/// Path parameters bound by a successful lookup
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(Vec<(String, String)>);

impl Params {
    /// Create an empty parameter set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Value bound to `name`, or `""` when the name is not bound
    #[must_use]
    pub fn get(&self, name: &str) -> &str {
        self.lookup(name).unwrap_or("")
    }

    /// Value bound to `name`, if any
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Parse the value bound to `name`
    ///
    /// Returns `None` if the name is unbound or the value does not parse.
    #[must_use]
    pub fn parse<T: FromStr>(&self, name: &str) -> Option<T> {
        self.lookup(name).and_then(|v| v.parse().ok())
    }

    /// Bind a value
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    /// Iterate bindings in pattern order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of bindings
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if nothing is bound
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A registered endpoint stored at a terminal tree node
#[derive(Debug, Clone)]
pub struct Route {
    /// Parsed pattern (absolute)
    pub pattern: PathPattern,
    /// Handlers registered for the route itself, without group middleware
    pub handlers: Arc<[Handler]>,
    /// Group the route was registered through
    pub group: GroupId,
}

/// Successful lookup result
#[derive(Debug)]
pub struct Resolved<'a> {
    /// Matched route
    pub route: &'a Route,
    /// Bound parameters
    pub params: Params,
}

/// One segment position in a method tree
#[derive(Debug, Default)]
struct Node {
    literals: HashMap<String, Node>,
    param: Option<Box<Node>>,
    /// A wildcard always terminates the pattern, so it holds the route itself
    wildcard: Option<Route>,
    route: Option<Route>,
}

impl Node {
    /// Depth-first search in precedence order
    ///
    /// On `None` the captured `values` are left exactly as they were.
    fn find<'n, 'p>(
        &'n self,
        path: &'p str,
        segments: &[(usize, &'p str)],
        values: &mut Vec<&'p str>,
    ) -> Option<&'n Route> {
        let Some(&(offset, segment)) = segments.first() else {
            if let Some(route) = &self.route {
                return Some(route);
            }
            return self.wildcard.as_ref().map(|route| {
                values.push("");
                route
            });
        };
        let rest = &segments[1..];

        if let Some(route) = self
            .literals
            .get(segment)
            .and_then(|child| child.find(path, rest, values))
        {
            return Some(route);
        }

        if let Some(child) = &self.param {
            values.push(segment);
            if let Some(route) = child.find(path, rest, values) {
                return Some(route);
            }
            values.pop();
        }

        self.wildcard.as_ref().map(|route| {
            values.push(&path[offset..]);
            route
        })
    }

    fn collect<'n>(&'n self, out: &mut Vec<&'n Route>) {
        out.extend(self.route.iter());
        out.extend(self.wildcard.iter());
        let mut literals: Vec<_> = self.literals.iter().collect();
        literals.sort_by(|a, b| a.0.cmp(b.0));
        for (_, child) in literals {
            child.collect(out);
        }
        if let Some(child) = &self.param {
            child.collect(out);
        }
    }
}

/// Per-method route trees
#[derive(Debug, Default)]
pub struct RouteTable {
    trees: HashMap<Method, Node>,
    len: usize,
}

impl RouteTable {
    /// Create an empty table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register route handlers under `method` and `path`
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoutePattern` if `path` is malformed and
    /// `Error::RouteConflict` if a route with the same method and segment
    /// shape exists. Capture names do not count toward the shape.
    pub fn register(
        &mut self,
        method: Method,
        path: &str,
        handlers: Vec<Handler>,
        group: GroupId,
    ) -> Result<&Route> {
        let pattern = PathPattern::parse(method, path)?;
        let wildcard = pattern.has_wildcard();

        let mut node = self.trees.entry(method).or_default();
        for segment in &pattern.segments {
            node = match segment {
                Segment::Literal(text) => node.literals.entry(text.clone()).or_default(),
                Segment::Param(_) => node.param.get_or_insert_with(Box::default),
                Segment::Wildcard(_) => break,
            };
        }

        let slot = if wildcard {
            &mut node.wildcard
        } else {
            &mut node.route
        };
        if slot.is_some() {
            return Err(Error::RouteConflict {
                method: method.to_string(),
                pattern: path.to_string(),
            });
        }

        self.len += 1;
        Ok(slot.insert(Route {
            pattern,
            handlers: handlers.into(),
            group,
        }))
    }

    /// Check that `path` parses and is free under `method`
    ///
    /// # Errors
    ///
    /// Same as `register`, which this mirrors without inserting anything.
    pub fn check(&self, method: Method, path: &str) -> Result<()> {
        let pattern = PathPattern::parse(method, path)?;
        if self.occupied(&pattern) {
            return Err(Error::RouteConflict {
                method: method.to_string(),
                pattern: path.to_string(),
            });
        }
        Ok(())
    }

    fn occupied(&self, pattern: &PathPattern) -> bool {
        let Some(mut node) = self.trees.get(&pattern.method) else {
            return false;
        };
        for segment in &pattern.segments {
            let child = match segment {
                Segment::Literal(text) => node.literals.get(text),
                Segment::Param(_) => node.param.as_deref(),
                Segment::Wildcard(_) => break,
            };
            match child {
                Some(child) => node = child,
                None => return false,
            }
        }
        if pattern.has_wildcard() {
            node.wildcard.is_some()
        } else {
            node.route.is_some()
        }
    }

    /// Resolve a request path to a route and its bindings
    ///
    /// Matching runs on the raw path; bound values are percent-decoded.
    /// Returns `None` when nothing matches; never a partial match.
    #[must_use]
    pub fn resolve<'a>(&'a self, method: Method, path: &str) -> Option<Resolved<'a>> {
        let root = self.trees.get(&method)?;
        let segments = split_segments(path);
        let mut values = Vec::with_capacity(segments.len());
        let route = root.find(path, &segments, &mut values)?;

        let mut params = Params::new();
        for (name, value) in route.pattern.capture_names().zip(values) {
            params.push(name, percent_decode(value, false));
        }
        Some(Resolved { route, params })
    }

    /// All routes of one method, literals in lexical order
    #[must_use]
    pub fn routes(&self, method: Method) -> Vec<&Route> {
        let mut out = Vec::new();
        if let Some(root) = self.trees.get(&method) {
            root.collect(&mut out);
        }
        out
    }

    /// Total number of registered routes
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if no route is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Non-empty path segments with their byte offsets
fn split_segments(path: &str) -> Vec<(usize, &str)> {
    let mut out = Vec::new();
    let mut start = 0;
    for (i, b) in path.bytes().enumerate() {
        if b == b'/' {
            if i > start {
                out.push((start, &path[start..i]));
            }
            start = i + 1;
        }
    }
    if start < path.len() {
        out.push((start, &path[start..]));
    }
    out
}
