//! # Handlers
//!
//! A handler is a synchronous function over the request `Context`. Route
//! handlers and middleware share the same type: middleware simply calls
//! `Context::next` to run the rest of the chain and then resumes.

use crate::context::Context;
use std::fmt;
use std::sync::Arc;

/// Cursor value that marks a chain as aborted
///
/// Every composed chain is strictly shorter than this, so the value can never
/// be reached by normal advancement.
pub const ABORT_INDEX: usize = (i8::MAX / 2) as usize;

/// Handler function signature
pub type HandlerFunc = dyn Fn(&mut Context) + Send + Sync;

/// Ordered list of handlers, middleware first and the route handler last
pub type HandlersChain = Vec<Handler>;

/// A handler function with an optional diagnostic tag
#[derive(Clone)]
pub struct Handler {
    name: Option<Arc<str>>,
    func: Arc<HandlerFunc>,
}

impl Handler {
    /// Wrap a function as an untagged handler
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        Self {
            name: None,
            func: Arc::new(func),
        }
    }

    /// Wrap a function with a tag reported by `Context::handler_name`
    pub fn named<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        Self {
            name: Some(Arc::from(name.into())),
            func: Arc::new(func),
        }
    }

    /// Diagnostic tag, if one was attached
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Run the handler against a context
    pub fn call(&self, c: &mut Context) {
        (self.func)(c);
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("name", &self.name())
            .finish_non_exhaustive()
    }
}
