//! # Execution Context
//!
//! Per-request state that drives a handler chain.
//!
//! The context owns the resolved chain and an integer cursor. `next()`
//! advances the cursor and runs handlers one after another; a handler that
//! calls `next()` itself runs the rest of the chain before resuming, which
//! is how middleware wraps what follows it. A handler that never calls
//! `next()` lets the driver loop continue with the following handler once it
//! returns.
//!
//! ```text
//! cursor  -1          0..len           len          >= ABORT_INDEX
//!         Pending --> Running -------> Completed
//!                        \-----------> Aborted
//! ```
//!
//! A context is created for exactly one request and owned by the task
//! serving it; nothing in here is shared or locked.

use crate::config::Mode;
use crate::error::{ContextError, Errors};
use crate::handler::{Handler, ABORT_INDEX};
use crate::request::Request;
use crate::response::Response;
use crate::router::Params;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::error;

const ABORTED: isize = ABORT_INDEX as isize;

/// Position of a context in its chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    /// No handler has run yet
    Pending,
    /// A handler is executing
    Running,
    /// `abort()` was called
    Aborted,
    /// The cursor moved past the last handler
    Completed,
}

/// Per-request execution context
pub struct Context {
    /// Incoming request
    pub request: Request,
    /// Response being built
    pub response: Response,
    /// Path parameters bound by the route table
    pub params: Params,
    /// Errors attached by handlers, in attachment order
    pub errors: Errors,
    handlers: Arc<[Handler]>,
    index: isize,
    mode: Mode,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("method", &self.request.method)
            .field("path", &self.request.path)
            .field("params", &self.params)
            .field("status", &self.response.status)
            .field("handlers", &self.handlers.len())
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

impl Context {
    /// Create a pending context for `request` over `handlers`
    pub fn new(request: Request, handlers: impl Into<Arc<[Handler]>>, params: Params) -> Self {
        Self {
            request,
            response: Response::default(),
            params,
            errors: Errors::default(),
            handlers: handlers.into(),
            index: -1,
            mode: Mode::default(),
        }
    }

    /// Set the run mode used for diagnostics
    #[must_use]
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Run mode of the engine that created this context
    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Run the remaining handlers
    ///
    /// Safe to call from inside a handler: the pending handlers run before
    /// the call returns. Once the chain is aborted or completed this is a
    /// no-op.
    pub fn next(&mut self) {
        self.index += 1;
        let chain = Arc::clone(&self.handlers);
        while let Some(handler) = usize::try_from(self.index).ok().and_then(|i| chain.get(i)) {
            handler.call(self);
            self.index += 1;
        }
    }

    /// Prevent pending handlers from running
    ///
    /// The calling handler is not interrupted; its remaining code still runs.
    pub fn abort(&mut self) {
        self.index = ABORTED;
    }

    /// Whether `abort()` was called
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.index >= ABORTED
    }

    /// Current chain state
    #[must_use]
    pub fn state(&self) -> ContextState {
        match usize::try_from(self.index) {
            Err(_) => ContextState::Pending,
            Ok(_) if self.is_aborted() => ContextState::Aborted,
            Ok(i) if i < self.handlers.len() => ContextState::Running,
            Ok(_) => ContextState::Completed,
        }
    }

    /// Write the status, then abort
    pub fn abort_with_status(&mut self, code: u16) {
        self.status(code);
        self.abort();
    }

    /// Abort and write a JSON body
    pub fn abort_with_status_json<T: Serialize + ?Sized>(&mut self, code: u16, body: &T) {
        self.abort();
        self.json(code, body);
    }

    /// Write the status, abort and attach `err`
    pub fn abort_with_error<E>(&mut self, code: u16, err: E) -> &mut ContextError
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        self.abort_with_status(code);
        self.attach_error(err)
    }

    /// Record an error on the context
    ///
    /// A `ContextError` built by the caller is kept as is; anything else is
    /// wrapped as a private error. Attached errors never change control flow
    /// by themselves.
    pub fn attach_error<E>(&mut self, err: E) -> &mut ContextError
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let record = match err.into().downcast::<ContextError>() {
            Ok(record) => *record,
            Err(other) => ContextError::private(other),
        };
        self.errors.push(record)
    }

    /// End the chain and write a `{"message": ...}` body
    ///
    /// Unlike `abort_with_status` this does not use the abort sentinel. An
    /// already aborted chain stays aborted.
    pub fn fail(&mut self, code: u16, message: &str) {
        if !self.is_aborted() {
            self.index = isize::try_from(self.handlers.len()).unwrap_or(ABORTED);
        }
        self.json(code, &json!({ "message": message }));
    }

    /// Value bound to a path parameter, `""` when missing
    #[must_use]
    pub fn param(&self, name: &str) -> &str {
        self.params.get(name)
    }

    /// Request path
    #[must_use]
    pub fn path(&self) -> &str {
        &self.request.path
    }

    /// Request header value
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.request.header(name)
    }

    /// Request media type without parameters
    #[must_use]
    pub fn content_type(&self) -> &str {
        self.request.content_type()
    }

    /// Whether the request asks for a websocket upgrade
    #[must_use]
    pub fn is_websocket(&self) -> bool {
        self.request.is_websocket()
    }

    /// Tag of the main (last) handler
    #[must_use]
    pub fn handler_name(&self) -> Option<&str> {
        self.handlers.last().and_then(Handler::name)
    }

    /// Tags of every handler in chain order
    #[must_use]
    pub fn handler_names(&self) -> Vec<Option<&str>> {
        self.handlers.iter().map(Handler::name).collect()
    }

    /// Main (last) handler
    #[must_use]
    pub fn handler(&self) -> Option<&Handler> {
        self.handlers.last()
    }

    /// Set the response status
    pub fn status(&mut self, code: u16) {
        self.response.write_status(code);
    }

    /// Response status written so far
    #[must_use]
    pub fn status_code(&self) -> u16 {
        self.response.status
    }

    /// Set a response header
    pub fn set_header(&mut self, name: &str, value: &str) {
        self.response.set_header(name, value);
    }

    /// Write a plain text body
    pub fn string(&mut self, code: u16, body: impl AsRef<str>) {
        self.set_header("Content-Type", "text/plain");
        self.status(code);
        self.response.write(body.as_ref().as_bytes());
    }

    /// Write a JSON body
    ///
    /// A value that fails to serialize produces a 500 with the error text.
    pub fn json<T: Serialize + ?Sized>(&mut self, code: u16, body: &T) {
        match serde_json::to_vec(body) {
            Ok(bytes) => {
                self.set_header("Content-Type", "application/json");
                self.status(code);
                self.response.write(&bytes);
            }
            Err(e) => {
                error!(path = %self.request.path, error = %e, "failed to encode JSON body");
                self.set_header("Content-Type", "text/plain");
                self.status(500);
                self.response.write(e.to_string().as_bytes());
            }
        }
    }

    /// Write raw bytes
    pub fn data(&mut self, code: u16, body: impl AsRef<[u8]>) {
        self.status(code);
        self.response.write(body.as_ref());
    }

    /// Write `{"code", "message", "data"}` with HTTP 200
    pub fn api_success<T: Serialize + ?Sized>(&mut self, code: i64, message: &str, data: &T) {
        self.json(200, &json!({ "code": code, "message": message, "data": data }));
    }

    /// Write `{"code", "message"}` with HTTP 200
    pub fn api_error(&mut self, code: i64, message: &str) {
        self.json(200, &json!({ "code": code, "message": message }));
    }

    /// Finish the request and hand back the response
    #[must_use]
    pub fn into_response(self) -> Response {
        self.response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorType;
    use std::sync::Mutex;

    type Trace = Arc<Mutex<Vec<String>>>;

    fn record(trace: &Trace, label: &'static str) -> Handler {
        let trace = Arc::clone(trace);
        Handler::named(label, move |_| trace.lock().unwrap().push(label.to_string()))
    }

    fn ctx(handlers: Vec<Handler>) -> Context {
        Context::new(Request::new(hyper::Method::GET, "/test"), handlers, Params::new())
    }

    fn entries(trace: &Trace) -> Vec<String> {
        trace.lock().unwrap().clone()
    }

    #[test]
    fn test_runs_chain_in_order() {
        let trace = Trace::default();
        let mut c = ctx(vec![record(&trace, "a"), record(&trace, "b"), record(&trace, "c")]);
        assert_eq!(c.state(), ContextState::Pending);

        c.next();
        assert_eq!(entries(&trace), vec!["a", "b", "c"]);
        assert_eq!(c.state(), ContextState::Completed);
        assert!(!c.is_aborted());
    }

    #[test]
    fn test_handler_without_next_does_not_end_chain() {
        let trace = Trace::default();
        let passive = Handler::named("passive", |c| c.set_header("X-Seen", "1"));
        let mut c = ctx(vec![passive, record(&trace, "handler")]);

        c.next();
        assert_eq!(entries(&trace), vec!["handler"]);
        assert_eq!(c.response.header("x-seen"), Some("1"));
        assert_eq!(c.state(), ContextState::Completed);
    }

    #[test]
    fn test_middleware_wraps_following_handlers() {
        let trace = Trace::default();
        let t = Arc::clone(&trace);
        let wrap = Handler::new(move |c| {
            t.lock().unwrap().push("before".to_string());
            c.next();
            t.lock().unwrap().push("after".to_string());
        });
        let mut c = ctx(vec![wrap, record(&trace, "handler")]);

        c.next();
        assert_eq!(entries(&trace), vec!["before", "handler", "after"]);
    }

    #[test]
    fn test_abort_stops_pending_handlers() {
        let trace = Trace::default();
        let t = Arc::clone(&trace);
        let guard = Handler::new(move |c| {
            c.abort_with_status(401);
            t.lock().unwrap().push("guard finished".to_string());
        });
        let mut c = ctx(vec![guard, record(&trace, "handler")]);

        c.next();
        assert_eq!(entries(&trace), vec!["guard finished"]);
        assert!(c.is_aborted());
        assert_eq!(c.state(), ContextState::Aborted);
        assert_eq!(c.status_code(), 401);

        c.next();
        c.next();
        assert_eq!(entries(&trace), vec!["guard finished"]);
        assert!(c.is_aborted());
    }

    #[test]
    fn test_abort_inside_wrapped_chain() {
        let trace = Trace::default();
        let t = Arc::clone(&trace);
        let wrap = Handler::new(move |c| {
            c.next();
            t.lock().unwrap().push(format!("after aborted={}", c.is_aborted()));
        });
        let stop = Handler::new(|c| c.abort());
        let mut c = ctx(vec![wrap, stop, record(&trace, "never")]);

        c.next();
        assert_eq!(entries(&trace), vec!["after aborted=true"]);
    }

    #[test]
    fn test_fail_ends_chain_with_body() {
        let trace = Trace::default();
        let failing = Handler::new(|c| c.fail(503, "maintenance"));
        let mut c = ctx(vec![failing, record(&trace, "never")]);

        c.next();
        assert!(entries(&trace).is_empty());
        assert!(!c.is_aborted());
        assert_eq!(c.state(), ContextState::Completed);
        let response = c.into_response();
        assert_eq!(response.status, 503);
        assert_eq!(response.body_str(), Some(r#"{"message":"maintenance"}"#));
    }

    #[test]
    fn test_fail_after_abort_stays_aborted() {
        let mut c = ctx(vec![Handler::new(|c| {
            c.abort();
            c.fail(500, "boom");
        })]);
        c.next();
        assert!(c.is_aborted());
        assert_eq!(c.status_code(), 500);
    }

    #[test]
    fn test_attach_error_wraps_and_keeps_records() {
        let mut c = ctx(vec![]);
        c.attach_error("plain failure");
        c.attach_error(ContextError::public("shown to clients"))
            .set_meta(json!({"field": "name"}));

        assert_eq!(c.errors.len(), 2);
        assert_eq!(c.errors.iter().next().unwrap().kind, ErrorType::Private);
        let last = c.errors.last().unwrap();
        assert_eq!(last.kind, ErrorType::Public);
        assert_eq!(last.meta, Some(json!({"field": "name"})));
        assert_eq!(c.state(), ContextState::Pending);
    }

    #[test]
    fn test_abort_with_error() {
        let mut c = ctx(vec![Handler::new(|c| {
            c.abort_with_error(400, std::io::Error::new(std::io::ErrorKind::Other, "bad input"));
        })]);
        c.next();
        assert!(c.is_aborted());
        assert_eq!(c.status_code(), 400);
        assert_eq!(c.errors.messages(), vec!["bad input"]);
    }

    #[test]
    fn test_handler_names() {
        let c = ctx(vec![
            Handler::named("logger", |_| {}),
            Handler::new(|_| {}),
            Handler::named("show_item", |_| {}),
        ]);
        assert_eq!(c.handler_name(), Some("show_item"));
        assert_eq!(c.handler_names(), vec![Some("logger"), None, Some("show_item")]);
    }

    #[test]
    fn test_response_helpers() {
        let mut c = ctx(vec![]);
        c.api_success(0, "ok", &json!({"a": 1}));
        assert_eq!(c.status_code(), 200);
        assert_eq!(
            c.response.header("content-type"),
            Some("application/json")
        );
        let body: serde_json::Value = serde_json::from_slice(&c.response.body).unwrap();
        assert_eq!(body, json!({"code": 0, "message": "ok", "data": {"a": 1}}));

        let mut c = ctx(vec![]);
        c.string(201, "created");
        assert_eq!(c.response.body_str(), Some("created"));
        assert_eq!(c.response.header("content-type"), Some("text/plain"));
    }

    #[test]
    fn test_param_missing_is_empty() {
        let mut params = Params::new();
        params.push("id", "7");
        let c = Context::new(Request::new(hyper::Method::GET, "/items/7"), Vec::<Handler>::new(), params);
        assert_eq!(c.param("id"), "7");
        assert_eq!(c.param("other"), "");
    }
}
