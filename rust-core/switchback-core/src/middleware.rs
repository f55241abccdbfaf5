//! # Built-in Middleware
//!
//! Stock handlers for request logging and the not-found fallback.
//!
//! Middleware is an ordinary `Handler` that calls `Context::next` and then
//! resumes, so anything done after the call sees the final response.

use crate::context::Context;
use crate::handler::Handler;
use std::time::Instant;
use tracing::{debug, info};

/// Logs one structured line per request once the chain has finished
///
/// Records method, path, status, elapsed time and the `x-request-id`
/// header. Handler tags are added in debug mode.
#[must_use]
pub fn access_log() -> Handler {
    Handler::named("access_log", |c| {
        let start = Instant::now();
        c.next();
        let elapsed = start.elapsed();

        let request_id = c.header("x-request-id").unwrap_or("-");
        info!(
            method = %c.request.method,
            path = %c.request.path,
            status = c.status_code(),
            elapsed_secs = elapsed.as_secs_f64(),
            request_id = %request_id,
            aborted = c.is_aborted(),
            "request completed"
        );
        if c.mode().is_debug() && !c.errors.is_empty() {
            debug!(errors = %c.errors, handler = ?c.handler_name(), "request errors");
        }
    })
}

/// Default fallback for requests no route matches
#[must_use]
pub fn not_found() -> Handler {
    Handler::named("not_found", |c: &mut Context| {
        let body = format!("404 not found: {}\n", c.path());
        c.string(404, body);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Request;
    use crate::router::Params;

    #[test]
    fn test_not_found_body() {
        let mut c = Context::new(
            Request::new(hyper::Method::GET, "/missing?x=1"),
            vec![not_found()],
            Params::new(),
        );
        c.next();
        let resp = c.into_response();
        assert_eq!(resp.status, 404);
        assert_eq!(resp.body_str(), Some("404 not found: /missing\n"));
    }

    #[test]
    fn test_access_log_wraps_chain() {
        let mut c = Context::new(
            Request::new(hyper::Method::POST, "/items").with_header("X-Request-Id", "abc"),
            vec![access_log(), Handler::new(|c| c.string(201, "made"))],
            Params::new(),
        );
        c.next();
        assert!(!c.is_aborted());
        assert_eq!(c.handler_names(), vec![Some("access_log"), None]);
        assert_eq!(c.status_code(), 201);
    }
}
