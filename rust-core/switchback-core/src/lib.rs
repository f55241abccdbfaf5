//! # Switchback Core
//!
//! Embeddable HTTP request dispatcher.
//! Maps `(method, path)` to an ordered chain of handlers and runs that chain
//! against a per-request context.
//!
//! ## Architecture
//!
//! Startup builds an `Engine` through `&mut` access: groups carry a path
//! prefix and middleware, and every route registered through a group stores
//! a chain already composed from its ancestors' middleware. Once built, the
//! engine is read-only and dispatches concurrently; all mutable state lives
//! in the per-request `Context`.
//!
//! ## Modules
//!
//! - `engine` - Dispatcher owning the route table and group tree
//! - `router` - Per-method segment trie with literal, capture and wildcard matching
//! - `pattern` - Route pattern parsing and validation
//! - `group` - Route groups and the registration API
//! - `handler` - Handler type and chain limits
//! - `context` - Per-request chain driver, abort and error collection
//! - `recovery` - Panic isolation
//! - `middleware` - Access logging and the not-found fallback
//! - `files` - Static file serving
//! - `request` / `response` - Request and response carriers
//! - `server` - Hyper/Tokio adapter
//! - `config` - Run mode and matching options
//! - `error` - Error types and handling

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod files;
pub mod group;
pub mod handler;
pub mod middleware;
pub mod pattern;
pub mod recovery;
pub mod request;
pub mod response;
pub mod router;
pub mod server;

pub use config::{Config, Mode, PrefixMatch};
pub use context::{Context, ContextState};
pub use engine::Engine;
pub use error::{ContextError, Error, ErrorType, Errors, Result};
pub use group::{GroupId, RouterGroup, Routes, ROOT_GROUP};
pub use handler::{Handler, HandlersChain, ABORT_INDEX};
pub use hyper::body::Bytes;
pub use middleware::{access_log, not_found};
pub use pattern::{PathPattern, Segment};
pub use recovery::{install_panic_hook, recovery};
pub use request::Request;
pub use response::Response;
pub use router::{Method, Params, RouteTable};
pub use server::{Server, ServerConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(VERSION, "0.1.0");
    }

    #[test]
    fn test_public_surface() {
        let mut engine = Engine::with_defaults(Config::with_mode(Mode::Test));
        engine
            .group("/v1", Vec::new())
            .get("/items/:id", |c| {
                let id: u32 = c.params.parse("id").unwrap_or_default();
                c.api_success(0, "ok", &serde_json::json!({ "id": id }));
            })
            .unwrap();

        let resp = engine.dispatch(Request::new(hyper::Method::GET, "/v1/items/7"));
        assert_eq!(resp.status, 200);
        assert_eq!(
            resp.body_str(),
            Some(r#"{"code":0,"data":{"id":7},"message":"ok"}"#)
        );
    }
}
