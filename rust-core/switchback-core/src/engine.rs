//! # Engine
//!
//! Owns the route table and the group tree and turns requests into
//! responses.
//!
//! Registration happens through `&mut Engine` during startup; dispatch only
//! needs `&Engine`, so a fully built engine can be shared behind an `Arc`
//! and serve requests from many tasks at once.
//!
//! ## Dispatch
//!
//! 1. Resolve `(method, path)` in the route table.
//! 2. Collect middleware, in group creation order, from the route's group,
//!    its ancestors and every other group whose prefix matches the path,
//!    then append the route's own handlers.
//! 3. With no match, run the middleware of every matching group followed by
//!    the no-route chain.
//! 4. Run the chain under the panic guard and hand back the response.

use crate::config::Config;
use crate::context::Context;
use crate::error::Result;
use crate::group::{join_paths, GroupId, GroupTree, RouterGroup, Routes, ROOT_GROUP};
use crate::handler::{Handler, ABORT_INDEX};
use crate::middleware::{access_log, not_found};
use crate::recovery::{install_panic_hook, recovery, run_guarded};
use crate::request::Request;
use crate::response::Response;
use crate::router::{Method, Params, RouteTable};
use tracing::{debug, error};

/// Request dispatcher
#[derive(Debug)]
pub struct Engine {
    pub(crate) config: Config,
    pub(crate) routes: RouteTable,
    pub(crate) groups: GroupTree,
    no_route: Vec<Handler>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl Engine {
    /// Create an engine with no middleware
    #[must_use]
    pub fn new(config: Config) -> Self {
        install_panic_hook();
        if config.mode.is_debug() {
            debug!(mode = %config.mode, prefix_match = ?config.prefix_match, "engine created");
        }
        Self {
            config,
            routes: RouteTable::new(),
            groups: GroupTree::new(),
            no_route: vec![not_found()],
        }
    }

    /// Create an engine with access logging and panic recovery installed
    #[must_use]
    pub fn with_defaults(config: Config) -> Self {
        let mut engine = Self::new(config);
        engine.add_middleware([access_log(), recovery()]);
        engine
    }

    /// Active configuration
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Registration handle for the root group
    pub fn root(&mut self) -> RouterGroup<'_> {
        RouterGroup::new(self, ROOT_GROUP)
    }

    /// Create a group below the root
    pub fn group(&mut self, relative_path: &str, middleware: Vec<Handler>) -> RouterGroup<'_> {
        let mut root = RouterGroup::new(self, ROOT_GROUP);
        let id = root.group(relative_path, middleware).id();
        RouterGroup::new(self, id)
    }

    /// Reopen a group created earlier
    pub fn group_mut(&mut self, id: GroupId) -> Option<RouterGroup<'_>> {
        self.groups
            .contains(id)
            .then(|| RouterGroup::new(self, id))
    }

    /// Replace the chain run when no route matches
    pub fn no_route(&mut self, handlers: Vec<Handler>) -> &mut Self {
        self.no_route = handlers;
        self
    }

    /// Registered routes
    #[must_use]
    pub fn route_table(&self) -> &RouteTable {
        &self.routes
    }

    /// Registered groups
    #[must_use]
    pub fn groups(&self) -> &GroupTree {
        &self.groups
    }

    /// Dispatch one request
    ///
    /// Never panics: handler panics are caught and turned into a 500 (or a
    /// silent abort when the peer is gone).
    #[must_use]
    pub fn dispatch(&self, request: Request) -> Response {
        let (chain, params) = self.plan(&request);

        if chain.len() >= ABORT_INDEX {
            error!(
                method = %request.method,
                path = %request.path,
                handlers = chain.len(),
                limit = ABORT_INDEX,
                "handler chain too long"
            );
            return Response::text("Internal Server Error").with_status(500);
        }

        let mut c = Context::new(request, chain, params).with_mode(self.config.mode);
        run_guarded(&mut c, Context::next);
        c.into_response()
    }

    fn plan(&self, request: &Request) -> (Vec<Handler>, Params) {
        let path = request.path.as_str();
        let rule = self.config.prefix_match;
        let matches = move |prefix: &str, p: &str| rule.matches(prefix, p);
        let resolved = Method::try_from(&request.method)
            .ok()
            .and_then(|method| self.routes.resolve(method, path));

        let Some(resolved) = resolved else {
            if self.config.mode.is_debug() {
                debug!(method = %request.method, path = %path, "no route matched");
            }
            let mut chain = self.groups.dispatch_middleware(None, path, matches);
            chain.extend(self.no_route.iter().cloned());
            return (chain, Params::new());
        };

        let route = resolved.route;
        let mut chain = self
            .groups
            .dispatch_middleware(Some(route.group), path, matches);
        chain.extend(route.handlers.iter().cloned());
        (chain, resolved.params)
    }
}

impl Routes for Engine {
    fn add_route(
        &mut self,
        method: Method,
        relative_path: &str,
        handlers: Vec<Handler>,
    ) -> Result<&mut Self> {
        self.root().add_route(method, relative_path, handlers)?;
        Ok(self)
    }

    fn check_route(&self, method: Method, relative_path: &str) -> Result<()> {
        self.routes
            .check(method, &join_paths(self.groups.prefix(ROOT_GROUP), relative_path))
    }

    fn add_middleware(&mut self, middleware: impl IntoIterator<Item = Handler>) -> &mut Self {
        self.groups.add_middleware(ROOT_GROUP, middleware);
        self
    }
}
