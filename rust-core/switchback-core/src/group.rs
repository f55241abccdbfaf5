//! # Route Groups
//!
//! Hierarchical namespace of path prefixes. Each group owns its middleware
//! list and a link to its parent. A route stores only its own handlers;
//! group middleware is collected per request from the current group lists,
//! root first, so middleware added after a route was registered still
//! applies to it.
//!
//! Groups live in an engine-owned arena (`GroupTree`) and are addressed by
//! `GroupId`. The root group has id `ROOT_GROUP` and an empty prefix.

use crate::context::Context;
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::files;
use crate::handler::{Handler, ABORT_INDEX};
use crate::router::Method;
use std::path::PathBuf;
use tracing::debug;

/// Index of a group inside its engine
pub type GroupId = usize;

/// Id of the root group
pub const ROOT_GROUP: GroupId = 0;

#[derive(Debug)]
struct GroupNode {
    prefix: String,
    middleware: Vec<Handler>,
    parent: Option<GroupId>,
}

/// Arena of every group registered on an engine, in creation order
///
/// A child is always created after its parent, so iteration order is also a
/// valid root-to-leaf order.
#[derive(Debug)]
pub struct GroupTree {
    nodes: Vec<GroupNode>,
}

impl Default for GroupTree {
    fn default() -> Self {
        Self::new()
    }
}

impl GroupTree {
    /// Create a tree holding only the root group
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: vec![GroupNode {
                prefix: String::new(),
                middleware: Vec::new(),
                parent: None,
            }],
        }
    }

    /// Create a child of `parent` with prefix `parent.prefix + relative`
    ///
    /// The child starts with only `middleware`; ancestor middleware is pulled
    /// in when a route is composed.
    ///
    /// # Panics
    ///
    /// Panics if `parent` is not an id of this tree.
    pub fn derive(&mut self, parent: GroupId, relative: &str, middleware: Vec<Handler>) -> GroupId {
        let prefix = join_paths(&self.nodes[parent].prefix, relative);
        self.nodes.push(GroupNode {
            prefix,
            middleware,
            parent: Some(parent),
        });
        self.nodes.len() - 1
    }

    /// Append middleware to a group
    pub fn add_middleware(&mut self, id: GroupId, middleware: impl IntoIterator<Item = Handler>) {
        self.nodes[id].middleware.extend(middleware);
    }

    /// Absolute prefix of a group
    #[must_use]
    pub fn prefix(&self, id: GroupId) -> &str {
        &self.nodes[id].prefix
    }

    /// Middleware owned by a group itself
    #[must_use]
    pub fn middleware(&self, id: GroupId) -> &[Handler] {
        &self.nodes[id].middleware
    }

    /// Parent of a group, `None` for the root
    #[must_use]
    pub fn parent(&self, id: GroupId) -> Option<GroupId> {
        self.nodes.get(id).and_then(|n| n.parent)
    }

    /// Whether `id` names a group of this tree
    #[must_use]
    pub fn contains(&self, id: GroupId) -> bool {
        id < self.nodes.len()
    }

    /// Number of groups, root included
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false: the root group exists from construction
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// `id` and its ancestors, root first
    #[must_use]
    pub fn ancestry(&self, id: GroupId) -> Vec<GroupId> {
        let mut out = vec![id];
        let mut current = id;
        while let Some(parent) = self.parent(current) {
            out.push(parent);
            current = parent;
        }
        out.reverse();
        out
    }

    /// Whether `ancestor` is `id` or one of its ancestors
    #[must_use]
    pub fn is_ancestor_or_self(&self, ancestor: GroupId, id: GroupId) -> bool {
        let mut current = Some(id);
        while let Some(group) = current {
            if group == ancestor {
                return true;
            }
            current = self.parent(group);
        }
        false
    }

    /// Compose a route chain: ancestor middleware root-to-leaf, then `handlers`
    ///
    /// # Errors
    ///
    /// Returns `Error::TooManyHandlers` if the chain would reach
    /// `ABORT_INDEX`, which is reserved as the abort signal.
    pub fn compose_chain(
        &self,
        id: GroupId,
        pattern: &str,
        handlers: Vec<Handler>,
    ) -> Result<Vec<Handler>> {
        let ancestry = self.ancestry(id);
        let count = ancestry
            .iter()
            .map(|g| self.nodes[*g].middleware.len())
            .sum::<usize>()
            + handlers.len();
        if count >= ABORT_INDEX {
            return Err(Error::TooManyHandlers {
                pattern: pattern.to_string(),
                count,
                limit: ABORT_INDEX,
            });
        }

        let mut chain = Vec::with_capacity(count);
        for group in ancestry {
            chain.extend(self.nodes[group].middleware.iter().cloned());
        }
        chain.extend(handlers);
        Ok(chain)
    }

    /// Middleware to run before a route's handlers, in creation order
    ///
    /// Takes every group that is an ancestor of `route_group` (or the group
    /// itself) together with every group whose prefix passes `test` against
    /// `path`. Creation order is root-to-leaf, so a parent's middleware
    /// always precedes its children's. With no route, only prefix matches
    /// count.
    pub fn dispatch_middleware(
        &self,
        route_group: Option<GroupId>,
        path: &str,
        test: impl Fn(&str, &str) -> bool,
    ) -> Vec<Handler> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(id, node)| {
                route_group.is_some_and(|g| self.is_ancestor_or_self(*id, g))
                    || test(&node.prefix, path)
            })
            .flat_map(|(_, node)| node.middleware.iter().cloned())
            .collect()
    }
}

/// Join a group prefix and a relative path
///
/// Collapses duplicate slashes and resolves `.`/`..`. The result is rooted;
/// a trailing slash survives only when `relative` ends in one.
#[must_use]
pub fn join_paths(absolute: &str, relative: &str) -> String {
    if relative.is_empty() {
        return absolute.to_string();
    }

    let mut parts: Vec<&str> = Vec::new();
    for part in absolute.split('/').chain(relative.split('/')) {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }

    let mut joined = format!("/{}", parts.join("/"));
    if relative.ends_with('/') && !joined.ends_with('/') {
        joined.push('/');
    }
    joined
}

/// Registration surface shared by the engine and its groups
///
/// Paths are relative to the receiver's prefix. Every operation fails
/// instead of leaving a half-registered route; callers are expected to
/// propagate the error and stop startup.
pub trait Routes: Sized {
    /// Register route handlers under `method` and `relative_path`
    ///
    /// # Errors
    ///
    /// Fails on a malformed pattern, a route conflict, or a composed chain
    /// that reaches `ABORT_INDEX`.
    fn add_route(
        &mut self,
        method: Method,
        relative_path: &str,
        handlers: Vec<Handler>,
    ) -> Result<&mut Self>;

    /// Validate a registration without performing it
    ///
    /// # Errors
    ///
    /// Returns the pattern or conflict error `add_route` would return.
    fn check_route(&self, method: Method, relative_path: &str) -> Result<()>;

    /// Append middleware to the receiver's group
    ///
    /// Applies to every request under the group's prefix from then on,
    /// including routes registered earlier.
    fn add_middleware(&mut self, middleware: impl IntoIterator<Item = Handler>) -> &mut Self;

    /// Register handlers under a method given by name
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidMethod` unless `method` is an upper-case
    /// supported verb, plus every error of `add_route`.
    fn handle(&mut self, method: &str, relative_path: &str, handlers: Vec<Handler>) -> Result<&mut Self> {
        let method = method.parse()?;
        self.add_route(method, relative_path, handlers)
    }

    /// Register a single handler, keeping its tag
    ///
    /// # Errors
    ///
    /// See `add_route`.
    fn route(&mut self, method: Method, relative_path: &str, handler: Handler) -> Result<&mut Self> {
        self.add_route(method, relative_path, vec![handler])
    }

    /// Register a GET handler
    ///
    /// # Errors
    ///
    /// See `add_route`.
    fn get<F>(&mut self, relative_path: &str, handler: F) -> Result<&mut Self>
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        self.route(Method::Get, relative_path, Handler::new(handler))
    }

    /// Register a POST handler
    ///
    /// # Errors
    ///
    /// See `add_route`.
    fn post<F>(&mut self, relative_path: &str, handler: F) -> Result<&mut Self>
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        self.route(Method::Post, relative_path, Handler::new(handler))
    }

    /// Register a PUT handler
    ///
    /// # Errors
    ///
    /// See `add_route`.
    fn put<F>(&mut self, relative_path: &str, handler: F) -> Result<&mut Self>
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        self.route(Method::Put, relative_path, Handler::new(handler))
    }

    /// Register a PATCH handler
    ///
    /// # Errors
    ///
    /// See `add_route`.
    fn patch<F>(&mut self, relative_path: &str, handler: F) -> Result<&mut Self>
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        self.route(Method::Patch, relative_path, Handler::new(handler))
    }

    /// Register a DELETE handler
    ///
    /// # Errors
    ///
    /// See `add_route`.
    fn delete<F>(&mut self, relative_path: &str, handler: F) -> Result<&mut Self>
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        self.route(Method::Delete, relative_path, Handler::new(handler))
    }

    /// Register a HEAD handler
    ///
    /// # Errors
    ///
    /// See `add_route`.
    fn head<F>(&mut self, relative_path: &str, handler: F) -> Result<&mut Self>
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        self.route(Method::Head, relative_path, Handler::new(handler))
    }

    /// Register an OPTIONS handler
    ///
    /// # Errors
    ///
    /// See `add_route`.
    fn options<F>(&mut self, relative_path: &str, handler: F) -> Result<&mut Self>
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        self.route(Method::Options, relative_path, Handler::new(handler))
    }

    /// Register a CONNECT handler
    ///
    /// # Errors
    ///
    /// See `add_route`.
    fn connect<F>(&mut self, relative_path: &str, handler: F) -> Result<&mut Self>
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        self.route(Method::Connect, relative_path, Handler::new(handler))
    }

    /// Register a TRACE handler
    ///
    /// # Errors
    ///
    /// See `add_route`.
    fn trace<F>(&mut self, relative_path: &str, handler: F) -> Result<&mut Self>
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        self.route(Method::Trace, relative_path, Handler::new(handler))
    }

    /// Register the same handler for every supported method
    ///
    /// Every method is checked first, so a conflict on one of them leaves
    /// none registered.
    ///
    /// # Errors
    ///
    /// See `add_route`.
    fn any<F>(&mut self, relative_path: &str, handler: F) -> Result<&mut Self>
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        for method in Method::ALL {
            self.check_route(method, relative_path)?;
        }
        let handler = Handler::new(handler);
        for method in Method::ALL {
            self.add_route(method, relative_path, vec![handler.clone()])?;
        }
        Ok(self)
    }

    /// Serve files below `root` at `relative_path/*filepath`
    ///
    /// # Errors
    ///
    /// See `add_route`.
    fn static_files(&mut self, relative_path: &str, root: impl Into<PathBuf>) -> Result<&mut Self> {
        let pattern = files::wildcard_pattern(relative_path);
        self.route(Method::Get, &pattern, files::static_handler(root.into()))
    }
}

/// Registration handle for one group of an engine
pub struct RouterGroup<'e> {
    engine: &'e mut Engine,
    id: GroupId,
}

impl<'e> RouterGroup<'e> {
    pub(crate) fn new(engine: &'e mut Engine, id: GroupId) -> Self {
        Self { engine, id }
    }

    /// Id of this group, usable with `Engine::group_mut`
    #[must_use]
    pub fn id(&self) -> GroupId {
        self.id
    }

    /// Absolute prefix of this group
    #[must_use]
    pub fn prefix(&self) -> &str {
        self.engine.groups.prefix(self.id)
    }

    /// Create a nested group
    pub fn group(&mut self, relative_path: &str, middleware: Vec<Handler>) -> RouterGroup<'_> {
        let id = self.engine.groups.derive(self.id, relative_path, middleware);
        if self.engine.config.mode.is_debug() {
            debug!(
                prefix = %self.engine.groups.prefix(id),
                groups = self.engine.groups.len(),
                "group created"
            );
        }
        RouterGroup::new(&mut *self.engine, id)
    }
}

impl Routes for RouterGroup<'_> {
    fn add_route(
        &mut self,
        method: Method,
        relative_path: &str,
        handlers: Vec<Handler>,
    ) -> Result<&mut Self> {
        let absolute = join_paths(self.engine.groups.prefix(self.id), relative_path);
        let count = self
            .engine
            .groups
            .compose_chain(self.id, &absolute, handlers.clone())?
            .len();
        self.engine.routes.register(method, &absolute, handlers, self.id)?;

        if self.engine.config.mode.is_debug() {
            debug!(method = %method, path = %absolute, handlers = count, "route registered");
        }
        Ok(self)
    }

    fn check_route(&self, method: Method, relative_path: &str) -> Result<()> {
        let absolute = join_paths(self.engine.groups.prefix(self.id), relative_path);
        self.engine.routes.check(method, &absolute)
    }

    fn add_middleware(&mut self, middleware: impl IntoIterator<Item = Handler>) -> &mut Self {
        self.engine.groups.add_middleware(self.id, middleware);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn noop(name: &str) -> Handler {
        Handler::named(name, |_| {})
    }

    #[test]
    fn test_join_paths() {
        assert_eq!(join_paths("", "/v1"), "/v1");
        assert_eq!(join_paths("/v1", "v2"), "/v1/v2");
        assert_eq!(join_paths("/v1/", "/v2"), "/v1/v2");
        assert_eq!(join_paths("/v1", "/v2/"), "/v1/v2/");
        assert_eq!(join_paths("/v1", ""), "/v1");
        assert_eq!(join_paths("", "/"), "/");
        assert_eq!(join_paths("/v1", "../v2"), "/v2");
        assert_eq!(join_paths("/v1", "//a//b"), "/v1/a/b");
    }

    #[test]
    fn test_nested_group_prefixes() {
        let mut tree = GroupTree::new();
        let v1 = tree.derive(ROOT_GROUP, "/v1", Vec::new());
        let v2 = tree.derive(v1, "/v2", Vec::new());
        let v3 = tree.derive(v2, "/v3", Vec::new());

        assert_eq!(tree.prefix(v2), "/v1/v2");
        assert_eq!(tree.prefix(v3), "/v1/v2/v3");
        assert_eq!(tree.ancestry(v3), vec![ROOT_GROUP, v1, v2, v3]);
        assert!(tree.is_ancestor_or_self(v1, v3));
        assert!(tree.is_ancestor_or_self(v3, v3));
        assert!(!tree.is_ancestor_or_self(v3, v1));
        assert_eq!(tree.len(), 4);
    }

    #[test]
    fn test_compose_chain_order() {
        let mut tree = GroupTree::new();
        tree.add_middleware(ROOT_GROUP, [noop("root")]);
        let v1 = tree.derive(ROOT_GROUP, "/v1", vec![noop("v1")]);
        let v2 = tree.derive(v1, "/v2", vec![noop("v2a"), noop("v2b")]);
        let sibling = tree.derive(ROOT_GROUP, "/other", vec![noop("other")]);

        let chain = tree.compose_chain(v2, "/v1/v2/x", vec![noop("handler")]).unwrap();
        let names: Vec<_> = chain.iter().filter_map(Handler::name).collect();
        assert_eq!(names, vec!["root", "v1", "v2a", "v2b", "handler"]);

        let chain = tree.compose_chain(sibling, "/other/x", vec![noop("h")]).unwrap();
        let names: Vec<_> = chain.iter().filter_map(Handler::name).collect();
        assert_eq!(names, vec!["root", "other", "h"]);
    }

    #[test]
    fn test_compose_chain_limit() {
        let mut tree = GroupTree::new();
        let many: Vec<Handler> = (0..ABORT_INDEX - 1).map(|_| Handler::new(|_| {})).collect();
        let g = tree.derive(ROOT_GROUP, "/g", many);

        assert!(tree.compose_chain(g, "/g/ok", Vec::new()).is_ok());
        let err = tree
            .compose_chain(g, "/g/x", vec![Handler::new(|_| {})])
            .unwrap_err();
        assert!(matches!(err, Error::TooManyHandlers { count, .. } if count == ABORT_INDEX));
    }

    #[test]
    fn test_dispatch_middleware_order() {
        let mut tree = GroupTree::new();
        tree.add_middleware(ROOT_GROUP, [noop("root")]);
        let _v1 = tree.derive(ROOT_GROUP, "/v1", vec![noop("v1")]);
        let v12 = tree.derive(ROOT_GROUP, "/v12", vec![noop("v12")]);
        let _v2 = tree.derive(ROOT_GROUP, "/v2", vec![noop("v2")]);
        let names = |chain: Vec<Handler>| -> Vec<String> {
            chain.iter().filter_map(Handler::name).map(String::from).collect()
        };

        let prefix = |p: &str, path: &str| path.starts_with(p);
        assert_eq!(
            names(tree.dispatch_middleware(Some(v12), "/v12/x", prefix)),
            vec!["root", "v1", "v12"]
        );
        assert_eq!(
            names(tree.dispatch_middleware(None, "/v12/x", prefix)),
            vec!["root", "v1", "v12"]
        );

        tree.add_middleware(ROOT_GROUP, [noop("late")]);
        let never = |_: &str, _: &str| false;
        assert_eq!(
            names(tree.dispatch_middleware(Some(v12), "/elsewhere", never)),
            vec!["root", "late", "v12"]
        );
    }

    #[test]
    fn test_router_group_registration() {
        let mut engine = Engine::new(Config::default());
        let mut v1 = engine.group("/v1", vec![noop("v1")]);
        let v1_id = v1.id();
        assert_eq!(v1.prefix(), "/v1");
        v1.get("/items/:id", |_| {}).unwrap();
        {
            let mut admin = v1.group("/admin", Vec::new());
            admin.post("/reset", |_| {}).unwrap();
        }
        v1.add_middleware([noop("late")]);
        v1.put("/items/:id", |_| {}).unwrap();

        let table = engine.route_table();
        assert_eq!(table.len(), 3);
        let get = table.resolve(Method::Get, "/v1/items/1").unwrap();
        assert_eq!(get.route.handlers.len(), 1);
        assert_eq!(get.route.group, v1_id);
        assert!(table.resolve(Method::Post, "/v1/admin/reset").is_some());
    }

    #[test]
    fn test_handle_validates_method() {
        let mut engine = Engine::new(Config::default());
        let err = engine.handle("get", "/x", vec![noop("h")]).unwrap_err();
        assert!(matches!(err, Error::InvalidMethod(m) if m == "get"));
        assert!(engine.handle("FETCH", "/x", vec![noop("h")]).is_err());
        assert!(engine.handle("DELETE", "/x", vec![noop("h")]).is_ok());
    }

    #[test]
    fn test_any_registers_every_method() {
        let mut engine = Engine::new(Config::default());
        engine.any("/ping", |_| {}).unwrap();
        for method in Method::ALL {
            assert!(engine.route_table().resolve(method, "/ping").is_some());
        }
    }

    #[test]
    fn test_any_conflict_registers_nothing() {
        let mut engine = Engine::new(Config::default());
        engine.patch("/ping", |_| {}).unwrap();

        let err = engine.any("/ping", |_| {}).unwrap_err();
        assert!(matches!(err, Error::RouteConflict { method, .. } if method == "PATCH"));
        assert_eq!(engine.route_table().len(), 1);
        assert!(engine.route_table().resolve(Method::Get, "/ping").is_none());
    }
}
