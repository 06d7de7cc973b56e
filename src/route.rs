//! Routes and route groups as registered by application code.
//!
//! These are plain descriptions: a path, methods, a handler and middleware
//! *names*. Names are resolved against the [`MiddlewareRegistry`] only when
//! the pipeline is built, so a route may name middleware registered later.
//!
//! [`MiddlewareRegistry`]: crate::MiddlewareRegistry

use http::Method;

use crate::handler::{BoxedHandler, Handler};

/// A path + methods pair served by one handler.
///
/// ```rust
/// use plait::{handler_fn, Context, Route};
/// use http::Method;
///
/// let route = Route::new(Method::GET, "/users/{id}", handler_fn(|ctx: &mut Context| Box::pin(async move {
///     let id = ctx.param("id").unwrap_or_default().to_owned();
///     ctx.ok(&id);
/// })))
/// .add_method(Method::HEAD)
/// .add_before_middleware(["auth"]);
/// # let _ = route;
/// ```
#[derive(Clone)]
pub struct Route {
    path: String,
    methods: Vec<Method>,
    handler: BoxedHandler,
    before: Vec<String>,
    after: Vec<String>,
}

impl Route {
    pub fn new(method: Method, path: impl Into<String>, handler: impl Handler) -> Self {
        Self {
            path: path.into(),
            methods: vec![method],
            handler: handler.into_boxed_handler(),
            before: Vec::new(),
            after: Vec::new(),
        }
    }

    pub fn get(path: impl Into<String>, handler: impl Handler) -> Self {
        Self::new(Method::GET, path, handler)
    }

    pub fn post(path: impl Into<String>, handler: impl Handler) -> Self {
        Self::new(Method::POST, path, handler)
    }

    pub fn put(path: impl Into<String>, handler: impl Handler) -> Self {
        Self::new(Method::PUT, path, handler)
    }

    pub fn delete(path: impl Into<String>, handler: impl Handler) -> Self {
        Self::new(Method::DELETE, path, handler)
    }

    pub fn add_method(mut self, method: Method) -> Self {
        self.methods.push(method);
        self
    }

    /// Appends middleware names that run before the handler.
    pub fn add_before_middleware<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.before.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn set_before_middleware<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.before = names.into_iter().map(Into::into).collect();
        self
    }

    /// Appends middleware names that run after the handler.
    pub fn add_after_middleware<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.after.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn set_after_middleware<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.after = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn path(&self) -> &str { &self.path }
    pub fn methods(&self) -> &[Method] { &self.methods }
    pub fn handler(&self) -> &BoxedHandler { &self.handler }
    pub fn before_middleware(&self) -> &[String] { &self.before }
    pub fn after_middleware(&self) -> &[String] { &self.after }
}

/// Routes sharing a path prefix and a middleware list.
#[derive(Clone, Default)]
pub struct RouteGroup {
    path: String,
    middleware: Vec<String>,
    routes: Vec<Route>,
}

impl RouteGroup {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into(), ..Self::default() }
    }

    pub fn add_route(mut self, route: Route) -> Self {
        self.routes.push(route);
        self
    }

    pub fn add_routes(mut self, routes: impl IntoIterator<Item = Route>) -> Self {
        self.routes.extend(routes);
        self
    }

    pub fn add_middleware<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.middleware.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn set_middleware<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.middleware = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn path(&self) -> &str { &self.path }
    pub fn middleware(&self) -> &[String] { &self.middleware }
    pub fn routes(&self) -> &[Route] { &self.routes }
}

/// Joins a group prefix and a route path, keeping a trailing slash the
/// route asked for and collapsing the slash between them.
pub(crate) fn join_paths(prefix: &str, path: &str) -> String {
    if path.is_empty() {
        return if prefix.is_empty() { "/".to_owned() } else { prefix.to_owned() };
    }
    let mut joined = String::with_capacity(prefix.len() + path.len() + 1);
    joined.push_str(prefix.trim_end_matches('/'));
    joined.push('/');
    joined.push_str(path.trim_start_matches('/'));
    joined
}
