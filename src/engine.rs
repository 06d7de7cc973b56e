//! Collection phase and one-time pipeline assembly.
//!
//! Independent parts of an application register routes, groups and named
//! middleware on a shared [`Engine`], in any order and from any thread. The
//! first [`Engine::handler`] call freezes everything into a [`Pipeline`];
//! concurrent first callers wait for that single build and all get the same
//! snapshot. Registration and the build share one lock, so a snapshot never
//! sees a middleware in one scope and misses it in another.
//!
//! Chain layout for a grouped route:
//!
//! ```text
//! diagnostics → recovery → global → group → before → handler → after
//! ```
//!
//! Static mounts are installed first and run without any of these wrappers.

use std::sync::{Arc, OnceLock};

use http::{HeaderName, Method, StatusCode};
use parking_lot::{Mutex, MutexGuard};
use tracing::{error, info, warn};

use crate::config::{CONFIG_KEY, Config, Configurer};
use crate::context::Shared;
use crate::error::Error;
use crate::handler::{BoxedHandler, Chain, Handler};
use crate::http_error::ErrorTransform;
use crate::middleware::diagnostics::Diagnostics;
use crate::middleware::recovery::Recovery;
use crate::middleware::{MiddlewareEntry, MiddlewareRegistry, RegistryView, Scope};
use crate::pipeline::{Fallback, Pipeline, Toggles};
use crate::pool::ContextPool;
use crate::render::Theme;
use crate::route::{Route, RouteGroup, join_paths};
use crate::router::Router;
use crate::static_files::{FILEPATH_PARAM, StaticDir};

/// Anything an application part can contribute to an engine.
pub enum Component {
    Route(Route),
    Group(RouteGroup),
    Middleware(MiddlewareEntry),
    Middlewares(Vec<MiddlewareEntry>),
    Groups(Vec<RouteGroup>),
}

impl From<Route> for Component {
    fn from(r: Route) -> Self { Self::Route(r) }
}

impl From<RouteGroup> for Component {
    fn from(g: RouteGroup) -> Self { Self::Group(g) }
}

impl From<MiddlewareEntry> for Component {
    fn from(m: MiddlewareEntry) -> Self { Self::Middleware(m) }
}

impl From<Vec<MiddlewareEntry>> for Component {
    fn from(m: Vec<MiddlewareEntry>) -> Self { Self::Middlewares(m) }
}

impl From<Vec<RouteGroup>> for Component {
    fn from(g: Vec<RouteGroup>) -> Self { Self::Groups(g) }
}

#[derive(Default)]
struct RouteTable {
    routes: Vec<Route>,
    groups: Vec<RouteGroup>,
    frozen: bool,
}

/// Collects routes and middleware, then builds the serving pipeline once.
pub struct Engine {
    config: Config,
    registry: MiddlewareRegistry,
    table: Mutex<RouteTable>,
    transform: Option<ErrorTransform>,
    theme: Option<Arc<dyn Theme>>,
    pipeline: OnceLock<Arc<Pipeline>>,
    #[cfg(test)]
    assemblies: std::sync::atomic::AtomicUsize,
}

impl Engine {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            registry: MiddlewareRegistry::new(),
            table: Mutex::new(RouteTable::default()),
            transform: None,
            theme: None,
            pipeline: OnceLock::new(),
            #[cfg(test)]
            assemblies: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Builds an engine from the `http` section of `source`.
    ///
    /// Returns [`Error::Disabled`] when the section is absent, so hosts can
    /// treat the HTTP layer as optional.
    pub fn init(source: &impl Configurer) -> Result<Self, Error> {
        if !source.has(CONFIG_KEY) {
            return Err(Error::Disabled(CONFIG_KEY.to_owned()));
        }
        Ok(Self::new(source.unmarshal_key(CONFIG_KEY)?))
    }

    pub fn with_theme(mut self, theme: impl Theme) -> Self {
        self.theme = Some(Arc::new(theme));
        self
    }

    /// Replaces the default [`transform_error`](crate::transform_error).
    pub fn with_error_transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(crate::error::BoxError) -> crate::http_error::HttpError + Send + Sync + 'static,
    {
        self.transform = Some(Arc::new(transform));
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &MiddlewareRegistry {
        &self.registry
    }

    /// The route table, unless the pipeline has been built. Middleware is
    /// registered under this guard too.
    fn collecting(&self, what: &str) -> Option<MutexGuard<'_, RouteTable>> {
        let table = self.table.lock();
        if table.frozen {
            warn!(what, "pipeline already built, registration ignored");
            return None;
        }
        Some(table)
    }

    pub fn add_route(&self, route: Route) {
        if let Some(mut table) = self.collecting("route") {
            table.routes.push(route);
        }
    }

    pub fn add_group(&self, group: RouteGroup) {
        if let Some(mut table) = self.collecting("group") {
            table.groups.push(group);
        }
    }

    pub fn register_middleware(&self, entry: MiddlewareEntry) {
        if let Some(_table) = self.collecting("middleware") {
            self.registry.register(entry);
        }
    }

    /// Sorts discovered components into routes, groups and middleware.
    pub fn collect(&self, components: impl IntoIterator<Item = Component>) {
        for component in components {
            match component {
                Component::Route(r) => self.add_route(r),
                Component::Group(g) => self.add_group(g),
                Component::Middleware(m) => self.register_middleware(m),
                Component::Middlewares(ms) => {
                    if let Some(_table) = self.collecting("middleware") {
                        self.registry.register_batch(ms);
                    }
                }
                Component::Groups(gs) => gs.into_iter().for_each(|g| self.add_group(g)),
            }
        }
    }

    /// The serving pipeline, built on first call.
    pub fn handler(&self) -> Arc<Pipeline> {
        Arc::clone(self.pipeline.get_or_init(|| Arc::new(self.assemble())))
    }

    fn shared(&self) -> Shared {
        let mut shared = Shared {
            debug: self.config.is_debug(),
            theme: self.theme.clone(),
            forwarded_by_client_ip: self.config.forwarded_by_client_ip,
            remote_ip_headers: Vec::new(),
            ..Shared::default()
        };
        if let Some(transform) = &self.transform {
            shared.transform = Arc::clone(transform);
        }
        for name in &self.config.remote_ip_headers {
            match HeaderName::from_bytes(name.as_bytes()) {
                Ok(h) => shared.remote_ip_headers.push(h),
                Err(_) => warn!(header = name.as_str(), "ignoring invalid remote ip header"),
            }
        }
        shared
    }

    fn assemble(&self) -> Pipeline {
        #[cfg(test)]
        self.assemblies.fetch_add(1, std::sync::atomic::Ordering::SeqCst);

        let mut table = self.table.lock();
        table.frozen = true;
        let registry = self.registry.read();
        let mut router = Router::default();

        for (prefix, root) in &self.config.static_dirs {
            let path = join_paths(prefix, &format!("/{{*{FILEPATH_PARAM}}}"));
            let chain: Chain = Arc::from(vec![StaticDir::new(root).into_boxed_handler()]);
            for method in [Method::GET, Method::HEAD] {
                install(&mut router, method, &path, Chain::clone(&chain));
            }
        }

        let mut global: Vec<BoxedHandler> = vec![
            Diagnostics.into_boxed_handler(),
            Recovery.into_boxed_handler(),
        ];
        global.extend(registry.resolve(self.config.middleware.as_slice(), Scope::Root));

        for route in &table.routes {
            install_route(&mut router, &registry, &global, route.path(), route);
        }

        for group in &table.groups {
            let mut scoped = global.clone();
            scoped.extend(registry.resolve(group.middleware(), Scope::Path(group.path())));
            for route in group.routes() {
                let path = join_paths(group.path(), route.path());
                install_route(&mut router, &registry, &scoped, &path, route);
            }
        }

        let fallback = |status| -> Chain {
            let mut chain = global.clone();
            chain.push(Fallback(status).into_boxed_handler());
            Arc::from(chain)
        };
        let not_found = fallback(StatusCode::NOT_FOUND);
        let method_not_allowed = fallback(StatusCode::METHOD_NOT_ALLOWED);

        info!(
            routes = table.routes.len(),
            groups = table.groups.len(),
            middleware = registry.len(),
            "pipeline built"
        );

        Pipeline::new(
            router,
            not_found,
            method_not_allowed,
            ContextPool::new(Arc::new(self.shared())),
            Toggles {
                redirect_trailing_slash: self.config.redirect_trailing_slash,
                handle_method_not_allowed: self.config.handle_method_not_allowed,
                remove_extra_slash: self.config.remove_extra_slash,
            },
        )
    }

    #[cfg(test)]
    fn assemblies(&self) -> usize {
        self.assemblies.load(std::sync::atomic::Ordering::SeqCst)
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

fn install_route(
    router: &mut Router,
    registry: &RegistryView<'_>,
    outer: &[BoxedHandler],
    path: &str,
    route: &Route,
) {
    let scope = Scope::Path(path);
    let mut chain = outer.to_vec();
    chain.extend(registry.resolve(route.before_middleware(), scope));
    chain.push(BoxedHandler::clone(route.handler()));
    chain.extend(registry.resolve(route.after_middleware(), scope));
    let chain: Chain = Arc::from(chain);
    for method in route.methods() {
        install(router, method.clone(), path, Chain::clone(&chain));
    }
}

fn install(router: &mut Router, method: Method, path: &str, chain: Chain) {
    if let Err(e) = router.insert(method.clone(), path, chain) {
        error!(%method, path, "route conflict, skipping: {e}");
    }
}
