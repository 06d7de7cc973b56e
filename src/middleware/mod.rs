//! Named middleware.
//!
//! Middleware is any [`Handler`] registered under a name. Routes, groups
//! and the global configuration refer to middleware by name only; the
//! [`MiddlewareRegistry`] turns names into handlers when the pipeline is
//! built.
//!
//! Built-in pieces:
//! - [`keyauth`]: API-key and token authentication
//! - [`recovery`]: turns handler panics into a 500 envelope
//! - [`diagnostics`]: logs errors recorded during a request

use std::collections::HashMap;
use std::fmt;

use parking_lot::{RwLock, RwLockReadGuard};
use tracing::warn;

use crate::handler::{BoxedHandler, Handler};

pub mod diagnostics;
pub mod keyauth;
pub mod recovery;

/// A middleware handler and the name it is looked up by.
#[derive(Clone)]
pub struct MiddlewareEntry {
    name: String,
    handler: BoxedHandler,
}

impl MiddlewareEntry {
    pub fn new(name: impl Into<String>, handler: impl Handler) -> Self {
        Self { name: name.into(), handler: handler.into_boxed_handler() }
    }

    pub fn name(&self) -> &str { &self.name }
    pub fn handler(&self) -> &BoxedHandler { &self.handler }
}

/// Where a list of middleware names was requested from; used to label
/// warnings about unknown names.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scope<'a> {
    /// The global middleware list.
    Root,
    /// A group or route, identified by its path.
    Path(&'a str),
}

impl fmt::Display for Scope<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Root => f.write_str("/"),
            Self::Path(p) => f.write_str(p),
        }
    }
}

/// Name → middleware map. The last registration under a name wins.
#[derive(Default)]
pub struct MiddlewareRegistry {
    entries: RwLock<HashMap<String, BoxedHandler>>,
}

impl MiddlewareRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, entry: MiddlewareEntry) {
        self.entries.write().insert(entry.name, entry.handler);
    }

    pub fn register_batch(&self, entries: impl IntoIterator<Item = MiddlewareEntry>) {
        let mut map = self.entries.write();
        for entry in entries {
            map.insert(entry.name, entry.handler);
        }
    }

    /// Holds the read lock until the view is dropped, so every lookup made
    /// through it sees the same set of entries.
    pub fn read(&self) -> RegistryView<'_> {
        RegistryView { map: self.entries.read() }
    }

    /// Looks up `names` in order. Unknown names are skipped with a warning
    /// labelled by `scope`.
    pub fn resolve<S: AsRef<str>>(&self, names: &[S], scope: Scope<'_>) -> Vec<BoxedHandler> {
        self.read().resolve(names, scope)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

/// A locked, unchanging view of a [`MiddlewareRegistry`].
pub struct RegistryView<'r> {
    map: RwLockReadGuard<'r, HashMap<String, BoxedHandler>>,
}

impl RegistryView<'_> {
    pub fn resolve<S: AsRef<str>>(&self, names: &[S], scope: Scope<'_>) -> Vec<BoxedHandler> {
        let mut resolved = Vec::with_capacity(names.len());
        for name in names {
            let name = name.as_ref();
            match self.map.get(name) {
                Some(handler) => resolved.push(BoxedHandler::clone(handler)),
                None => match scope {
                    Scope::Root => warn!(requested = name, "requested middleware does not exist"),
                    Scope::Path(path) => {
                        warn!(path, requested = name, "requested middleware does not exist")
                    }
                },
            }
        }
        resolved
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::handler::handler_fn;
    use crate::request::Request;
    use std::sync::Arc;

    fn marker(value: &'static str) -> impl Handler {
        handler_fn(move |ctx: &mut Context| Box::pin(async move { ctx.set("ran", value) }))
    }

    #[tokio::test]
    async fn last_registration_wins() {
        let registry = MiddlewareRegistry::new();
        registry.register(MiddlewareEntry::new("x", marker("first")));
        registry.register(MiddlewareEntry::new("x", marker("second")));
        assert_eq!(registry.len(), 1);

        let resolved = registry.resolve(&["x"], Scope::Root);
        assert_eq!(resolved.len(), 1);

        let mut ctx = Context::from_request(Request::default());
        resolved[0].call(&mut ctx).await;
        assert_eq!(ctx.get_string("ran"), "second");
    }

    #[test]
    fn resolve_keeps_order_and_skips_unknown() {
        let registry = MiddlewareRegistry::new();
        registry.register_batch([
            MiddlewareEntry::new("a", marker("a")),
            MiddlewareEntry::new("b", marker("b")),
        ]);
        let a = registry.resolve(&["a"], Scope::Root).remove(0);
        let b = registry.resolve(&["b"], Scope::Root).remove(0);

        let resolved = registry.resolve(&["b", "missing", "a"], Scope::Path("/api"));
        assert_eq!(resolved.len(), 2);
        assert!(Arc::ptr_eq(&resolved[0], &b));
        assert!(Arc::ptr_eq(&resolved[1], &a));
    }

    #[test]
    fn concurrent_registration_is_safe() {
        let registry = Arc::new(MiddlewareRegistry::new());
        let threads: Vec<_> = (0..8)
            .map(|i| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for j in 0..50 {
                        registry.register(MiddlewareEntry::new(format!("m{i}-{j}"), marker("x")));
                        registry.resolve(&["m0-0"], Scope::Root);
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(registry.len(), 400);
        assert!(registry.contains("m7-49"));
    }

    #[test]
    fn view_holds_registrations_back_until_dropped() {
        let registry = Arc::new(MiddlewareRegistry::new());
        registry.register(MiddlewareEntry::new("a", marker("a")));

        let view = registry.read();
        let writer = {
            let registry = Arc::clone(&registry);
            std::thread::spawn(move || registry.register(MiddlewareEntry::new("b", marker("b"))))
        };
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert_eq!(view.resolve(&["a", "b"], Scope::Root).len(), 1);
        assert_eq!(view.resolve(&["b"], Scope::Path("/g")).len(), 0);
        drop(view);

        writer.join().unwrap();
        assert_eq!(registry.resolve(&["a", "b"], Scope::Root).len(), 2);
    }

    #[test]
    fn scope_labels() {
        assert_eq!(Scope::Root.to_string(), "/");
        assert_eq!(Scope::Path("/admin").to_string(), "/admin");
    }
}
