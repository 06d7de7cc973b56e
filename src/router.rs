//! Radix-tree request router.
//!
//! One tree per HTTP method, each leaf holding a fully resolved [`Chain`].
//! Lookup is O(path-length) and allocation-free apart from copying the
//! matched parameters out.

use std::collections::HashMap;
use std::sync::Arc;

use http::Method;
use matchit::{InsertError, Router as MatchitRouter};

use crate::handler::Chain;

/// The outcome of routing one request.
pub(crate) enum Lookup {
    Found { chain: Chain, params: Vec<(String, String)> },
    /// The path with its trailing slash added or removed matches a route.
    Redirect(String),
    /// The path matches under other methods only.
    MethodNotAllowed(Vec<Method>),
    NotFound,
}

#[derive(Default)]
pub(crate) struct Router {
    trees: HashMap<Method, MatchitRouter<Chain>>,
    routes: Vec<(Method, String)>,
}

impl Router {
    pub(crate) fn insert(&mut self, method: Method, path: &str, chain: Chain) -> Result<(), InsertError> {
        self.trees.entry(method.clone()).or_default().insert(path, chain)?;
        self.routes.push((method, path.to_owned()));
        Ok(())
    }

    /// Every registered method + path pair, in insertion order.
    pub(crate) fn routes(&self) -> &[(Method, String)] {
        &self.routes
    }

    fn at(&self, method: &Method, path: &str) -> Option<(Chain, Vec<(String, String)>)> {
        let matched = self.trees.get(method)?.at(path).ok()?;
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some((Arc::clone(matched.value), params))
    }

    fn allowed(&self, path: &str) -> Vec<Method> {
        let mut allowed: Vec<Method> = self.trees.iter()
            .filter(|(_, tree)| tree.at(path).is_ok())
            .map(|(method, _)| method.clone())
            .collect();
        allowed.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        allowed
    }

    pub(crate) fn lookup(
        &self,
        method: &Method,
        path: &str,
        redirect_trailing_slash: bool,
        handle_method_not_allowed: bool,
    ) -> Lookup {
        if let Some((chain, params)) = self.at(method, path) {
            return Lookup::Found { chain, params };
        }

        if redirect_trailing_slash && path != "/" {
            let alternate = match path.strip_suffix('/') {
                Some(trimmed) => trimmed.to_owned(),
                None => format!("{path}/"),
            };
            if self.at(method, &alternate).is_some() {
                return Lookup::Redirect(alternate);
            }
        }

        if handle_method_not_allowed {
            let allowed = self.allowed(path);
            if !allowed.is_empty() {
                return Lookup::MethodNotAllowed(allowed);
            }
        }

        Lookup::NotFound
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::BoxedHandler;

    fn chain() -> Chain {
        Arc::from(Vec::<BoxedHandler>::new())
    }

    fn router() -> Router {
        let mut r = Router::default();
        r.insert(Method::GET, "/users/{id}", chain()).unwrap();
        r.insert(Method::DELETE, "/users/{id}", chain()).unwrap();
        r.insert(Method::GET, "/docs/", chain()).unwrap();
        r
    }

    #[test]
    fn finds_route_with_params() {
        let Lookup::Found { params, .. } = router().lookup(&Method::GET, "/users/7", true, true) else {
            panic!("expected a match");
        };
        assert_eq!(params, [("id".to_owned(), "7".to_owned())]);
    }

    #[test]
    fn trailing_slash_redirects_both_ways() {
        let r = router();
        assert!(matches!(r.lookup(&Method::GET, "/users/7/", true, false), Lookup::Redirect(p) if p == "/users/7"));
        assert!(matches!(r.lookup(&Method::GET, "/docs", true, false), Lookup::Redirect(p) if p == "/docs/"));
        assert!(matches!(r.lookup(&Method::GET, "/docs", false, false), Lookup::NotFound));
    }

    #[test]
    fn method_not_allowed_lists_methods() {
        let r = router();
        let Lookup::MethodNotAllowed(allowed) = r.lookup(&Method::POST, "/users/7", true, true) else {
            panic!("expected 405");
        };
        assert_eq!(allowed, [Method::DELETE, Method::GET]);
        assert!(matches!(r.lookup(&Method::POST, "/users/7", true, false), Lookup::NotFound));
    }

    #[test]
    fn conflicting_insert_is_rejected() {
        let mut r = router();
        assert!(r.insert(Method::GET, "/users/{name}", chain()).is_err());
        assert_eq!(r.routes().len(), 3);
    }
}
