//! The built, immutable serving pipeline.
//!
//! A [`Pipeline`] is what an [`Engine`](crate::Engine) produces on its first
//! [`handler`](crate::Engine::handler) call. It is shared by every request
//! and never changes afterwards.

use http::{HeaderValue, Method, StatusCode, header};
use tracing::warn;

use crate::context::Context;
use crate::handler::{BoxFuture, Chain, Handler};
use crate::http_error::HttpError;
use crate::pool::ContextPool;
use crate::request::Request;
use crate::response::Response;
use crate::router::{Lookup, Router};

pub(crate) struct Toggles {
    pub(crate) redirect_trailing_slash: bool,
    pub(crate) handle_method_not_allowed: bool,
    pub(crate) remove_extra_slash: bool,
}

pub struct Pipeline {
    router: Router,
    not_found: Chain,
    method_not_allowed: Chain,
    pool: ContextPool,
    toggles: Toggles,
}

impl Pipeline {
    pub(crate) fn new(
        router: Router,
        not_found: Chain,
        method_not_allowed: Chain,
        pool: ContextPool,
        toggles: Toggles,
    ) -> Self {
        Self { router, not_found, method_not_allowed, pool, toggles }
    }

    /// Routes `request` and runs the matching chain to completion.
    pub async fn handle(&self, mut request: Request) -> Response {
        let path = if self.toggles.remove_extra_slash {
            collapse_slashes(request.path())
        } else {
            request.path().to_owned()
        };

        let lookup = self.router.lookup(
            request.method(),
            &path,
            self.toggles.redirect_trailing_slash,
            self.toggles.handle_method_not_allowed,
        );

        match lookup {
            Lookup::Found { chain, params } => {
                request.params = params;
                self.run(request, chain).await
            }
            Lookup::Redirect(to) => redirect(&request, &to),
            Lookup::MethodNotAllowed(allowed) => {
                let mut response = self.run(request, Chain::clone(&self.method_not_allowed)).await;
                let allow = allowed.iter().map(Method::as_str).collect::<Vec<_>>().join(", ");
                match HeaderValue::from_str(&allow) {
                    Ok(value) => {
                        response.headers_mut().insert(header::ALLOW, value);
                    }
                    Err(e) => warn!(allow, "invalid Allow header: {e}"),
                }
                response
            }
            Lookup::NotFound => self.run(request, Chain::clone(&self.not_found)).await,
        }
    }

    async fn run(&self, request: Request, chain: Chain) -> Response {
        let mut ctx = self.pool.acquire(request, chain);
        ctx.next().await;
        ctx.take_response()
    }

    /// Registered method + path pairs, static mounts first.
    pub fn routes(&self) -> &[(Method, String)] {
        self.router.routes()
    }

    pub fn pool(&self) -> &ContextPool {
        &self.pool
    }
}

fn redirect(request: &Request, to: &str) -> Response {
    let status = if request.method() == Method::GET {
        StatusCode::MOVED_PERMANENTLY
    } else {
        StatusCode::TEMPORARY_REDIRECT
    };
    let location = match request.uri().query() {
        Some(q) => format!("{to}?{q}"),
        None => to.to_owned(),
    };
    Response::builder()
        .status(status)
        .header(header::LOCATION.as_str(), &location)
        .no_body()
}

fn collapse_slashes(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for c in path.chars() {
        if c == '/' && out.ends_with('/') {
            continue;
        }
        out.push(c);
    }
    out
}

/// Terminal handler of the not-found and method-not-allowed chains. Leaves
/// any response a global middleware already wrote untouched.
pub(crate) struct Fallback(pub(crate) StatusCode);

impl Handler for Fallback {
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            if ctx.response().is_none() {
                ctx.abort_with_error(HttpError::new(self.0));
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_repeated_slashes() {
        assert_eq!(collapse_slashes("//api///users/"), "/api/users/");
        assert_eq!(collapse_slashes("/plain"), "/plain");
    }
}
