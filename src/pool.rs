//! Context reuse.
//!
//! Each request borrows a [`Context`] from the pool for exactly the span of
//! its handling. The [`PooledContext`] guard returns it on drop, after the
//! context has let go of the request, so a reused context never exposes a
//! previous request to a later one.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::context::{Context, Shared};
use crate::handler::Chain;
use crate::request::Request;
use crate::response::Response;

/// Idle contexts kept for reuse; extra ones are dropped on release.
const MAX_IDLE: usize = 1024;

/// A pool of reusable request contexts.
pub struct ContextPool {
    idle: Mutex<Vec<Context>>,
    shared: Arc<Shared>,
}

impl ContextPool {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { idle: Mutex::new(Vec::new()), shared }
    }

    /// Takes a context (reused or fresh) bound to `request` and `chain`.
    pub fn acquire(&self, request: Request, chain: Chain) -> PooledContext<'_> {
        let mut ctx = self.idle.lock().pop()
            .unwrap_or_else(|| Context::blank(Arc::clone(&self.shared)));
        ctx.bind(request, chain);
        PooledContext { ctx, pool: self }
    }

    /// Clears `ctx` and makes it available to later requests.
    pub fn release(&self, mut ctx: Context) {
        ctx.reset();
        let mut idle = self.idle.lock();
        if idle.len() < MAX_IDLE {
            idle.push(ctx);
        }
    }

    /// Number of contexts currently waiting for reuse.
    pub fn idle(&self) -> usize {
        self.idle.lock().len()
    }
}

/// Exclusive use of a pooled [`Context`] for one request.
pub struct PooledContext<'p> {
    ctx: Context,
    pool: &'p ContextPool,
}

impl PooledContext<'_> {
    /// Takes the response written so far (`200 OK`, empty, if none).
    pub fn take_response(&mut self) -> Response {
        self.ctx.take_response()
    }
}

impl Deref for PooledContext<'_> {
    type Target = Context;

    fn deref(&self) -> &Context { &self.ctx }
}

impl DerefMut for PooledContext<'_> {
    fn deref_mut(&mut self) -> &mut Context { &mut self.ctx }
}

impl Drop for PooledContext<'_> {
    fn drop(&mut self) {
        let blank = Context::blank(Arc::clone(&self.pool.shared));
        let ctx = std::mem::replace(&mut self.ctx, blank);
        self.pool.release(ctx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn pool() -> ContextPool {
        ContextPool::new(Arc::new(Shared::default()))
    }

    fn request(uri: &str) -> Request {
        Request::from(http::Request::builder().uri(uri).body(Bytes::new()).unwrap())
    }

    #[test]
    fn release_returns_a_cleared_context() {
        let pool = pool();
        let chain = Arc::clone(&pool.shared.empty_chain);
        {
            let mut ctx = pool.acquire(request("/secret?token=abc"), Arc::clone(&chain));
            ctx.set("user", "alice");
            ctx.text(http::StatusCode::OK, "hi");
            assert_eq!(pool.idle(), 0);
        }
        assert_eq!(pool.idle(), 1);

        let ctx = pool.acquire(request("/next"), chain);
        assert_eq!(pool.idle(), 0);
        assert_eq!(ctx.request().path(), "/next");
        assert_eq!(ctx.get_string("user"), "");
        assert!(ctx.response().is_none());
        assert!(!ctx.is_aborted());
    }

    #[test]
    fn explicit_release_clears_request() {
        let pool = pool();
        let mut ctx = Context::blank(Arc::clone(&pool.shared));
        ctx.bind(request("/private"), Arc::clone(&pool.shared.empty_chain));
        pool.release(ctx);

        let reused = pool.idle.lock().pop().unwrap();
        assert_eq!(reused.request().path(), "/");
    }

    #[test]
    fn concurrent_requests_get_distinct_contexts() {
        let pool = pool();
        let chain = Arc::clone(&pool.shared.empty_chain);
        let mut a = pool.acquire(request("/a"), Arc::clone(&chain));
        let b = pool.acquire(request("/b"), chain);
        a.set("k", "a");
        assert_eq!(b.get_string("k"), "");
        drop(a);
        drop(b);
        assert_eq!(pool.idle(), 2);
    }
}
