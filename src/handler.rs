//! Handler trait and type erasure.
//!
//! # How handlers are stored
//!
//! A pipeline is a flat, ordered list of handlers: wrappers, global
//! middlewares, group middlewares, route before-middlewares, the route
//! handler and route after-middlewares. They have different concrete types,
//! so the list holds trait objects (`Arc<dyn Handler>`) and every request
//! walks the same shared slice.
//!
//! ```text
//! |ctx| Box::pin(async move { … })        ← user writes this
//!        ↓ handler_fn(…)
//! FnHandler(closure)                      ← typed wrapper
//!        ↓ .into_boxed_handler()
//! Arc<dyn Handler>                        ← one entry in a Chain
//!        ↓ at request time
//! handler.call(&mut ctx)                  ← one vtable dispatch
//! ```
//!
//! A handler that wants to run code after the rest of the chain awaits
//! [`Context::next`]; one that does not is followed by the next entry anyway,
//! unless it aborted the context.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::Context;

/// A heap-allocated, type-erased future borrowing from the request context.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A handler shared across concurrent requests.
pub type BoxedHandler = Arc<dyn Handler>;

/// A resolved, immutable handler list. Cloning is one atomic increment.
pub type Chain = Arc<[BoxedHandler]>;

/// One step of a request pipeline.
///
/// Implement it on your own types (the key-auth middleware does), or wrap a
/// closure with [`handler_fn`].
pub trait Handler: Send + Sync + 'static {
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, ()>;

    fn into_boxed_handler(self) -> BoxedHandler
    where
        Self: Sized,
    {
        Arc::new(self)
    }
}

/// Wraps a function or closure returning a boxed future into a [`Handler`].
///
/// ```rust
/// use plait::{handler_fn, Context};
///
/// let hello = handler_fn(|ctx: &mut Context| Box::pin(async move {
///     ctx.text(http::StatusCode::OK, "hello");
/// }));
/// # let _ = hello;
/// ```
pub fn handler_fn<F>(f: F) -> FnHandler<F>
where
    F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, ()> + Send + Sync + 'static,
{
    FnHandler(f)
}

/// Newtype bridging a closure to the [`Handler`] trait object world.
pub struct FnHandler<F>(F);

impl<F> Handler for FnHandler<F>
where
    F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, ()> + Send + Sync + 'static,
{
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, ()> {
        (self.0)(ctx)
    }
}

impl Handler for BoxedHandler {
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, ()> {
        (**self).call(ctx)
    }

    fn into_boxed_handler(self) -> BoxedHandler {
        self
    }
}
