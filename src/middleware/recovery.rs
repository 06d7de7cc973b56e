//! Panic recovery.
//!
//! Installed just inside the diagnostic logger, so a panic anywhere further
//! down the chain becomes a `500` envelope instead of tearing down the
//! connection task.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use tracing::error;

use crate::context::Context;
use crate::handler::{BoxFuture, Handler};
use crate::http_error::HttpError;

pub struct Recovery;

impl Handler for Recovery {
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let outcome = AssertUnwindSafe(ctx.next()).catch_unwind().await;
            if let Err(payload) = outcome {
                let message = panic_message(payload.as_ref());
                error!(
                    method = %ctx.request().method(),
                    path = ctx.request().path(),
                    panic = %message,
                    "recovered from handler panic"
                );
                ctx.abort_with_error(
                    HttpError::internal_server_error().with_internal(format!("panic: {message}")),
                );
            }
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}
