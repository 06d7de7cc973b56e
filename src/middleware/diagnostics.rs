//! Outermost wrapper: after the rest of the chain has run, logs whatever
//! errors handlers recorded. The response is left untouched.

use tracing::error;

use crate::context::Context;
use crate::handler::{BoxFuture, Handler};

pub struct Diagnostics;

impl Handler for Diagnostics {
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            ctx.next().await;

            if !ctx.errors().is_empty() {
                let errors: Vec<String> = ctx.errors().iter().map(ToString::to_string).collect();
                error!(
                    method = %ctx.request().method(),
                    path = ctx.request().path(),
                    errors = ?errors,
                    "request errors"
                );
            }
        })
    }
}
