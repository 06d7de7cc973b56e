//! Static asset mounts.
//!
//! A mount serves regular files below a root directory under a URL prefix.
//! Directories are not listed and paths escaping the root are refused.

use std::path::{Component, Path, PathBuf};

use crate::context::Context;
use crate::handler::{BoxFuture, Handler};
use crate::http_error::HttpError;
use crate::response::{ContentType, Response};

/// Route parameter carrying the requested file path.
pub(crate) const FILEPATH_PARAM: &str = "filepath";

/// Serves files from `root`. Mounted at `{prefix}/{*filepath}`.
pub struct StaticDir {
    root: PathBuf,
}

impl StaticDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, requested: &str) -> Option<PathBuf> {
        let relative = Path::new(requested.trim_start_matches('/'));
        let safe = relative.components().all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        safe.then(|| self.root.join(relative))
    }

    async fn serve(&self, ctx: &mut Context) {
        let requested = ctx.param(FILEPATH_PARAM).unwrap_or_default();
        let Some(path) = self.resolve(requested) else {
            ctx.abort_with_error(HttpError::not_found());
            return;
        };

        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => {}
            _ => {
                ctx.abort_with_error(HttpError::not_found());
                return;
            }
        }

        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
                ctx.respond(Response::builder().bytes(ContentType::from_extension(ext), bytes));
            }
            Err(e) => ctx.error(e),
        }
    }
}

impl Handler for StaticDir {
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, ()> {
        Box::pin(self.serve(ctx))
    }
}
