//! # plait
//!
//! Composable HTTP request pipelines for services whose routes and
//! middleware come from many independent places.
//!
//! Application parts register [`Route`]s, [`RouteGroup`]s and named
//! middleware on a shared [`Engine`]. Middleware is referenced by name and
//! resolved once, when the first request needs the pipeline: every chain is
//! then a flat, immutable list of handlers shared by all requests.
//!
//! What a chain looks like for a route inside a group:
//!
//! - diagnostics: logs errors recorded during the request
//! - recovery: turns a panic into a `500` envelope
//! - global middleware, from [`Config::middleware`]
//! - group middleware
//! - route before-middleware, the handler, route after-middleware
//!
//! [`middleware::keyauth`] is the built-in API-key authentication layer.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use plait::{handler_fn, Config, Context, Engine, Route, RouteGroup, Server};
//! use plait::middleware::keyauth::{KeyAuth, KeyAuthConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), plait::Error> {
//!     let engine = Engine::new(Config::default());
//!
//!     let auth = KeyAuth::new(KeyAuthConfig::new().validator(|_: &mut Context, key: &str, _| {
//!         let ok = key == "s3cret";
//!         Box::pin(async move { Ok(ok) })
//!     }))?;
//!     engine.register_middleware(auth.into_entry());
//!
//!     engine.add_group(
//!         RouteGroup::new("/api")
//!             .add_middleware(["keyauth"])
//!             .add_route(Route::get("/users/{id}", handler_fn(|ctx: &mut Context| Box::pin(async move {
//!                 let id = ctx.param("id").unwrap_or_default().to_owned();
//!                 ctx.ok(&serde_json::json!({ "id": id }));
//!             })))),
//!     );
//!
//!     Server::bind("0.0.0.0:3000").serve(&engine).await
//! }
//! ```

mod config;
mod context;
mod engine;
mod error;
mod handler;
mod http_error;
mod pattern;
mod pipeline;
mod pool;
mod render;
mod request;
mod response;
mod route;
mod router;
mod server;
mod static_files;

pub mod middleware;

pub use config::{CONFIG_KEY, Config, Configurer, Mode, TomlConfig};
pub use context::Context;
pub use engine::{Component, Engine};
pub use error::{BoxError, Error};
pub use handler::{BoxFuture, BoxedHandler, Chain, FnHandler, Handler, handler_fn};
pub use http_error::{ErrorTransform, FieldError, HttpError, ValidationErrors, transform_error};
pub use middleware::{MiddlewareEntry, MiddlewareRegistry, RegistryView, Scope};
pub use pattern::{Matcher, PatternCache, match_path};
pub use pipeline::Pipeline;
pub use pool::{ContextPool, PooledContext};
pub use render::Theme;
pub use request::Request;
pub use response::{ContentType, IntoResponse, Response, ResponseBuilder};
pub use route::{Route, RouteGroup};
pub use server::Server;
pub use static_files::StaticDir;
