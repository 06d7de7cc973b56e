//! Minimal plait example: an open health check and an API group guarded by
//! key auth.
//!
//! Run with:
//!   cargo run --example basic
//!
//! Try:
//!   curl -i http://localhost:3000/healthz
//!   curl -i http://localhost:3000/api/users/42
//!   curl -i -H 'authorization: Bearer s3cret' http://localhost:3000/api/users/42
//!   curl -i 'http://localhost:3000/api/users/42?api_key=s3cret'
//!   curl -i -X POST -H 'x-api-key: s3cret' http://localhost:3000/api/users

use http::StatusCode;
use plait::middleware::keyauth::{KeyAuth, KeyAuthConfig};
use plait::{Config, Context, Engine, Mode, Route, RouteGroup, Server, handler_fn};

#[tokio::main]
async fn main() -> Result<(), plait::Error> {
    tracing_subscriber::fmt::init();

    let engine = Engine::new(Config { mode: Mode::Debug, ..Config::default() });

    let auth = KeyAuth::new(
        KeyAuthConfig::new()
            .key_lookup("header:Authorization:Bearer ,header:X-Api-Key,query:api_key")
            .exclude_routes(["GET/healthz"])
            .validator(|ctx: &mut Context, key: &str, source| {
                let ok = key == "s3cret";
                if ok {
                    ctx.set("caller", format!("key from {source}"));
                }
                Box::pin(async move { Ok(ok) })
            }),
    )?;
    engine.register_middleware(auth.into_entry());

    engine.add_route(Route::get("/healthz", handler_fn(|ctx: &mut Context| Box::pin(async move {
        ctx.no_content();
    }))));

    engine.add_group(
        RouteGroup::new("/api")
            .add_middleware(["keyauth"])
            .add_route(Route::get("/users/{id}", handler_fn(|ctx: &mut Context| Box::pin(async move {
                let id = ctx.param("id").unwrap_or_default().to_owned();
                let caller = ctx.get_string("caller").to_owned();
                ctx.ok(&serde_json::json!({ "id": id, "name": "alice", "caller": caller }));
            }))))
            .add_route(Route::post("/users", handler_fn(|ctx: &mut Context| Box::pin(async move {
                ctx.created("/api/users/99");
            }))))
            .add_route(Route::delete("/users/{id}", handler_fn(|ctx: &mut Context| Box::pin(async move {
                ctx.text(StatusCode::ACCEPTED, "deleting");
            })))),
    );

    Server::bind("0.0.0.0:3000").serve(&engine).await
}
