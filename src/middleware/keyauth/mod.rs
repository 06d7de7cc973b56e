//! API-key / token authentication.
//!
//! [`KeyAuth`] tries each configured extractor in order and hands every
//! candidate it finds to the validator. The first accepted candidate lets
//! the request through. If none is accepted the request is rejected with
//! `400 missing key` (nothing was found) or `401 invalid key` (something
//! was found and refused), unless an error handler decides otherwise.
//!
//! ```rust
//! use plait::middleware::keyauth::{KeyAuth, KeyAuthConfig};
//! use plait::Context;
//!
//! let auth = KeyAuth::new(
//!     KeyAuthConfig::new()
//!         .key_lookup("header:X-Api-Key,query:api_key")
//!         .exclude_routes(["GET/health"])
//!         .validator(|_: &mut Context, key: &str, _| {
//!             let ok = key == "s3cret";
//!             Box::pin(async move { Ok(ok) })
//!         }),
//! )
//! .unwrap();
//! # let _ = auth;
//! ```

use tracing::debug;

use crate::context::Context;
use crate::error::BoxError;
use crate::handler::{BoxFuture, Handler};
use crate::http_error::HttpError;
use crate::middleware::MiddlewareEntry;
use crate::pattern::PatternCache;

mod config;
mod decision;
mod extractor;

pub use config::{DEFAULT_KEY_LOOKUP, ErrorHandler, KeyAuthConfig, Validator};
pub use extractor::{
    Candidates, EXTRACTOR_LIMIT, ExtractError, Extractor, ExtractorSource, parse_lookup,
};

use decision::{Attempts, Failure, Handled, Verdict, decide};

/// Registry name used by [`KeyAuth::into_entry`].
pub const DEFAULT_NAME: &str = "keyauth";

/// Setup failures.
#[derive(Debug, thiserror::Error)]
pub enum KeyAuthError {
    #[error("key-auth middleware requires a validator function")]
    MissingValidator,
    #[error("key lookup `{0}` could not be split into source and name")]
    InvalidLookup(String),
    #[error("invalid header name `{0}` in key lookup")]
    InvalidHeaderName(String),
    #[error("no usable extractor in key lookup `{0}`")]
    NoExtractors(String),
}

/// Rejection causes recorded when no more specific error is available.
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
pub enum AuthError {
    #[error("missing key")]
    MissingKey,
    #[error("invalid key")]
    InvalidKey,
}

/// The key-auth middleware handler.
pub struct KeyAuth {
    extractors: Vec<extractor::Extractor>,
    exclude_routes: Vec<String>,
    validator: std::sync::Arc<dyn Validator>,
    error_handler: Option<ErrorHandler>,
    continue_on_ignored_error: bool,
    patterns: Option<std::sync::Arc<PatternCache>>,
}

impl KeyAuth {
    pub fn new(config: KeyAuthConfig) -> Result<Self, KeyAuthError> {
        let validator = config.validator.ok_or(KeyAuthError::MissingValidator)?;
        let lookup = if config.key_lookup.trim().is_empty() {
            DEFAULT_KEY_LOOKUP
        } else {
            config.key_lookup.as_str()
        };
        let extractors = parse_lookup(lookup)?;
        if extractors.is_empty() {
            return Err(KeyAuthError::NoExtractors(lookup.to_owned()));
        }
        Ok(Self {
            extractors,
            exclude_routes: config.exclude_routes,
            validator,
            error_handler: config.error_handler,
            continue_on_ignored_error: config.continue_on_ignored_error,
            patterns: config.pattern_cache,
        })
    }

    /// Wraps this handler for registration under [`DEFAULT_NAME`].
    pub fn into_entry(self) -> MiddlewareEntry {
        MiddlewareEntry::new(DEFAULT_NAME, self)
    }

    fn is_excluded(&self, signature: &str) -> bool {
        let cache = self.patterns.as_deref().unwrap_or_else(|| PatternCache::global());
        self.exclude_routes.iter().any(|pattern| cache.is_match(pattern, signature))
    }

    async fn authenticate(&self, ctx: &mut Context) {
        let signature = format!("{}{}", ctx.request().method(), ctx.request().path());
        if self.is_excluded(&signature) {
            debug!(route = %signature, "route excluded from key auth");
            ctx.next().await;
            return;
        }

        let mut attempts = Attempts::default();
        for extractor in &self.extractors {
            let candidates = match extractor.extract(ctx) {
                Ok(candidates) => candidates,
                Err(e) => {
                    attempts.extraction_failed(Box::new(e));
                    continue;
                }
            };
            for key in candidates.values() {
                match self.validator.validate(ctx, key, candidates.source()).await {
                    Ok(true) => {
                        ctx.next().await;
                        return;
                    }
                    Ok(false) => attempts.validation_failed(Box::new(AuthError::InvalidKey)),
                    Err(e) => attempts.validation_failed(e),
                }
            }
        }

        let (failure, cause) = attempts.into_failure();
        let handled = match (&self.error_handler, cause) {
            (Some(handler), Some(cause)) => match handler(ctx, cause) {
                Ok(()) => Handled::Suppressed,
                Err(e) => Handled::Replaced(e),
            },
            (_, cause) => Handled::Unhandled(cause),
        };

        match decide(failure, handled, self.continue_on_ignored_error) {
            Verdict::Continue => ctx.next().await,
            Verdict::Abort(err) => ctx.error(err),
            Verdict::Reject(failure, cause) => ctx.error(rejection(failure, cause)),
        }
    }
}

fn rejection(failure: Failure, cause: BoxError) -> HttpError {
    let base = match failure {
        Failure::Missing => HttpError::bad_request(),
        Failure::Invalid => HttpError::unauthorized(),
    };
    base.with_message(failure.marker().to_string()).with_internal(cause)
}

impl Handler for KeyAuth {
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, ()> {
        Box::pin(self.authenticate(ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Request;
    use bytes::Bytes;
    use http::StatusCode;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn accepting(expected: &'static str) -> KeyAuthConfig {
        KeyAuthConfig::new().validator(move |_: &mut Context, key: &str, _| {
            let ok = key == expected;
            Box::pin(async move { Ok(ok) })
        })
    }

    fn ctx(builder: http::request::Builder) -> Context {
        Context::from_request(Request::from(builder.body(Bytes::new()).unwrap()))
    }

    fn body(ctx: &mut Context) -> serde_json::Value {
        serde_json::from_slice(ctx.take_response().body()).unwrap()
    }

    #[test]
    fn setup_requires_a_validator() {
        assert!(matches!(KeyAuth::new(KeyAuthConfig::new()), Err(KeyAuthError::MissingValidator)));
    }

    #[test]
    fn setup_rejects_lookups_without_extractors() {
        let err = KeyAuth::new(accepting("k").key_lookup("cookie:session")).err();
        assert!(matches!(err, Some(KeyAuthError::NoExtractors(_))));

        let err = KeyAuth::new(accepting("k").key_lookup("header")).err();
        assert!(matches!(err, Some(KeyAuthError::InvalidLookup(_))));
    }

    #[test]
    fn blank_lookup_falls_back_to_bearer() {
        let auth = KeyAuth::new(accepting("k").key_lookup("  ")).unwrap();
        assert_eq!(auth.extractors.len(), 1);
        assert_eq!(auth.extractors[0].source(), ExtractorSource::Header);
    }

    #[tokio::test]
    async fn accepted_key_leaves_the_chain_running() {
        let auth = KeyAuth::new(accepting("abc")).unwrap();
        let mut c = ctx(http::Request::builder().header("authorization", "Bearer abc"));
        auth.call(&mut c).await;
        assert!(!c.is_aborted());
        assert!(c.response().is_none());
    }

    #[tokio::test]
    async fn missing_key_is_a_400() {
        let auth = KeyAuth::new(accepting("abc")).unwrap();
        let mut c = ctx(http::Request::builder());
        auth.call(&mut c).await;
        assert!(c.is_aborted());
        assert_eq!(c.response().unwrap().status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(body(&mut c)["message"], "missing key");
    }

    #[tokio::test]
    async fn refused_key_is_a_401() {
        let auth = KeyAuth::new(accepting("abc")).unwrap();
        let mut c = ctx(http::Request::builder().header("authorization", "Bearer nope"));
        auth.call(&mut c).await;
        assert_eq!(c.response().unwrap().status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(body(&mut c)["message"], "invalid key");
        assert_eq!(c.errors().len(), 1);
    }

    #[tokio::test]
    async fn later_extractor_can_succeed() {
        let auth = KeyAuth::new(accepting("q").key_lookup("header:X-Api-Key,query:api_key")).unwrap();
        let mut c = ctx(http::Request::builder().uri("/x?api_key=wrong&api_key=q"));
        auth.call(&mut c).await;
        assert!(!c.is_aborted());
    }

    #[tokio::test]
    async fn excluded_route_skips_validation() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);
        let auth = KeyAuth::new(
            KeyAuthConfig::new()
                .exclude_routes(["GET/health", "*/public/*"])
                .validator(move |_: &mut Context, _: &str, _| {
                    counted.fetch_add(1, Ordering::SeqCst);
                    Box::pin(async { Ok(false) })
                }),
        )
        .unwrap();

        let mut c = ctx(http::Request::builder().uri("/health"));
        auth.call(&mut c).await;
        assert!(!c.is_aborted());

        let mut c = ctx(http::Request::builder().method("POST").uri("/v1/public/docs"));
        auth.call(&mut c).await;
        assert!(!c.is_aborted());
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let mut c = ctx(http::Request::builder().method("POST").uri("/health"));
        auth.call(&mut c).await;
        assert!(c.is_aborted());
    }

    #[tokio::test]
    async fn exclusions_compile_into_the_configured_cache() {
        let cache = Arc::new(PatternCache::new());
        let auth = KeyAuth::new(
            accepting("abc")
                .exclude_routes(["GET/status", "GET/docs/*"])
                .pattern_cache(Arc::clone(&cache)),
        )
        .unwrap();

        let mut c = ctx(http::Request::builder().uri("/docs/intro"));
        auth.call(&mut c).await;
        assert!(!c.is_aborted());
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn non_ascii_bearer_token_reaches_the_validator() {
        let auth = KeyAuth::new(accepting("tök")).unwrap();
        let token = http::HeaderValue::from_bytes("Bearer tök".as_bytes()).unwrap();
        let mut c = ctx(http::Request::builder().header("authorization", token));
        auth.call(&mut c).await;
        assert!(!c.is_aborted());
    }

    #[tokio::test]
    async fn suppressed_error_continues_when_allowed() {
        let auth = KeyAuth::new(
            accepting("abc")
                .continue_on_ignored_error(true)
                .error_handler(|ctx: &mut Context, _| {
                    ctx.set("anonymous", "true");
                    Ok(())
                }),
        )
        .unwrap();
        let mut c = ctx(http::Request::builder());
        auth.call(&mut c).await;
        assert!(!c.is_aborted());
        assert_eq!(c.get_string("anonymous"), "true");
    }

    #[tokio::test]
    async fn suppressed_error_still_rejects_by_default() {
        let auth = KeyAuth::new(accepting("abc").error_handler(|_: &mut Context, _| Ok(()))).unwrap();
        let mut c = ctx(http::Request::builder().header("authorization", "Bearer bad"));
        auth.call(&mut c).await;
        assert_eq!(c.response().unwrap().status_code(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn replaced_error_is_used_as_is() {
        let auth = KeyAuth::new(accepting("abc").error_handler(|_: &mut Context, _| {
            Err(HttpError::forbidden().with_message("go away").into())
        }))
        .unwrap();
        let mut c = ctx(http::Request::builder().header("authorization", "Bearer bad"));
        auth.call(&mut c).await;
        assert_eq!(c.response().unwrap().status_code(), StatusCode::FORBIDDEN);
        assert_eq!(body(&mut c)["message"], "go away");
    }

    #[tokio::test]
    async fn validator_error_becomes_the_cause() {
        let auth = KeyAuth::new(KeyAuthConfig::new().validator(|_: &mut Context, _: &str, _| {
            Box::pin(async { Err::<bool, BoxError>("key store offline".into()) })
        }))
        .unwrap();
        let mut c = ctx(http::Request::builder().header("authorization", "Bearer x"));
        auth.call(&mut c).await;
        let recorded = &c.errors()[0];
        assert_eq!(recorded.status(), StatusCode::UNAUTHORIZED);
        assert!(recorded.to_string().contains("key store offline"));
    }
}
