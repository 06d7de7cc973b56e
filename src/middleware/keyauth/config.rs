use std::fmt;
use std::sync::Arc;

use serde::Deserialize;

use super::extractor::ExtractorSource;
use crate::context::Context;
use crate::error::BoxError;
use crate::handler::BoxFuture;
use crate::pattern::PatternCache;

/// Lookup used when none is configured.
pub const DEFAULT_KEY_LOOKUP: &str = "header:Authorization:Bearer ";

/// Decides whether a candidate credential is acceptable.
///
/// `Ok(false)` and `Err(_)` both reject the candidate; the error (or an
/// "invalid key" marker for `Ok(false)`) becomes the rejection cause if no
/// later candidate succeeds.
pub trait Validator: Send + Sync + 'static {
    fn validate<'a>(
        &'a self,
        ctx: &'a mut Context,
        key: &'a str,
        source: ExtractorSource,
    ) -> BoxFuture<'a, Result<bool, BoxError>>;
}

impl<F> Validator for F
where
    F: for<'a> Fn(&'a mut Context, &'a str, ExtractorSource) -> BoxFuture<'a, Result<bool, BoxError>>
        + Send
        + Sync
        + 'static,
{
    fn validate<'a>(
        &'a self,
        ctx: &'a mut Context,
        key: &'a str,
        source: ExtractorSource,
    ) -> BoxFuture<'a, Result<bool, BoxError>> {
        self(ctx, key, source)
    }
}

/// Maps the final failure to `Ok(())` (suppress it) or a replacement
/// error to abort with.
pub type ErrorHandler = Arc<dyn Fn(&mut Context, BoxError) -> Result<(), BoxError> + Send + Sync>;

/// Settings for [`KeyAuth`](super::KeyAuth).
///
/// The lookup, exclusions and continue flag can come from a config file;
/// the validator and error handler are always set in code.
///
/// ```toml
/// key_lookup = "header:X-Api-Key,query:api_key"
/// exclude_routes = ["GET/health", "*/public/*"]
/// continue_on_ignored_error = false
/// ```
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct KeyAuthConfig {
    pub(crate) key_lookup: String,
    pub(crate) exclude_routes: Vec<String>,
    pub(crate) continue_on_ignored_error: bool,
    #[serde(skip)]
    pub(crate) validator: Option<Arc<dyn Validator>>,
    #[serde(skip)]
    pub(crate) error_handler: Option<ErrorHandler>,
    #[serde(skip)]
    pub(crate) pattern_cache: Option<Arc<PatternCache>>,
}

impl Default for KeyAuthConfig {
    fn default() -> Self {
        Self {
            key_lookup: DEFAULT_KEY_LOOKUP.to_owned(),
            exclude_routes: Vec::new(),
            continue_on_ignored_error: false,
            validator: None,
            error_handler: None,
            pattern_cache: None,
        }
    }
}

impl KeyAuthConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Comma-separated `source:name[:prefix]` entries, tried in order.
    /// Sources: `header`, `query`, `path`, `form`, `context-value` (or `ctx`).
    pub fn key_lookup(mut self, lookup: impl Into<String>) -> Self {
        self.key_lookup = lookup.into();
        self
    }

    /// Wildcard patterns matched against `METHOD + path`, e.g. `GET/health`.
    pub fn exclude_routes<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_routes = patterns.into_iter().map(Into::into).collect();
        self
    }

    pub fn continue_on_ignored_error(mut self, yes: bool) -> Self {
        self.continue_on_ignored_error = yes;
        self
    }

    pub fn validator<F>(mut self, f: F) -> Self
    where
        F: for<'a> Fn(&'a mut Context, &'a str, ExtractorSource) -> BoxFuture<'a, Result<bool, BoxError>>
            + Send
            + Sync
            + 'static,
    {
        self.validator = Some(Arc::new(f));
        self
    }

    /// Uses an existing [`Validator`] implementation.
    pub fn with_validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn error_handler<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Context, BoxError) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.error_handler = Some(Arc::new(f));
        self
    }

    /// Compiles exclusion patterns into `cache` instead of
    /// [`PatternCache::global`].
    pub fn pattern_cache(mut self, cache: Arc<PatternCache>) -> Self {
        self.pattern_cache = Some(cache);
        self
    }
}

impl fmt::Debug for KeyAuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyAuthConfig")
            .field("key_lookup", &self.key_lookup)
            .field("exclude_routes", &self.exclude_routes)
            .field("continue_on_ignored_error", &self.continue_on_ignored_error)
            .field("validator", &self.validator.is_some())
            .field("error_handler", &self.error_handler.is_some())
            .field("pattern_cache", &self.pattern_cache.as_ref().map(|c| c.len()))
            .finish()
    }
}
