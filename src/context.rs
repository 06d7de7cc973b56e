//! Per-request context.
//!
//! A [`Context`] is what every handler in a chain receives. It owns the
//! request, tracks the position in the chain, carries request-scoped values
//! and collects the response. Contexts are pooled (see [`ContextPool`]) and
//! reset between requests.
//!
//! [`ContextPool`]: crate::ContextPool

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use http::{HeaderName, StatusCode, header};
use serde::Serialize;

use crate::error::BoxError;
use crate::handler::{BoxedHandler, Chain};
use crate::http_error::{ErrorTransform, HttpError, transform_error};
use crate::render::Theme;
use crate::request::Request;
use crate::response::{IntoResponse, Response};

/// Any cursor at or past this value means the chain was aborted.
const ABORT_INDEX: usize = usize::MAX / 2;

/// Pipeline-wide settings every context of one pipeline shares.
pub(crate) struct Shared {
    pub(crate) debug: bool,
    pub(crate) transform: ErrorTransform,
    pub(crate) theme: Option<Arc<dyn Theme>>,
    pub(crate) forwarded_by_client_ip: bool,
    pub(crate) remote_ip_headers: Vec<HeaderName>,
    pub(crate) empty_chain: Chain,
}

impl Default for Shared {
    fn default() -> Self {
        Self {
            debug: false,
            transform: Arc::new(transform_error),
            theme: None,
            forwarded_by_client_ip: true,
            remote_ip_headers: vec![
                HeaderName::from_static("x-forwarded-for"),
                HeaderName::from_static("x-real-ip"),
            ],
            empty_chain: Arc::from(Vec::<BoxedHandler>::new()),
        }
    }
}

/// State for one request travelling through one chain.
pub struct Context {
    request: Request,
    chain: Chain,
    cursor: usize,
    values: HashMap<String, String>,
    extensions: http::Extensions,
    errors: Vec<HttpError>,
    response: Option<Response>,
    shared: Arc<Shared>,
}

impl Context {
    /// A stand-alone context outside any pipeline, with release-mode
    /// defaults and an empty chain. Useful for exercising handlers directly.
    pub fn from_request(request: Request) -> Self {
        let mut ctx = Self::blank(Arc::new(Shared::default()));
        ctx.request = request;
        ctx
    }

    pub(crate) fn blank(shared: Arc<Shared>) -> Self {
        Self {
            request: Request::default(),
            chain: Arc::clone(&shared.empty_chain),
            cursor: 0,
            values: HashMap::new(),
            extensions: http::Extensions::new(),
            errors: Vec::new(),
            response: None,
            shared,
        }
    }

    /// Binds this context to a live request and the chain it will run.
    pub(crate) fn bind(&mut self, request: Request, chain: Chain) {
        self.request = request;
        self.chain = chain;
        self.cursor = 0;
    }

    /// Drops everything tied to the last request, keeping allocations.
    pub(crate) fn reset(&mut self) {
        self.request = Request::default();
        self.chain = Arc::clone(&self.shared.empty_chain);
        self.cursor = 0;
        self.values.clear();
        self.extensions.clear();
        self.errors.clear();
        self.response = None;
    }

    // ── Chain control ─────────────────────────────────────────────────────────

    /// Runs the remaining handlers of the chain, in order, until one aborts.
    ///
    /// Code after `ctx.next().await` in a handler runs once everything
    /// downstream has finished.
    pub async fn next(&mut self) {
        while self.cursor < self.chain.len() {
            let handler = Arc::clone(&self.chain[self.cursor]);
            self.cursor += 1;
            handler.call(self).await;
        }
    }

    /// Stops the chain: no handler after the current one will run.
    pub fn abort(&mut self) {
        self.cursor = ABORT_INDEX;
    }

    pub fn is_aborted(&self) -> bool {
        self.cursor >= ABORT_INDEX
    }

    // ── Request access ────────────────────────────────────────────────────────

    pub fn request(&self) -> &Request { &self.request }
    pub fn request_mut(&mut self) -> &mut Request { &mut self.request }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.request.param(name)
    }

    pub fn query_array(&self, name: &str) -> Vec<String> {
        self.request.query_values(name)
    }

    pub fn post_form_array(&self, name: &str) -> Vec<String> {
        self.request.form_values(name)
    }

    /// The originating client address: the first valid IP found in the
    /// configured forwarding headers, else the peer address.
    pub fn client_ip(&self) -> Option<IpAddr> {
        if self.shared.forwarded_by_client_ip {
            for name in &self.shared.remote_ip_headers {
                let forwarded = self.request.headers.get(name).and_then(|v| v.to_str().ok());
                let found = forwarded
                    .into_iter()
                    .flat_map(|v| v.split(','))
                    .find_map(|ip| ip.trim().parse::<IpAddr>().ok());
                if found.is_some() {
                    return found;
                }
            }
        }
        self.request.remote_addr.map(|a| a.ip())
    }

    // ── Request-scoped values ─────────────────────────────────────────────────

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// The string stored under `key`, or `""`.
    pub fn get_string(&self, key: &str) -> &str {
        self.values.get(key).map(String::as_str).unwrap_or_default()
    }

    pub fn extensions(&self) -> &http::Extensions { &self.extensions }
    pub fn extensions_mut(&mut self) -> &mut http::Extensions { &mut self.extensions }

    pub fn is_debug(&self) -> bool { self.shared.debug }

    /// Errors recorded through [`Context::error`] during this request.
    pub fn errors(&self) -> &[HttpError] { &self.errors }

    // ── Response helpers ──────────────────────────────────────────────────────

    pub fn respond(&mut self, response: impl IntoResponse) {
        self.response = Some(response.into_response());
    }

    pub fn response(&self) -> Option<&Response> { self.response.as_ref() }

    pub(crate) fn take_response(&mut self) -> Response {
        self.response.take().unwrap_or_default()
    }

    /// Serializes `data` as the JSON body. A serialization failure becomes
    /// an error response instead.
    pub fn json<T: Serialize + ?Sized>(&mut self, status: StatusCode, data: &T) {
        match serde_json::to_vec(data) {
            Ok(body) => self.respond(Response::json(status, body)),
            Err(e) => self.error(e),
        }
    }

    pub fn text(&mut self, status: StatusCode, body: impl Into<String>) {
        self.respond(Response::text(status, body));
    }

    /// Renders the named view through the configured theme.
    pub fn html<T: Serialize + ?Sized>(&mut self, status: StatusCode, name: &str, data: &T) {
        let Some(theme) = self.shared.theme.clone() else {
            self.error("no theme configured for html rendering");
            return;
        };
        let rendered = serde_json::to_value(data)
            .map_err(BoxError::from)
            .and_then(|value| theme.render(name, &value));
        match rendered {
            Ok(body) => self.respond(Response::html(status, body)),
            Err(e) => self.error(e),
        }
    }

    /// `200 OK` with `data` as JSON.
    pub fn ok<T: Serialize + ?Sized>(&mut self, data: &T) {
        self.json(StatusCode::OK, data);
    }

    /// `201 Created`, with a `Location` header unless `location` is empty.
    pub fn created(&mut self, location: &str) {
        let mut builder = Response::builder().status(StatusCode::CREATED);
        if !location.is_empty() {
            builder = builder.header(header::LOCATION.as_str(), location);
        }
        self.respond(builder.no_body());
    }

    pub fn no_content(&mut self) {
        self.respond(StatusCode::NO_CONTENT);
    }

    pub fn bad_request(&mut self, err: impl Into<BoxError>) {
        self.error(HttpError::bad_request().with_internal(err));
    }

    pub fn unauthorized(&mut self, err: impl Into<BoxError>) {
        self.error(HttpError::unauthorized().with_internal(err));
    }

    pub fn forbidden(&mut self, err: impl Into<BoxError>) {
        self.error(HttpError::forbidden().with_internal(err));
    }

    /// Normalizes `err` through the pipeline's error transform, records it
    /// for the diagnostic logger, and aborts with the envelope as the body.
    pub fn error(&mut self, err: impl Into<BoxError>) {
        let envelope = (self.shared.transform)(err.into());
        self.errors.push(envelope.clone());
        self.abort_with_error(envelope);
    }

    /// Aborts with `err` rendered as the body, without recording it.
    pub fn abort_with_error(&mut self, err: HttpError) {
        let body = err.to_json(self.shared.debug);
        self.respond(Response::json(err.status(), body));
        self.abort();
    }
}
