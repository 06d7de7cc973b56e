//! The error envelope sent to clients and the transform that produces it.
//!
//! Every failure on the request path ends up as an [`HttpError`]. On the wire
//! it looks like this:
//!
//! ```json
//! { "code": 422, "message": "Unprocessable Entity", "data": [ ... ], "developer_message": "..." }
//! ```
//!
//! `data` is omitted when empty. `developer_message` carries the internal
//! cause and is only emitted in debug mode.

use std::fmt;
use std::sync::Arc;

use http::StatusCode;
use serde::Serialize;
use serde_json::Value;

use crate::error::BoxError;

type SharedCause = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// An application error: status, client-facing message, optional structured
/// data and an optional internal cause kept for logging.
#[derive(Clone, Debug)]
pub struct HttpError {
    status: StatusCode,
    message: String,
    data: Option<Value>,
    internal: Option<SharedCause>,
}

impl HttpError {
    /// Envelope for `status` with its canonical reason as the message.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            message: status.canonical_reason().unwrap_or_default().to_owned(),
            data: None,
            internal: None,
        }
    }

    pub fn bad_request() -> Self { Self::new(StatusCode::BAD_REQUEST) }
    pub fn unauthorized() -> Self { Self::new(StatusCode::UNAUTHORIZED) }
    pub fn forbidden() -> Self { Self::new(StatusCode::FORBIDDEN) }
    pub fn not_found() -> Self { Self::new(StatusCode::NOT_FOUND) }
    pub fn method_not_allowed() -> Self { Self::new(StatusCode::METHOD_NOT_ALLOWED) }
    pub fn conflict() -> Self { Self::new(StatusCode::CONFLICT) }
    pub fn unprocessable_entity() -> Self { Self::new(StatusCode::UNPROCESSABLE_ENTITY) }
    pub fn internal_server_error() -> Self { Self::new(StatusCode::INTERNAL_SERVER_ERROR) }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Replaces the internal cause.
    pub fn with_internal(mut self, err: impl Into<BoxError>) -> Self {
        let err: BoxError = err.into();
        self.internal = Some(Arc::from(err));
        self
    }

    /// Adds a cause, joining it to any existing one as `"first; second"`.
    pub fn add_internal(mut self, err: impl Into<BoxError>) -> Self {
        let err: BoxError = err.into();
        let next: SharedCause = Arc::from(err);
        self.internal = Some(match self.internal.take() {
            None => next,
            Some(prev) => Arc::new(Joined(prev, next)),
        });
        self
    }

    pub fn status(&self) -> StatusCode { self.status }
    pub fn message(&self) -> &str { &self.message }
    pub fn data(&self) -> Option<&Value> { self.data.as_ref() }

    pub fn internal(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        self.internal.as_deref()
    }

    /// Serializes the client-facing body. The internal cause is included as
    /// `developer_message` only when `debug` is set.
    pub fn to_json(&self, debug: bool) -> Vec<u8> {
        let body = Envelope {
            code: self.status.as_u16(),
            message: &self.message,
            data: self.data.as_ref(),
            developer_message: if debug {
                self.internal.as_ref().map(ToString::to_string)
            } else {
                None
            },
        };
        // A Value tree and plain strings cannot fail to serialize.
        serde_json::to_vec(&body).unwrap_or_default()
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "code={}, message={}", self.status.as_u16(), self.message)?;
        if let Some(data) = &self.data {
            write!(f, ", data={data}")?;
        }
        if let Some(internal) = &self.internal {
            write!(f, ", internal={internal}")?;
        }
        Ok(())
    }
}

impl std::error::Error for HttpError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.internal.as_deref().map(|e| e as &(dyn std::error::Error + 'static))
    }
}

#[derive(Serialize)]
struct Envelope<'a> {
    code: u16,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    developer_message: Option<String>,
}

#[derive(Debug)]
struct Joined(SharedCause, SharedCause);

impl fmt::Display for Joined {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}; {}", self.0, self.1)
    }
}

impl std::error::Error for Joined {}

// ── Field validation ──────────────────────────────────────────────────────────

/// One failed field check.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FieldError {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub field: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub tag: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub value: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, tag: impl Into<String>, value: impl Into<String>) -> Self {
        let field = field.into();
        let tag = tag.into();
        let message = format!("field `{field}` failed on the `{tag}` rule");
        Self { field, tag, value: value.into(), message, ..Self::default() }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }
}

/// A structured validation failure over several fields. The default
/// transform turns it into a 422 whose `data` is the field list.
#[derive(Clone, Debug, Default, thiserror::Error)]
#[error("validation failed on {} field(s)", .0.len())]
pub struct ValidationErrors(pub Vec<FieldError>);

// ── Transform ─────────────────────────────────────────────────────────────────

/// Replaceable error normalizer, see [`Engine::with_error_transform`](crate::Engine::with_error_transform).
pub type ErrorTransform = Arc<dyn Fn(BoxError) -> HttpError + Send + Sync + 'static>;

/// Maps any failure into an envelope:
///
/// - an [`HttpError`] passes through unchanged,
/// - [`ValidationErrors`] become a 422 carrying the field list,
/// - anything else becomes a 500.
///
/// The original error is kept as the internal cause in the last two cases.
pub fn transform_error(err: BoxError) -> HttpError {
    let err = match err.downcast::<HttpError>() {
        Ok(e) => return *e,
        Err(err) => err,
    };

    match err.downcast::<ValidationErrors>() {
        Ok(v) => {
            let data = serde_json::to_value(&v.0).unwrap_or(Value::Null);
            HttpError::unprocessable_entity().with_data(data).with_internal(*v)
        }
        Err(err) => HttpError::internal_server_error().with_internal(err),
    }
}
