//! Unified error type.

use crate::middleware::keyauth::KeyAuthError;

/// A boxed, thread-safe error. Handlers, validators and error handlers
/// exchange failures in this shape.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The error type returned by plait's fallible setup operations.
///
/// Application-level errors (400, 401, 422, etc.) are expressed as
/// [`HttpError`](crate::HttpError) envelopes, not as `Error`s. This type
/// surfaces startup failures: decoding configuration, building middleware,
/// binding to a port or accepting a connection.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid socket address `{0}`")]
    Addr(String),

    /// The configuration section this component reads from is absent.
    #[error("configuration section `{0}` is not present")]
    Disabled(String),

    #[error("config: {0}")]
    Config(String),

    #[error(transparent)]
    KeyAuth(#[from] KeyAuthError),
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Self::Config(e.to_string())
    }
}
