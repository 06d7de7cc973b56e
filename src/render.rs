//! Named-view rendering contract.
//!
//! Template engines live outside this crate. Plug one in with
//! [`Engine::with_theme`](crate::Engine::with_theme) and handlers can call
//! [`Context::html`](crate::Context::html).

use serde_json::Value;

use crate::error::BoxError;

/// Resolves a view name to rendered markup.
pub trait Theme: Send + Sync + 'static {
    fn render(&self, name: &str, data: &Value) -> Result<String, BoxError>;
}
