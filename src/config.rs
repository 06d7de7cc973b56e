//! Pipeline configuration and the config-source contract.
//!
//! ```toml
//! [http]
//! mode = "debug"
//! middleware = ["keyauth"]
//! handle_method_not_allowed = true
//!
//! [http.static]
//! "/assets" = "./public"
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::error::Error;

/// Section key the engine reads its [`Config`] from.
pub const CONFIG_KEY: &str = "http";

/// Serving mode. Only `debug` changes behaviour: error envelopes then carry
/// a `developer_message` with the internal cause.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Debug,
    #[default]
    Release,
    Test,
}

/// Settings for an [`Engine`](crate::Engine).
///
/// Fields the pipeline does not act on itself are kept so hosts can read
/// them back through [`Engine::config`](crate::Engine::config).
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    pub mode: Mode,
    /// URL prefix → filesystem root.
    #[serde(rename = "static")]
    pub static_dirs: BTreeMap<String, String>,
    /// Global middleware names, outermost first.
    pub middleware: Vec<String>,
    pub redirect_trailing_slash: bool,
    pub redirect_fixed_path: bool,
    pub handle_method_not_allowed: bool,
    pub forwarded_by_client_ip: bool,
    pub remote_ip_headers: Vec<String>,
    pub trusted_platform: String,
    pub use_raw_path: bool,
    pub unescape_path_values: bool,
    pub remove_extra_slash: bool,
    pub context_with_fallback: bool,
    /// Largest request body the server buffers; bigger bodies get 413.
    pub max_multipart_memory: u64,
    pub enable_decoder_use_number: bool,
    pub enable_decoder_disallow_unknown_fields: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: Mode::Release,
            static_dirs: BTreeMap::new(),
            middleware: Vec::new(),
            redirect_trailing_slash: true,
            redirect_fixed_path: false,
            handle_method_not_allowed: false,
            forwarded_by_client_ip: true,
            remote_ip_headers: vec!["X-Forwarded-For".to_owned(), "X-Real-IP".to_owned()],
            trusted_platform: String::new(),
            use_raw_path: false,
            unescape_path_values: true,
            remove_extra_slash: false,
            context_with_fallback: false,
            max_multipart_memory: 32 << 20,
            enable_decoder_use_number: false,
            enable_decoder_disallow_unknown_fields: false,
        }
    }
}

impl Config {
    pub fn is_debug(&self) -> bool {
        self.mode == Mode::Debug
    }
}

/// A source of configuration sections.
pub trait Configurer {
    fn has(&self, key: &str) -> bool;
    fn unmarshal_key<T: DeserializeOwned>(&self, key: &str) -> Result<T, Error>;
}

/// A [`Configurer`] over a parsed TOML document. Keys may be dotted
/// (`"http.keyauth"`) to reach nested tables.
#[derive(Clone, Debug, Default)]
pub struct TomlConfig {
    root: toml::Table,
}

impl TomlConfig {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, Error> {
        std::fs::read_to_string(path)?.parse()
    }

    fn lookup(&self, key: &str) -> Option<&toml::Value> {
        let mut parts = key.split('.');
        let mut value = self.root.get(parts.next()?)?;
        for part in parts {
            value = value.as_table()?.get(part)?;
        }
        Some(value)
    }
}

impl FromStr for TomlConfig {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self { root: toml::from_str(s)? })
    }
}

impl Configurer for TomlConfig {
    fn has(&self, key: &str) -> bool {
        self.lookup(key).is_some()
    }

    fn unmarshal_key<T: DeserializeOwned>(&self, key: &str) -> Result<T, Error> {
        let value = self.lookup(key).ok_or_else(|| Error::Config(format!("missing key `{key}`")))?;
        Ok(T::deserialize(value.clone())?)
    }
}
