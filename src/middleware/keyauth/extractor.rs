//! Credential extraction.
//!
//! A key lookup string such as `header:Authorization:Bearer ,query:api_key`
//! becomes an ordered list of [`Extractor`]s. Each one reads candidate
//! values from a single place in the request.

use std::fmt;
use std::str::FromStr;

use http::HeaderName;
use tracing::warn;

use super::KeyAuthError;
use crate::context::Context;

/// Most values a header extractor returns for one request.
pub const EXTRACTOR_LIMIT: usize = 20;

/// Where a credential was read from.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ExtractorSource {
    Header,
    Query,
    Path,
    Form,
    ContextValue,
}

impl ExtractorSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Header       => "header",
            Self::Query        => "query",
            Self::Path         => "path",
            Self::Form         => "form",
            Self::ContextValue => "context-value",
        }
    }
}

/// Parses a lookup source token. `ctx` is accepted as a short form of
/// `context-value`.
impl FromStr for ExtractorSource {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "header"               => Ok(Self::Header),
            "query"                => Ok(Self::Query),
            "path"                 => Ok(Self::Path),
            "form"                 => Ok(Self::Form),
            "context-value" | "ctx" => Ok(Self::ContextValue),
            _                      => Err(()),
        }
    }
}

impl fmt::Display for ExtractorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an extractor produced nothing.
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
pub enum ExtractError {
    #[error("missing value in request header")]
    HeaderMissing,
    #[error("invalid value in request header")]
    HeaderInvalid,
    #[error("missing value in query string")]
    QueryMissing,
    #[error("missing value in path params")]
    PathMissing,
    #[error("missing value in form")]
    FormMissing,
    #[error("missing value in context")]
    ContextValueMissing,
}

impl ExtractError {
    pub fn origin(self) -> ExtractorSource {
        match self {
            Self::HeaderMissing | Self::HeaderInvalid => ExtractorSource::Header,
            Self::QueryMissing        => ExtractorSource::Query,
            Self::PathMissing         => ExtractorSource::Path,
            Self::FormMissing         => ExtractorSource::Form,
            Self::ContextValueMissing => ExtractorSource::ContextValue,
        }
    }
}

/// The non-empty list of values one extractor found, in request order.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Candidates {
    source: ExtractorSource,
    values: Vec<String>,
}

impl Candidates {
    pub fn source(&self) -> ExtractorSource { self.source }
    pub fn values(&self) -> &[String] { &self.values }
}

/// Reads credential candidates from one request location.
#[derive(Clone, Debug)]
pub enum Extractor {
    /// All occurrences of a header, optionally required to start with
    /// `prefix` (compared case-insensitively and stripped).
    Header { name: HeaderName, prefix: String },
    Query(String),
    Path(String),
    Form(String),
    ContextValue(String),
}

impl Extractor {
    pub fn header(name: &str, prefix: &str) -> Result<Self, KeyAuthError> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| KeyAuthError::InvalidHeaderName(name.to_owned()))?;
        Ok(Self::Header { name, prefix: prefix.to_owned() })
    }

    pub fn source(&self) -> ExtractorSource {
        match self {
            Self::Header { .. }   => ExtractorSource::Header,
            Self::Query(_)        => ExtractorSource::Query,
            Self::Path(_)         => ExtractorSource::Path,
            Self::Form(_)         => ExtractorSource::Form,
            Self::ContextValue(_) => ExtractorSource::ContextValue,
        }
    }

    pub fn extract(&self, ctx: &Context) -> Result<Candidates, ExtractError> {
        let source = self.source();
        let values = match self {
            Self::Header { name, prefix } => from_header(ctx, name, prefix)?,
            Self::Query(name) => non_empty(ctx.query_array(name), ExtractError::QueryMissing)?,
            Self::Form(name) => non_empty(ctx.post_form_array(name), ExtractError::FormMissing)?,
            Self::Path(name) => match ctx.param(name) {
                Some(v) if !v.is_empty() => vec![v.to_owned()],
                _ => return Err(ExtractError::PathMissing),
            },
            Self::ContextValue(name) => match ctx.get_string(name) {
                "" => return Err(ExtractError::ContextValueMissing),
                v => vec![v.to_owned()],
            },
        };
        Ok(Candidates { source, values })
    }
}

fn non_empty(values: Vec<String>, missing: ExtractError) -> Result<Vec<String>, ExtractError> {
    if values.is_empty() { Err(missing) } else { Ok(values) }
}

fn from_header(ctx: &Context, name: &HeaderName, prefix: &str) -> Result<Vec<String>, ExtractError> {
    let occurrences = ctx.request().headers().get_all(name);
    if occurrences.iter().next().is_none() {
        return Err(ExtractError::HeaderMissing);
    }

    let mut values = Vec::new();
    for raw in occurrences {
        // Values may carry obs-text; keep them as sent.
        let value = String::from_utf8_lossy(raw.as_bytes());
        if prefix.is_empty() {
            values.push(value.into_owned());
        } else if let Some(rest) = strip_prefix_ignore_case(&value, prefix) {
            values.push(rest.to_owned());
        }
        if values.len() == EXTRACTOR_LIMIT {
            break;
        }
    }

    if values.is_empty() {
        return Err(if prefix.is_empty() {
            ExtractError::HeaderMissing
        } else {
            ExtractError::HeaderInvalid
        });
    }
    Ok(values)
}

fn strip_prefix_ignore_case<'v>(value: &'v str, prefix: &str) -> Option<&'v str> {
    let head = value.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &value[prefix.len()..])
}

/// Parses a comma-separated list of `source:name` / `source:name:prefix`
/// entries, keeping their order.
///
/// An entry without a name is an error. Unknown sources are skipped with a
/// warning; callers decide whether an empty result is acceptable.
pub fn parse_lookup(lookup: &str) -> Result<Vec<Extractor>, KeyAuthError> {
    let mut extractors = Vec::new();
    for entry in lookup.split(',') {
        let mut parts = entry.splitn(3, ':');
        let (Some(source), Some(name)) = (parts.next(), parts.next()) else {
            return Err(KeyAuthError::InvalidLookup(entry.to_owned()));
        };
        let (source, name) = (source.trim(), name.trim());
        let prefix = parts.next().unwrap_or_default();

        let extractor = match source.parse::<ExtractorSource>() {
            Ok(ExtractorSource::Header)       => Extractor::header(name, prefix)?,
            Ok(ExtractorSource::Query)        => Extractor::Query(name.to_owned()),
            Ok(ExtractorSource::Path)         => Extractor::Path(name.to_owned()),
            Ok(ExtractorSource::Form)         => Extractor::Form(name.to_owned()),
            Ok(ExtractorSource::ContextValue) => Extractor::ContextValue(name.to_owned()),
            Err(()) => {
                warn!(source, entry, "unknown key lookup source, skipping");
                continue;
            }
        };
        extractors.push(extractor);
    }
    Ok(extractors)
}
