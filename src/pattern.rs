//! Glob-style path patterns.
//!
//! A pattern is a literal path in which every `*` stands for "nothing, or one
//! or more arbitrary characters". `GET/admin/*` therefore matches
//! `GET/admin/` and `GET/admin/users/7`, but not `GET/adminx`. Matching is
//! anchored at both ends and case-insensitive.
//!
//! Compiled patterns are kept in a [`PatternCache`]. The cache only grows:
//! entries are never evicted. Patterns come from static configuration
//! (exclusion lists, route globs), so the key space is bounded by what the
//! operator wrote. Do not feed it request-derived patterns.

use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use regex::{Regex, RegexBuilder};

/// Compiled form of a glob pattern.
#[derive(Clone, Debug)]
pub struct Matcher {
    re: Arc<Regex>,
}

impl Matcher {
    /// Compiles `pattern` without touching any cache.
    pub fn compile(pattern: &str) -> Result<Self, regex::Error> {
        let mut expr = String::with_capacity(pattern.len() + 8);
        expr.push('^');
        for (i, literal) in pattern.split('*').enumerate() {
            if i > 0 {
                expr.push_str("(?:|.+)");
            }
            expr.push_str(&regex::escape(literal));
        }
        expr.push('$');

        let re = RegexBuilder::new(&expr)
            .case_insensitive(true)
            .dot_matches_new_line(true)
            .build()?;
        Ok(Self { re: Arc::new(re) })
    }

    pub fn is_match(&self, subject: &str) -> bool {
        self.re.is_match(subject)
    }
}

/// Append-only, concurrency-safe map from pattern text to its [`Matcher`].
#[derive(Debug, Default)]
pub struct PatternCache {
    compiled: DashMap<String, Matcher>,
}

impl PatternCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide cache used by [`match_path`].
    pub fn global() -> &'static PatternCache {
        static GLOBAL: OnceLock<PatternCache> = OnceLock::new();
        GLOBAL.get_or_init(PatternCache::new)
    }

    /// Returns the cached matcher for `pattern`, compiling it on first use.
    pub fn compile(&self, pattern: &str) -> Result<Matcher, regex::Error> {
        if let Some(m) = self.compiled.get(pattern) {
            return Ok(m.clone());
        }
        let matcher = Matcher::compile(pattern)?;
        // A concurrent first use may have inserted already; keep whichever won.
        let entry = self.compiled.entry(pattern.to_owned()).or_insert(matcher);
        Ok(entry.clone())
    }

    /// `true` when `subject` matches `pattern`. A pattern that fails to
    /// compile (only possible past the regex size limit) matches nothing.
    pub fn is_match(&self, pattern: &str, subject: &str) -> bool {
        match self.compile(pattern) {
            Ok(m) => m.is_match(subject),
            Err(e) => {
                tracing::warn!(pattern, error = %e, "path pattern could not be compiled");
                false
            }
        }
    }

    pub fn len(&self) -> usize {
        self.compiled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.compiled.is_empty()
    }
}

/// Matches `subject` against `pattern` using the process-wide cache.
pub fn match_path(pattern: &str, subject: &str) -> bool {
    PatternCache::global().is_match(pattern, subject)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_patterns_compare_case_insensitively() {
        let cache = PatternCache::new();
        assert!(cache.is_match("GET/health", "GET/health"));
        assert!(cache.is_match("GET/health", "get/HEALTH"));
        assert!(!cache.is_match("GET/health", "GET/health/"));
        assert!(!cache.is_match("GET/health", "GET/healthz"));
        assert!(!cache.is_match("GET/health", "POST/health"));
    }

    #[test]
    fn wildcard_matches_empty_or_anything() {
        let cache = PatternCache::new();
        assert!(cache.is_match("GET/admin/*", "GET/admin/anything"));
        assert!(cache.is_match("GET/admin/*", "GET/admin/"));
        assert!(cache.is_match("GET/admin/*", "GET/admin/a/b/c"));
        assert!(!cache.is_match("GET/admin/*", "GET/adminx"));
        assert!(!cache.is_match("GET/admin/*", "GET/admin"));
    }

    #[test]
    fn wildcard_in_the_middle_and_method_position() {
        let cache = PatternCache::new();
        assert!(cache.is_match("*/public/*.css", "GET/public/site.css"));
        assert!(cache.is_match("*/public/*.css", "HEAD/public/a/b.css"));
        assert!(!cache.is_match("*/public/*.css", "GET/public/site.js"));
    }

    #[test]
    fn regex_metacharacters_are_literal() {
        let cache = PatternCache::new();
        assert!(cache.is_match("GET/v1.0/(x)", "GET/v1.0/(x)"));
        assert!(!cache.is_match("GET/v1.0/(x)", "GET/v1x0/(x)"));
        assert!(cache.is_match("GET/a+b?", "get/A+B?"));
    }

    #[test]
    fn cache_grows_once_per_pattern() {
        let cache = PatternCache::new();
        assert!(cache.is_empty());
        cache.is_match("GET/a/*", "GET/a/b");
        cache.is_match("GET/a/*", "GET/a/c");
        cache.is_match("POST/b", "POST/b");
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn global_helper_uses_shared_cache() {
        assert!(match_path("GET/metrics*", "GET/metrics"));
        assert!(PatternCache::global().len() >= 1);
    }
}
