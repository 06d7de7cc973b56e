//! Incoming HTTP request type.

use std::net::SocketAddr;

use bytes::Bytes;
use http::{HeaderMap, Method, Uri, header};

/// An incoming HTTP request with its body fully read.
///
/// `Default` is an empty `GET /`; a pooled context holds one between
/// requests so nothing from the previous request survives a release.
#[derive(Debug, Default)]
pub struct Request {
    pub(crate) method: Method,
    pub(crate) uri: Uri,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
    pub(crate) params: Vec<(String, String)>,
    pub(crate) remote_addr: Option<SocketAddr>,
}

impl Request {
    pub fn from_parts(parts: http::request::Parts, body: Bytes, remote_addr: Option<SocketAddr>) -> Self {
        Self {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body,
            params: Vec::new(),
            remote_addr,
        }
    }

    pub fn method(&self) -> &Method { &self.method }
    pub fn uri(&self) -> &Uri { &self.uri }
    pub fn path(&self) -> &str { self.uri.path() }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }
    pub fn remote_addr(&self) -> Option<SocketAddr> { self.remote_addr }

    /// Case-insensitive header lookup. Non-UTF-8 values read as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn params(&self) -> &[(String, String)] { &self.params }

    /// Every value of query parameter `key`, in order of appearance.
    pub fn query_values(&self, key: &str) -> Vec<String> {
        let query = self.uri.query().unwrap_or_default();
        values_of(query.as_bytes(), key)
    }

    /// Every value of `key` in a `application/x-www-form-urlencoded` body.
    /// Any other content type has no form values.
    pub fn form_values(&self, key: &str) -> Vec<String> {
        let is_form = self.header(header::CONTENT_TYPE.as_str())
            .and_then(|ct| ct.split(';').next())
            .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/x-www-form-urlencoded"));
        if !is_form {
            return Vec::new();
        }
        values_of(&self.body, key)
    }
}

impl From<http::Request<Bytes>> for Request {
    fn from(req: http::Request<Bytes>) -> Self {
        let (parts, body) = req.into_parts();
        Self::from_parts(parts, body, None)
    }
}

fn values_of(encoded: &[u8], key: &str) -> Vec<String> {
    url::form_urlencoded::parse(encoded)
        .filter(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(uri: &str, content_type: Option<&str>, body: &'static str) -> Request {
        let mut b = http::Request::builder().method(Method::POST).uri(uri);
        if let Some(ct) = content_type {
            b = b.header(header::CONTENT_TYPE, ct);
        }
        Request::from(b.body(Bytes::from_static(body.as_bytes())).unwrap())
    }

    #[test]
    fn query_values_keep_order_and_decode() {
        let req = request("/x?key=a&other=1&key=b%20c", None, "");
        assert_eq!(req.query_values("key"), vec!["a", "b c"]);
        assert!(req.query_values("missing").is_empty());
    }

    #[test]
    fn form_values_require_urlencoded_body() {
        let req = request("/x", Some("application/x-www-form-urlencoded; charset=utf-8"), "key=one&key=two");
        assert_eq!(req.form_values("key"), vec!["one", "two"]);

        let json = request("/x", Some("application/json"), "key=one");
        assert!(json.form_values("key").is_empty());
    }

    #[test]
    fn default_request_is_empty() {
        let req = Request::default();
        assert_eq!(*req.method(), Method::GET);
        assert_eq!(req.path(), "/");
        assert!(req.headers().is_empty());
        assert!(req.params().is_empty());
    }
}
