//! The abstract request surface consumed from the host framework.

use std::collections::HashMap;

use serde_json::Value;

/// What the verifier needs from a host request: read a named header,
/// query parameter, route parameter, or cookie, and write one named slot
/// for downstream handlers. Nothing else about the host is assumed.
pub trait RequestContext: Send {
    /// Value of a named request header.
    fn header(&self, name: &str) -> Option<String>;

    /// Value of a named query-string parameter.
    fn query(&self, name: &str) -> Option<String>;

    /// Value of a named route parameter. Route parameters only exist in
    /// routed frameworks; adapters over plain HTTP requests return `None`.
    fn route_param(&self, name: &str) -> Option<String>;

    /// Value of a named cookie.
    fn cookie(&self, name: &str) -> Option<String>;

    /// Publish a value for downstream handlers under `key`.
    fn set(&mut self, key: &str, value: Value);
}

/// [`RequestContext`] view over [`http::request::Parts`].
///
/// Slot writes are collected locally so the middleware can move them into
/// request extensions once verification has succeeded.
pub struct HttpRequestContext<'a> {
    parts: &'a http::request::Parts,
    slots: HashMap<String, Value>,
}

impl<'a> HttpRequestContext<'a> {
    /// Wrap borrowed request parts.
    pub fn new(parts: &'a http::request::Parts) -> Self {
        Self {
            parts,
            slots: HashMap::new(),
        }
    }

    /// The slot writes accumulated during verification.
    pub fn into_slots(self) -> HashMap<String, Value> {
        self.slots
    }
}

impl RequestContext for HttpRequestContext<'_> {
    fn header(&self, name: &str) -> Option<String> {
        self.parts
            .headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned)
    }

    fn query(&self, name: &str) -> Option<String> {
        let query = self.parts.uri.query()?;
        for pair in query.split('&') {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            if key == name {
                return Some(value.to_owned());
            }
        }
        None
    }

    fn route_param(&self, _name: &str) -> Option<String> {
        None
    }

    fn cookie(&self, name: &str) -> Option<String> {
        let header = self
            .parts
            .headers
            .get(http::header::COOKIE)?
            .to_str()
            .ok()?;
        for pair in header.split(';') {
            if let Some((key, value)) = pair.trim().split_once('=') {
                if key == name {
                    return Some(value.to_owned());
                }
            }
        }
        None
    }

    fn set(&mut self, key: &str, value: Value) {
        self.slots.insert(key.to_owned(), value);
    }
}
