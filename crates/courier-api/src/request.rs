// ── Request descriptors ──
//
// The immutable description of one API call. Built by the caller (or a
// provider layer standing in for one), admitted to the queue as-is, and
// handed to the executor untouched.

use std::fmt;

use serde_json::Value;
use url::Url;
use uuid::Uuid;

/// Operation performed against the remote API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

/// Opaque identity of one request.
///
/// Only meaningful as a lookup key to the caller that created the request;
/// the pipeline never interprets it and never requires it to be unique.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ticket(Uuid);

impl Ticket {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for Ticket {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Immutable description of one API call.
///
/// Fully formed at creation. The payload is an opaque JSON value -- mapping
/// it to and from domain objects is the executor's (or a provider layer's)
/// concern, not the pipeline's.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub method: Method,
    pub url: Url,
    pub body: Option<Value>,
    pub ticket: Ticket,
}

impl RequestDescriptor {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            body: None,
            ticket: Ticket::new(),
        }
    }

    /// Attach a request payload.
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn method_renders_uppercase() {
        assert_eq!(Method::Get.to_string(), "GET");
        assert_eq!(Method::Delete.to_string(), "DELETE");
    }

    #[test]
    fn descriptor_keeps_assigned_fields() {
        let url = Url::parse("https://api.example.com/items/42").unwrap();
        let descriptor = RequestDescriptor::new(Method::Put, url.clone())
            .with_body(json!({ "title": "renamed" }));

        assert_eq!(descriptor.method, Method::Put);
        assert_eq!(descriptor.url, url);
        assert_eq!(descriptor.body, Some(json!({ "title": "renamed" })));
    }

    #[test]
    fn tickets_are_distinct_per_request() {
        let a = RequestDescriptor::new(
            Method::Get,
            Url::parse("https://api.example.com/a").unwrap(),
        );
        let b = RequestDescriptor::new(
            Method::Get,
            Url::parse("https://api.example.com/a").unwrap(),
        );
        assert_ne!(a.ticket, b.ticket);
    }
}
