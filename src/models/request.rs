//! Outbound requests and the responses handed back to page code.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// HTTP methods
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
    Connect,
    Trace,
    /// Any other valid method token, kept exactly as written (e.g. `PROPFIND`).
    Other(String),
}

impl HttpMethod {
    /// Convert from string (lossy: standard methods ignore case, other
    /// valid tokens are kept verbatim, anything else becomes GET)
    pub fn from_str_lossy(s: &str) -> Self {
        let s = s.trim();
        match s.to_uppercase().as_str() {
            "GET" => HttpMethod::Get,
            "POST" => HttpMethod::Post,
            "PUT" => HttpMethod::Put,
            "PATCH" => HttpMethod::Patch,
            "DELETE" => HttpMethod::Delete,
            "HEAD" => HttpMethod::Head,
            "OPTIONS" => HttpMethod::Options,
            "CONNECT" => HttpMethod::Connect,
            "TRACE" => HttpMethod::Trace,
            _ => match http::Method::from_bytes(s.as_bytes()) {
                Ok(_) => HttpMethod::Other(s.to_string()),
                Err(_) => {
                    tracing::debug!("Invalid HTTP method {:?}; using GET", s);
                    HttpMethod::Get
                }
            },
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Connect => "CONNECT",
            HttpMethod::Trace => "TRACE",
            HttpMethod::Other(token) => token,
        }
    }

    /// The method as the HTTP client expects it. Fails only for an `Other`
    /// token that is not a valid method name.
    pub fn to_http(&self) -> Result<http::Method, http::method::InvalidMethod> {
        http::Method::from_bytes(self.as_str().as_bytes())
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for HttpMethod {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(HttpMethod::from_str_lossy(s))
    }
}

/// The shapes page code may pass as a request target.
#[derive(Debug, Clone)]
pub enum UrlSource {
    Literal(String),
    Parsed(http::Uri),
    Request(OutboundRequest),
}

impl UrlSource {
    /// Canonical URL string used for matching.
    pub fn url(&self) -> String {
        match self {
            UrlSource::Literal(url) => url.clone(),
            UrlSource::Parsed(uri) => uri.to_string(),
            UrlSource::Request(request) => request.url.clone(),
        }
    }

    /// Normalize into a request, applying `init` on top of any request descriptor.
    pub fn into_request(self, init: RequestInit) -> OutboundRequest {
        let mut request = match self {
            UrlSource::Request(request) => request,
            other => OutboundRequest::new(HttpMethod::Get, other.url()),
        };
        if let Some(method) = init.method {
            request.method = method;
        }
        for (name, value) in init.headers {
            request.headers.insert(name, value);
        }
        if init.body.is_some() {
            request.body = init.body;
        }
        request
    }
}

impl From<&str> for UrlSource {
    fn from(url: &str) -> Self {
        UrlSource::Literal(url.to_string())
    }
}

impl From<String> for UrlSource {
    fn from(url: String) -> Self {
        UrlSource::Literal(url)
    }
}

impl From<http::Uri> for UrlSource {
    fn from(uri: http::Uri) -> Self {
        UrlSource::Parsed(uri)
    }
}

impl From<OutboundRequest> for UrlSource {
    fn from(request: OutboundRequest) -> Self {
        UrlSource::Request(request)
    }
}

/// Options accompanying a promise-style request.
#[derive(Debug, Clone, Default)]
pub struct RequestInit {
    pub method: Option<HttpMethod>,
    pub headers: HashMap<String, String>,
    pub body: Option<Bytes>,
}

/// A request as it travels through the transport chain.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Option<Bytes>,
}

impl OutboundRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HashMap::new(),
            body: None,
        }
    }
}

/// Response returned to page code, whether real or synthesized.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub status_text: String,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
    /// Final URL the response was produced for.
    pub url: String,
    /// True when the response never touched the network.
    pub synthetic: bool,
}

impl HttpResponse {
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::from_slice(&self.body)
    }
}
