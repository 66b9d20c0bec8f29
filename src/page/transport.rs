//! Pluggable transport with an ordered interceptor chain.
//!
//! The last link of every chain is the real [`Transport`]; interceptors
//! decide whether a request ever reaches it.

use crate::models::{HttpResponse, OutboundRequest};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransportError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("network error: {0}")]
    Network(String),
}

pub type TransportResult = Result<HttpResponse, TransportError>;

/// Performs a request for real.
pub trait Transport: Send + Sync {
    fn send(&self, request: OutboundRequest) -> BoxFuture<'_, TransportResult>;
}

/// A link in the chain. Call `next.run(request)` to continue down the chain,
/// or return a response without calling it to short-circuit.
pub trait Interceptor: Send + Sync {
    fn name(&self) -> &str;

    fn intercept<'a>(
        &'a self,
        request: OutboundRequest,
        next: Next<'a>,
    ) -> BoxFuture<'a, TransportResult>;
}

/// The remainder of a chain.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    interceptors: &'a [Arc<dyn Interceptor>],
    transport: &'a dyn Transport,
}

impl<'a> Next<'a> {
    pub fn run(self, request: OutboundRequest) -> BoxFuture<'a, TransportResult> {
        match self.interceptors.split_first() {
            Some((head, rest)) => head.intercept(
                request,
                Next {
                    interceptors: rest,
                    transport: self.transport,
                },
            ),
            None => self.transport.send(request),
        }
    }
}

/// An immutable chain; installing an interceptor builds a new one.
pub struct TransportChain {
    interceptors: Vec<Arc<dyn Interceptor>>,
    transport: Arc<dyn Transport>,
}

impl TransportChain {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            interceptors: Vec::new(),
            transport,
        }
    }

    pub fn with_interceptor(&self, interceptor: Arc<dyn Interceptor>) -> Self {
        let mut interceptors = self.interceptors.clone();
        interceptors.push(interceptor);
        Self {
            interceptors,
            transport: Arc::clone(&self.transport),
        }
    }

    pub fn interceptor_names(&self) -> Vec<&str> {
        self.interceptors.iter().map(|i| i.name()).collect()
    }

    pub async fn execute(&self, request: OutboundRequest) -> TransportResult {
        Next {
            interceptors: &self.interceptors,
            transport: self.transport.as_ref(),
        }
        .run(request)
        .await
    }
}

/// Real network access through `reqwest`.
pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: Option<String>,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| TransportError::Network(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: None,
        })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            base_url: None,
        }
    }

    /// Origin used to resolve relative URLs such as `/api/users`.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn resolve_url(&self, url: &str) -> Result<String, TransportError> {
        let lower = url.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            return Ok(url.to_string());
        }
        let base = self.base_url.as_deref().ok_or_else(|| {
            TransportError::InvalidRequest(format!("relative URL without a base: {}", url))
        })?;
        let base = base.trim_end_matches('/');
        if url.starts_with('/') {
            Ok(format!("{}{}", base, url))
        } else {
            Ok(format!("{}/{}", base, url))
        }
    }

    async fn perform(&self, request: OutboundRequest) -> TransportResult {
        let url = self.resolve_url(&request.url)?;
        let method = request.method.to_http().map_err(|e| {
            TransportError::InvalidRequest(format!("method {}: {}", request.method, e))
        })?;
        let mut builder = self.client.request(method, &url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let status = response.status();
        let final_url = response.url().to_string();
        let mut headers = HashMap::new();
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                headers.insert(name.as_str().to_string(), value.to_string());
            }
        }
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        Ok(HttpResponse {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or("").to_string(),
            headers,
            body,
            url: final_url,
            synthetic: false,
        })
    }
}

impl Transport for ReqwestTransport {
    fn send(&self, request: OutboundRequest) -> BoxFuture<'_, TransportResult> {
        Box::pin(self.perform(request))
    }
}
