//! Outbound calls to backend instances.
//!
//! # Responsibilities
//! - Define the request shape the orchestrator replays on every attempt
//! - Send it to one backend and hand back the streaming response
//!
//! # Design Decisions
//! - The body is buffered once so retries and failover can resend it
//! - No timeout here; the orchestrator owns the per-call deadline
//! - `Host` is left to the client, which derives it from the backend URI

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Method, Request, Response, Uri};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use thiserror::Error;

use crate::load_balancer::BackendAddress;

/// Failure to get any response out of a backend.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// The backend URI could not be built.
    #[error("invalid upstream uri: {0}")]
    InvalidUri(String),

    /// Connection refused, reset, or the exchange broke mid-way.
    #[error("upstream request failed: {0}")]
    Transport(String),
}

/// A request ready to be replayed against any backend.
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub method: Method,
    /// Path and query as the backend should see them.
    pub path_and_query: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl UpstreamRequest {
    pub fn new(method: Method, path_and_query: impl Into<String>) -> Self {
        Self {
            method,
            path_and_query: path_and_query.into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// JSON body with a matching content type.
    pub fn with_json(mut self, value: &serde_json::Value) -> Self {
        self.headers.insert(
            axum::http::header::CONTENT_TYPE,
            axum::http::HeaderValue::from_static("application/json"),
        );
        self.body = Bytes::from(value.to_string());
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Absolute URI of this request on `backend`.
    pub fn uri_for(&self, backend: &BackendAddress) -> Result<Uri, UpstreamError> {
        let base = backend
            .base_url()
            .map_err(|e| UpstreamError::InvalidUri(e.to_string()))?;
        let path = if self.path_and_query.starts_with('/') {
            self.path_and_query.clone()
        } else {
            format!("/{}", self.path_and_query)
        };
        format!("{}{}", base.as_str().trim_end_matches('/'), path)
            .parse::<Uri>()
            .map_err(|e| UpstreamError::InvalidUri(e.to_string()))
    }
}

/// Capability to perform one HTTP exchange with a backend.
#[async_trait]
pub trait Upstream: Send + Sync {
    async fn send(
        &self,
        backend: &BackendAddress,
        request: UpstreamRequest,
    ) -> Result<Response<Body>, UpstreamError>;
}

/// [`Upstream`] over a pooled hyper client.
#[derive(Clone)]
pub struct HyperUpstream {
    client: Client<HttpConnector, Body>,
}

impl HyperUpstream {
    pub fn new() -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self { client }
    }
}

impl Default for HyperUpstream {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Upstream for HyperUpstream {
    async fn send(
        &self,
        backend: &BackendAddress,
        request: UpstreamRequest,
    ) -> Result<Response<Body>, UpstreamError> {
        let uri = request.uri_for(backend)?;
        let mut builder = Request::builder().method(request.method).uri(uri);
        if let Some(headers) = builder.headers_mut() {
            *headers = request.headers;
        }
        let outbound = builder
            .body(Body::from(request.body))
            .map_err(|e| UpstreamError::InvalidUri(e.to_string()))?;

        let response: hyper::Response<hyper::body::Incoming> = self
            .client
            .request(outbound)
            .await
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;

        let (parts, body) = response.into_parts();
        Ok(Response::from_parts(parts, Body::new(body)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uri_for_backend() {
        let backend = BackendAddress::new("lobby-service", 8000);
        let req = UpstreamRequest::new(Method::GET, "/lobbies?limit=5");
        assert_eq!(
            req.uri_for(&backend).unwrap().to_string(),
            "http://lobby-service:8000/lobbies?limit=5"
        );

        let bare = UpstreamRequest::new(Method::GET, "trains");
        assert_eq!(
            bare.uri_for(&backend).unwrap().to_string(),
            "http://lobby-service:8000/trains"
        );
    }
}
