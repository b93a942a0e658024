//! JSON-RPC client for the discovery endpoint.
//!
//! `gatewayctl` uses it for registry edits and lookups; backend instances
//! self-register over gRPC (see `grpc.rs`).

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use thiserror::Error;
use url::Url;

use crate::discovery::rpc::*;

#[derive(Debug, Error)]
pub enum DiscoveryClientError {
    #[error("invalid discovery url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("discovery request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("discovery error {code}: {message}")]
    Rpc { code: i32, message: String },

    #[error("malformed discovery reply: {0}")]
    Malformed(String),

    #[error("gRPC transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("gRPC call failed: {0}")]
    Status(#[from] tonic::Status),
}

#[derive(Debug)]
pub struct DiscoveryClient {
    http: reqwest::Client,
    rpc_url: Url,
    status_url: Url,
    next_id: AtomicU64,
}

impl DiscoveryClient {
    /// `base` is the endpoint root, e.g. `http://discovery:50051`.
    pub fn new(base: &str) -> Result<Self, DiscoveryClientError> {
        let base = Url::parse(base)?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self {
            http,
            rpc_url: base.join("/rpc")?,
            status_url: base.join("/status")?,
            next_id: AtomicU64::new(1),
        })
    }

    pub async fn register(
        &self,
        name: &str,
        address: &str,
        port: u16,
    ) -> Result<RegisterResult, DiscoveryClientError> {
        self.call(
            METHOD_REGISTER,
            json!({"name": name, "address": address, "port": port}),
        )
        .await
    }

    pub async fn deregister(
        &self,
        name: &str,
        address: &str,
        port: u16,
    ) -> Result<RegisterResult, DiscoveryClientError> {
        self.call(
            METHOD_DEREGISTER,
            json!({"name": name, "address": address, "port": port}),
        )
        .await
    }

    pub async fn lookup(&self, name: &str) -> Result<LookupResult, DiscoveryClientError> {
        self.call(METHOD_LOOKUP, json!({ "name": name })).await
    }

    /// The endpoint's `/status` document.
    pub async fn status(&self) -> Result<Value, DiscoveryClientError> {
        let response = self.http.get(self.status_url.clone()).send().await?;
        Ok(response.error_for_status()?.json().await?)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, DiscoveryClientError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest::new(method, params, json!(id));

        let reply: JsonRpcResponse = self
            .http
            .post(self.rpc_url.clone())
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(error) = reply.error {
            return Err(DiscoveryClientError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        let result = reply
            .result
            .ok_or_else(|| DiscoveryClientError::Malformed("reply has no result".into()))?;
        serde_json::from_value(result).map_err(|e| DiscoveryClientError::Malformed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls() {
        let client = DiscoveryClient::new("http://discovery:50051").unwrap();
        assert_eq!(client.rpc_url.as_str(), "http://discovery:50051/rpc");
        assert_eq!(client.status_url.as_str(), "http://discovery:50051/status");
        assert!(DiscoveryClient::new("not a url").is_err());
    }
}
