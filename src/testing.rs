//! Test doubles shared by unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Response};

use crate::http::upstream::{Upstream, UpstreamError, UpstreamRequest};
use crate::load_balancer::BackendAddress;
use crate::registry::{MemoryRegistry, Registry, RegistryError};

/// One scripted backend reply.
#[derive(Debug, Clone)]
pub enum Reply {
    Status(u16),
    Json(u16, serde_json::Value),
    Refused,
    /// Never answers; only a deadline ends the call.
    Hang,
}

/// A call the fake received.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub backend: BackendAddress,
    pub method: Method,
    pub path: String,
    pub body: serde_json::Value,
}

/// [`Upstream`] that replays per-backend scripts, answering 200 once a
/// script runs dry.
#[derive(Debug, Default)]
pub struct ScriptedUpstream {
    scripts: Mutex<HashMap<BackendAddress, VecDeque<Reply>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedUpstream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, backend: &BackendAddress, replies: impl IntoIterator<Item = Reply>) {
        self.scripts
            .lock()
            .unwrap()
            .entry(backend.clone())
            .or_default()
            .extend(replies);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, backend: &BackendAddress) -> usize {
        self.calls().iter().filter(|c| &c.backend == backend).count()
    }
}

#[async_trait]
impl Upstream for ScriptedUpstream {
    async fn send(
        &self,
        backend: &BackendAddress,
        request: UpstreamRequest,
    ) -> Result<Response<Body>, UpstreamError> {
        self.calls.lock().unwrap().push(RecordedCall {
            backend: backend.clone(),
            method: request.method.clone(),
            path: request.path_and_query.clone(),
            body: serde_json::from_slice(&request.body).unwrap_or(serde_json::Value::Null),
        });

        let reply = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(backend)
            .and_then(|q| q.pop_front())
            .unwrap_or(Reply::Status(200));

        match reply {
            Reply::Status(status) => Ok(Response::builder()
                .status(status)
                .body(Body::from(backend.to_string()))
                .unwrap()),
            Reply::Json(status, value) => Ok(Response::builder()
                .status(status)
                .header("content-type", "application/json")
                .body(Body::from(value.to_string()))
                .unwrap()),
            Reply::Refused => Err(UpstreamError::Transport("connection refused".into())),
            Reply::Hang => std::future::pending().await,
        }
    }
}

/// [`MemoryRegistry`] that yields to the scheduler before every operation,
/// so concurrent callers interleave the way they do against a remote store.
#[derive(Debug, Default)]
pub struct YieldingRegistry {
    inner: MemoryRegistry,
}

impl YieldingRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Registry for YieldingRegistry {
    async fn list_range(&self, key: &str) -> Result<Vec<String>, RegistryError> {
        tokio::task::yield_now().await;
        self.inner.list_range(key).await
    }

    async fn list_push(&self, key: &str, value: &str) -> Result<(), RegistryError> {
        tokio::task::yield_now().await;
        self.inner.list_push(key, value).await
    }

    async fn list_remove(&self, key: &str, value: &str) -> Result<usize, RegistryError> {
        tokio::task::yield_now().await;
        self.inner.list_remove(key, value).await
    }

    async fn get(&self, key: &str) -> Result<Option<i64>, RegistryError> {
        tokio::task::yield_now().await;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: i64) -> Result<(), RegistryError> {
        tokio::task::yield_now().await;
        self.inner.set(key, value).await
    }

    async fn incr(&self, key: &str) -> Result<i64, RegistryError> {
        tokio::task::yield_now().await;
        self.inner.incr(key).await
    }

    async fn decr(&self, key: &str) -> Result<i64, RegistryError> {
        tokio::task::yield_now().await;
        self.inner.decr(key).await
    }

    async fn delete(&self, key: &str) -> Result<(), RegistryError> {
        tokio::task::yield_now().await;
        self.inner.delete(key).await
    }

    async fn take(&self, key: &str) -> Result<Option<i64>, RegistryError> {
        tokio::task::yield_now().await;
        self.inner.take(key).await
    }

    async fn set_with_expiry(
        &self,
        key: &str,
        value: i64,
        ttl: Duration,
    ) -> Result<(), RegistryError> {
        tokio::task::yield_now().await;
        self.inner.set_with_expiry(key, value, ttl).await
    }

    async fn exists(&self, key: &str) -> Result<bool, RegistryError> {
        tokio::task::yield_now().await;
        self.inner.exists(key).await
    }
}
