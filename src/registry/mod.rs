//! Service registry subsystem.
//!
//! # Data Flow
//! ```text
//! discovery (register) ──▶ ServiceRegistry ──▶ Registry (memory | redis)
//!                              ▲    ▲
//!        load_balancer (read) ─┘    └─ circuit_breaker (remove / restore)
//! ```
//!
//! # Design Decisions
//! - All cross-request routing state lives behind the [`Registry`] key-value
//!   trait so several gateway instances can share one store
//! - Single-key operations are atomic; multi-key sequences are not
//!   transactional, callers treat them as best-effort
//! - [`ServiceRegistry`] owns the key layout; nothing else builds keys

pub mod memory;
pub mod redis_store;
pub mod service;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{RegistryBackend, RegistryConfig};

pub use memory::MemoryRegistry;
pub use redis_store::RedisRegistry;
pub use service::{Registration, ServiceRegistry};

/// Errors raised by registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// No backend is registered for the service.
    #[error("service {0} is not available")]
    ServiceNotAvailable(String),

    /// A stored or submitted address is not `host:port`.
    #[error("invalid backend address: {0}")]
    InvalidAddress(String),

    /// A key holds a value of the wrong type.
    #[error("key {key} holds an unexpected value")]
    WrongType { key: String },

    /// The underlying store failed.
    #[error("registry backend error: {0}")]
    Backend(String),
}

/// Key-value operations the gateway needs from a shared store.
#[async_trait]
pub trait Registry: Send + Sync + std::fmt::Debug {
    /// All elements of a list, in order. Missing key reads as empty.
    async fn list_range(&self, key: &str) -> Result<Vec<String>, RegistryError>;

    /// Append to the tail of a list.
    async fn list_push(&self, key: &str, value: &str) -> Result<(), RegistryError>;

    /// Remove every occurrence of `value`; returns how many were removed.
    async fn list_remove(&self, key: &str, value: &str) -> Result<usize, RegistryError>;

    async fn get(&self, key: &str) -> Result<Option<i64>, RegistryError>;

    async fn set(&self, key: &str, value: i64) -> Result<(), RegistryError>;

    /// Increment by one, creating the key at zero first. Returns the new value.
    async fn incr(&self, key: &str) -> Result<i64, RegistryError>;

    /// Decrement by one, creating the key at zero first. Returns the new value.
    async fn decr(&self, key: &str) -> Result<i64, RegistryError>;

    async fn delete(&self, key: &str) -> Result<(), RegistryError>;

    /// Read a counter and delete it in one step, so no increment landing
    /// between the two is lost.
    async fn take(&self, key: &str) -> Result<Option<i64>, RegistryError>;

    /// Set a value that disappears after `ttl`.
    async fn set_with_expiry(&self, key: &str, value: i64, ttl: Duration)
        -> Result<(), RegistryError>;

    async fn exists(&self, key: &str) -> Result<bool, RegistryError>;
}

/// Build the configured registry store.
pub async fn connect(config: &RegistryConfig) -> Result<Arc<dyn Registry>, RegistryError> {
    match config.backend {
        RegistryBackend::Memory => {
            tracing::info!("Using in-process registry");
            Ok(Arc::new(MemoryRegistry::new()))
        }
        RegistryBackend::Redis => {
            let registry = RedisRegistry::connect(&config.url).await?;
            tracing::info!(url = %config.url, "Connected to redis registry");
            Ok(Arc::new(registry))
        }
    }
}
