//! Backend abstraction.
//!
//! # Responsibilities
//! - Represent a single backend instance as a `host:port` address
//! - Track in-flight attempts (for Least Connections LB) through a guard
//!
//! # Design Decisions
//! - The address string form is the registry wire format, so parsing and
//!   rendering must round-trip exactly
//! - The guard decrements on explicit release; if the attempt future is
//!   dropped first (client went away) the decrement is scheduled from `Drop`

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::registry::{RegistryError, ServiceRegistry};

/// Address of one backend instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BackendAddress {
    host: String,
    port: u16,
}

impl BackendAddress {
    /// Create a new backend address.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Base URL requests to this backend are resolved against.
    pub fn base_url(&self) -> Result<Url, url::ParseError> {
        Url::parse(&format!("http://{}", self))
    }
}

impl fmt::Display for BackendAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for BackendAddress {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| RegistryError::InvalidAddress(s.to_string()))?;
        if host.is_empty() {
            return Err(RegistryError::InvalidAddress(s.to_string()));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| RegistryError::InvalidAddress(s.to_string()))?;
        Ok(Self::new(host, port))
    }
}

impl TryFrom<String> for BackendAddress {
    type Error = RegistryError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BackendAddress> for String {
    fn from(addr: BackendAddress) -> Self {
        addr.to_string()
    }
}

/// Holds one unit of a backend's connection counter for the duration of an
/// attempt.
#[derive(Debug)]
pub struct ConnectionGuard {
    registry: ServiceRegistry,
    service: String,
    backend: BackendAddress,
    released: bool,
}

impl ConnectionGuard {
    /// Increment the counter and return a guard owning that increment.
    pub async fn acquire(
        registry: &ServiceRegistry,
        service: &str,
        backend: &BackendAddress,
    ) -> Result<Self, RegistryError> {
        registry.incr_connections(service, backend).await?;
        Ok(Self {
            registry: registry.clone(),
            service: service.to_string(),
            backend: backend.clone(),
            released: false,
        })
    }

    pub fn backend(&self) -> &BackendAddress {
        &self.backend
    }

    /// Give the increment back.
    pub async fn release(mut self) {
        self.released = true;
        if let Err(e) = self
            .registry
            .decr_connections(&self.service, &self.backend)
            .await
        {
            tracing::warn!(
                service = %self.service,
                backend = %self.backend,
                error = %e,
                "Failed to decrement connection counter"
            );
        }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(backend = %self.backend, "Connection counter leaked: no runtime");
            return;
        };
        let registry = self.registry.clone();
        let service = std::mem::take(&mut self.service);
        let backend = self.backend.clone();
        handle.spawn(async move {
            if let Err(e) = registry.decr_connections(&service, &backend).await {
                tracing::warn!(
                    service = %service,
                    backend = %backend,
                    error = %e,
                    "Failed to decrement connection counter after cancellation"
                );
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::MemoryRegistry;
    use std::sync::Arc;

    #[test]
    fn test_address_parse() {
        let addr: BackendAddress = "10.0.0.5:8000".parse().unwrap();
        assert_eq!(addr.host(), "10.0.0.5");
        assert_eq!(addr.port(), 8000);
        assert_eq!(addr.to_string(), "10.0.0.5:8000");
        assert_eq!(addr.base_url().unwrap().as_str(), "http://10.0.0.5:8000/");

        assert!("no-port".parse::<BackendAddress>().is_err());
        assert!(":8000".parse::<BackendAddress>().is_err());
        assert!("host:99999".parse::<BackendAddress>().is_err());
    }

    #[tokio::test]
    async fn test_guard_release() {
        let registry = ServiceRegistry::new(Arc::new(MemoryRegistry::new()), "t:");
        let addr = BackendAddress::new("a", 1);

        let guard = ConnectionGuard::acquire(&registry, "svc", &addr).await.unwrap();
        assert_eq!(registry.connection_count("svc", &addr).await.unwrap(), 1);
        guard.release().await;
        assert_eq!(registry.connection_count("svc", &addr).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_guard_drop_schedules_decrement() {
        let registry = ServiceRegistry::new(Arc::new(MemoryRegistry::new()), "t:");
        let addr = BackendAddress::new("a", 1);

        let guard = ConnectionGuard::acquire(&registry, "svc", &addr).await.unwrap();
        drop(guard);
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert_eq!(registry.connection_count("svc", &addr).await.unwrap(), 0);
    }
}
