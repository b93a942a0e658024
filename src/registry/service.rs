//! Typed view over the registry store.
//!
//! # Responsibilities
//! - Own the key layout for backend sets, counters and quarantine markers
//! - Parse stored addresses back into [`BackendAddress`]
//! - Keep counters non-negative

use std::sync::Arc;
use std::time::Duration;

use crate::load_balancer::backend::BackendAddress;
use crate::registry::{Registry, RegistryError};

/// Result of a registration call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// Address appended to the backend set.
    Added,
    /// Address was already routable.
    AlreadyPresent,
    /// Address is cooling down; it rejoins when the quarantine expires.
    Quarantined,
}

/// Service-level operations on top of a [`Registry`] store.
#[derive(Debug, Clone)]
pub struct ServiceRegistry {
    store: Arc<dyn Registry>,
    prefix: String,
}

impl ServiceRegistry {
    pub fn new(store: Arc<dyn Registry>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    fn services_key(&self) -> String {
        format!("{}services", self.prefix)
    }

    fn backends_key(&self, service: &str) -> String {
        format!("{}backends:{}", self.prefix, service)
    }

    fn cursor_key(&self, service: &str) -> String {
        format!("{}cursor:{}", self.prefix, service)
    }

    fn connections_key(&self, service: &str, backend: &BackendAddress) -> String {
        format!("{}connections:{}:{}", self.prefix, service, backend)
    }

    fn failures_key(&self, service: &str, backend: &BackendAddress) -> String {
        format!("{}failures:{}:{}", self.prefix, service, backend)
    }

    fn quarantine_key(&self, service: &str, backend: &BackendAddress) -> String {
        format!("{}quarantine:{}:{}", self.prefix, service, backend)
    }

    fn quarantined_key(&self, service: &str) -> String {
        format!("{}quarantined:{}", self.prefix, service)
    }

    fn probe_key(&self, service: &str, backend: &BackendAddress) -> String {
        format!("{}probe:{}:{}", self.prefix, service, backend)
    }

    fn load_key(&self, service: &str) -> String {
        format!("{}load:{}", self.prefix, service)
    }

    // --- Backend sets ---

    /// Add `backend` to the service's routable set unless it is already there
    /// or currently quarantined.
    pub async fn register(
        &self,
        service: &str,
        backend: &BackendAddress,
    ) -> Result<Registration, RegistryError> {
        let services = self.services().await?;
        if !services.iter().any(|s| s == service) {
            self.store.list_push(&self.services_key(), service).await?;
        }

        if self.is_quarantined(service, backend).await? {
            let waiting = self.quarantined(service).await?;
            if !waiting.contains(backend) {
                self.store
                    .list_push(&self.quarantined_key(service), &backend.to_string())
                    .await?;
            }
            return Ok(Registration::Quarantined);
        }

        if self.backends(service).await?.contains(backend) {
            return Ok(Registration::AlreadyPresent);
        }
        self.store
            .list_push(&self.backends_key(service), &backend.to_string())
            .await?;
        Ok(Registration::Added)
    }

    /// Remove `backend` for good: out of the routable set, off the
    /// quarantined list, and with its breaker keys cleared so a cooldown
    /// cannot bring it back. Returns whether either list held it.
    pub async fn deregister(
        &self,
        service: &str,
        backend: &BackendAddress,
    ) -> Result<bool, RegistryError> {
        let addr = backend.to_string();
        let routable = self
            .store
            .list_remove(&self.backends_key(service), &addr)
            .await?;
        let parked = self
            .store
            .list_remove(&self.quarantined_key(service), &addr)
            .await?;
        for key in [
            self.quarantine_key(service, backend),
            self.probe_key(service, backend),
            self.failures_key(service, backend),
        ] {
            self.store.delete(&key).await?;
        }
        Ok(routable + parked > 0)
    }

    /// The routable backends for `service`, failing when there are none.
    pub async fn lookup(&self, service: &str) -> Result<Vec<BackendAddress>, RegistryError> {
        let backends = self.backends(service).await?;
        if backends.is_empty() {
            return Err(RegistryError::ServiceNotAvailable(service.to_string()));
        }
        Ok(backends)
    }

    /// The routable backends for `service`, possibly empty.
    pub async fn backends(&self, service: &str) -> Result<Vec<BackendAddress>, RegistryError> {
        parse_addresses(self.store.list_range(&self.backends_key(service)).await?)
    }

    /// Every service name that has ever registered.
    pub async fn services(&self) -> Result<Vec<String>, RegistryError> {
        self.store.list_range(&self.services_key()).await
    }

    /// Advance the rotation cursor and return its position before the advance.
    pub async fn advance_cursor(&self, service: &str) -> Result<u64, RegistryError> {
        let next = self.store.incr(&self.cursor_key(service)).await?;
        Ok((next - 1).max(0) as u64)
    }

    // --- Connection counters ---

    pub async fn connection_count(
        &self,
        service: &str,
        backend: &BackendAddress,
    ) -> Result<u64, RegistryError> {
        let count = self
            .store
            .get(&self.connections_key(service, backend))
            .await?
            .unwrap_or(0);
        Ok(count.max(0) as u64)
    }

    pub async fn incr_connections(
        &self,
        service: &str,
        backend: &BackendAddress,
    ) -> Result<u64, RegistryError> {
        let count = self.store.incr(&self.connections_key(service, backend)).await?;
        Ok(count.max(0) as u64)
    }

    pub async fn decr_connections(
        &self,
        service: &str,
        backend: &BackendAddress,
    ) -> Result<u64, RegistryError> {
        let key = self.connections_key(service, backend);
        let count = self.store.decr(&key).await?;
        if count < 0 {
            self.store.set(&key, 0).await?;
            return Ok(0);
        }
        Ok(count as u64)
    }

    // --- Failure records ---

    pub async fn failure_count(
        &self,
        service: &str,
        backend: &BackendAddress,
    ) -> Result<u64, RegistryError> {
        let count = self
            .store
            .get(&self.failures_key(service, backend))
            .await?
            .unwrap_or(0);
        Ok(count.max(0) as u64)
    }

    pub async fn incr_failures(
        &self,
        service: &str,
        backend: &BackendAddress,
    ) -> Result<u64, RegistryError> {
        let count = self.store.incr(&self.failures_key(service, backend)).await?;
        Ok(count.max(0) as u64)
    }

    pub async fn reset_failures(
        &self,
        service: &str,
        backend: &BackendAddress,
    ) -> Result<(), RegistryError> {
        self.store.set(&self.failures_key(service, backend), 0).await
    }

    // --- Quarantine ---

    /// Set the expiring marker, then pull the backend out of the routable set
    /// and park it on the quarantined list.
    pub async fn quarantine(
        &self,
        service: &str,
        backend: &BackendAddress,
        cooldown: Duration,
    ) -> Result<(), RegistryError> {
        let addr = backend.to_string();
        self.store
            .set_with_expiry(&self.quarantine_key(service, backend), 1, cooldown)
            .await?;
        self.store.list_remove(&self.backends_key(service), &addr).await?;
        if !self.quarantined(service).await?.contains(backend) {
            self.store.list_push(&self.quarantined_key(service), &addr).await?;
        }
        Ok(())
    }

    pub async fn is_quarantined(
        &self,
        service: &str,
        backend: &BackendAddress,
    ) -> Result<bool, RegistryError> {
        self.store.exists(&self.quarantine_key(service, backend)).await
    }

    /// Backends parked on the quarantined list, expired markers included.
    pub async fn quarantined(&self, service: &str) -> Result<Vec<BackendAddress>, RegistryError> {
        parse_addresses(self.store.list_range(&self.quarantined_key(service)).await?)
    }

    /// Move a backend whose marker expired back into the routable set, on
    /// probation. Concurrent callers race on removing it from the quarantined
    /// list; only the one that removed it restores it. Returns whether this
    /// call did.
    pub async fn release_quarantine(
        &self,
        service: &str,
        backend: &BackendAddress,
    ) -> Result<bool, RegistryError> {
        let addr = backend.to_string();
        let removed = self
            .store
            .list_remove(&self.quarantined_key(service), &addr)
            .await?;
        if removed == 0 {
            return Ok(false);
        }
        self.set_probing(service, backend, true).await?;
        if !self.backends(service).await?.contains(backend) {
            self.store.list_push(&self.backends_key(service), &addr).await?;
        }
        Ok(true)
    }

    // --- Probation ---

    pub async fn set_probing(
        &self,
        service: &str,
        backend: &BackendAddress,
        probing: bool,
    ) -> Result<(), RegistryError> {
        let key = self.probe_key(service, backend);
        if probing {
            self.store.set(&key, 1).await
        } else {
            self.store.delete(&key).await
        }
    }

    pub async fn is_probing(
        &self,
        service: &str,
        backend: &BackendAddress,
    ) -> Result<bool, RegistryError> {
        Ok(self
            .store
            .get(&self.probe_key(service, backend))
            .await?
            .is_some_and(|v| v > 0))
    }

    // --- Load samples ---

    pub async fn incr_load(&self, service: &str) -> Result<u64, RegistryError> {
        let count = self.store.incr(&self.load_key(service)).await?;
        Ok(count.max(0) as u64)
    }

    /// Read the sample counter and reset it to zero.
    pub async fn take_load(&self, service: &str) -> Result<u64, RegistryError> {
        let count = self.store.take(&self.load_key(service)).await?.unwrap_or(0);
        Ok(count.max(0) as u64)
    }
}

fn parse_addresses(raw: Vec<String>) -> Result<Vec<BackendAddress>, RegistryError> {
    raw.iter().map(|s| s.parse()).collect()
}
