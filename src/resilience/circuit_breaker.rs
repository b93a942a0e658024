//! Circuit breaker for backend protection.
//!
//! # States
//! - Closed: routable, failures below threshold
//! - Open: quarantined, absent from the backend set until the cooldown expires
//! - Probing: back in the set after cooldown; the next outcome decides
//!
//! # State Transitions
//! ```text
//! Closed  → Open:    consecutive failures >= threshold
//! Open    → Probing: quarantine marker expired (restored before selection)
//! Probing → Closed:  success
//! Probing → Open:    failure
//! ```
//!
//! # Design Decisions
//! - Per (service, backend), all state in the shared registry
//! - Quarantine removes the backend from the set; the balancer never checks
//!   markers itself
//! - Cooldown scales with the per-call timeout
//! - No throttling while probing: the next routed request is the probe

use std::time::Duration;

use crate::config::{BreakerConfig, TimeoutConfig, MAX_COOLDOWN};
use crate::load_balancer::BackendAddress;
use crate::observability::metrics;
use crate::registry::{RegistryError, ServiceRegistry};

/// Breaker state of one backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    Probing,
}

/// Failure bookkeeping and quarantine decisions.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    registry: ServiceRegistry,
    threshold: u64,
    cooldown: Duration,
}

impl CircuitBreaker {
    pub fn new(registry: ServiceRegistry, threshold: u32, cooldown: Duration) -> Self {
        Self {
            registry,
            threshold: u64::from(threshold.max(1)),
            cooldown,
        }
    }

    /// Build from configuration: cooldown = proxy timeout × multiplier,
    /// capped at [`MAX_COOLDOWN`] when the multiplier is out of range.
    pub fn from_config(
        registry: ServiceRegistry,
        breaker: &BreakerConfig,
        timeouts: &TimeoutConfig,
    ) -> Self {
        let cooldown = breaker.cooldown(timeouts).unwrap_or(MAX_COOLDOWN);
        Self::new(registry, breaker.failure_threshold, cooldown)
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Record a server-side failure. Returns the state after the update.
    pub async fn record_failure(
        &self,
        service: &str,
        backend: &BackendAddress,
    ) -> Result<CircuitState, RegistryError> {
        metrics::record_backend_failure(service, &backend.to_string());

        if self.registry.is_probing(service, backend).await? {
            tracing::warn!(service = %service, backend = %backend, "Probe failed, reopening circuit");
            self.trip(service, backend).await?;
            return Ok(CircuitState::Open);
        }

        let failures = self.registry.incr_failures(service, backend).await?;
        if failures >= self.threshold {
            tracing::warn!(
                service = %service,
                backend = %backend,
                failures,
                cooldown_ms = self.cooldown.as_millis() as u64,
                "Failure threshold reached, opening circuit"
            );
            self.trip(service, backend).await?;
            return Ok(CircuitState::Open);
        }

        tracing::debug!(service = %service, backend = %backend, failures, threshold = self.threshold, "Backend failure recorded");
        Ok(CircuitState::Closed)
    }

    /// Record a successful response.
    pub async fn record_success(
        &self,
        service: &str,
        backend: &BackendAddress,
    ) -> Result<(), RegistryError> {
        if self.registry.is_probing(service, backend).await? {
            tracing::info!(service = %service, backend = %backend, "Probe succeeded, circuit closed");
            self.registry.set_probing(service, backend, false).await?;
        }
        self.registry.reset_failures(service, backend).await
    }

    /// Return every backend whose cooldown has elapsed to the routable set,
    /// on probation.
    pub async fn restore_expired(
        &self,
        service: &str,
    ) -> Result<Vec<BackendAddress>, RegistryError> {
        let mut restored = Vec::new();
        for backend in self.registry.quarantined(service).await? {
            if self.registry.is_quarantined(service, &backend).await? {
                continue;
            }
            // another request may have restored it first
            if !self.registry.release_quarantine(service, &backend).await? {
                continue;
            }
            tracing::info!(service = %service, backend = %backend, "Cooldown expired, backend on probation");
            restored.push(backend);
        }
        Ok(restored)
    }

    /// Current state of one backend.
    pub async fn state(
        &self,
        service: &str,
        backend: &BackendAddress,
    ) -> Result<CircuitState, RegistryError> {
        if self.registry.is_quarantined(service, backend).await? {
            Ok(CircuitState::Open)
        } else if self.registry.is_probing(service, backend).await? {
            Ok(CircuitState::Probing)
        } else {
            Ok(CircuitState::Closed)
        }
    }

    async fn trip(&self, service: &str, backend: &BackendAddress) -> Result<(), RegistryError> {
        self.registry.quarantine(service, backend, self.cooldown).await?;
        self.registry.reset_failures(service, backend).await?;
        self.registry.set_probing(service, backend, false).await?;
        metrics::record_circuit_open(service, &backend.to_string());
        Ok(())
    }
}
