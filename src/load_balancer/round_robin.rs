//! Round-robin load balancing strategy.

use crate::error::GatewayError;
use crate::load_balancer::{candidates, BackendAddress};
use crate::registry::ServiceRegistry;

/// Round-robin selector.
/// The rotation cursor lives in the registry so every gateway instance
/// advances the same counter.
#[derive(Debug, Clone)]
pub struct RoundRobin {
    registry: ServiceRegistry,
}

impl RoundRobin {
    pub fn new(registry: ServiceRegistry) -> Self {
        Self { registry }
    }

    pub async fn select(
        &self,
        service: &str,
        exclude: &[BackendAddress],
    ) -> Result<Option<BackendAddress>, GatewayError> {
        let backends = candidates(&self.registry, service, exclude).await?;
        if backends.is_empty() {
            return Ok(None);
        }
        let cursor = self.registry.advance_cursor(service).await?;
        Ok(pick(&backends, cursor).cloned())
    }
}

/// Backend at `cursor mod len`, taken against the list as it is now.
pub fn pick(backends: &[BackendAddress], cursor: u64) -> Option<&BackendAddress> {
    if backends.is_empty() {
        return None;
    }
    backends.get((cursor % backends.len() as u64) as usize)
}
