//! Least Connections load balancing strategy.

use crate::error::GatewayError;
use crate::load_balancer::{candidates, BackendAddress};
use crate::registry::ServiceRegistry;

/// Least connections selector.
/// Selects the backend with the minimum number of in-flight attempts.
#[derive(Debug, Clone)]
pub struct LeastConnections {
    registry: ServiceRegistry,
}

impl LeastConnections {
    pub fn new(registry: ServiceRegistry) -> Self {
        Self { registry }
    }

    pub async fn select(
        &self,
        service: &str,
        exclude: &[BackendAddress],
    ) -> Result<Option<BackendAddress>, GatewayError> {
        let backends = candidates(&self.registry, service, exclude).await?;
        let mut loads = Vec::with_capacity(backends.len());
        for backend in backends {
            let count = self.registry.connection_count(service, &backend).await?;
            loads.push((backend, count));
        }
        Ok(pick(&loads).cloned())
    }
}

/// Backend with the smallest counter; ties go to the earliest in list order.
pub fn pick(loads: &[(BackendAddress, u64)]) -> Option<&BackendAddress> {
    // min_by_key keeps the first of equal minima
    loads.iter().min_by_key(|(_, count)| *count).map(|(b, _)| b)
}
