//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Route matched → service name identified
//!     → registry (current backend set, minus backends exhausted this call)
//!     → Apply load balancing policy:
//!         - round_robin.rs (rotate through backends via shared cursor)
//!         - least_conn.rs (pick backend with fewest in-flight attempts)
//!     → Return backend address or ServiceUnavailable
//! ```
//!
//! # Design Decisions
//! - Policy is a closed enum chosen once at startup
//! - Quarantined backends are excluded by their absence from the set, not by
//!   a separate check
//! - The set is re-read on every selection, so it may shrink between calls

pub mod backend;
pub mod least_conn;
pub mod round_robin;

use serde::{Deserialize, Serialize};

use crate::error::GatewayError;
use crate::registry::ServiceRegistry;

pub use backend::{BackendAddress, ConnectionGuard};
pub use least_conn::LeastConnections;
pub use round_robin::RoundRobin;

/// Backend selection policy, as named in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BalancePolicy {
    #[default]
    RoundRobin,
    LeastConnections,
}

impl std::str::FromStr for BalancePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "round_robin" | "roundrobin" => Ok(BalancePolicy::RoundRobin),
            "least_connections" | "least_conn" | "leastconnections" => {
                Ok(BalancePolicy::LeastConnections)
            }
            other => Err(format!("unknown load balancer policy: {}", other)),
        }
    }
}

/// Selects a backend for a service from the live registry.
#[derive(Debug, Clone)]
pub enum LoadBalancer {
    RoundRobin(RoundRobin),
    LeastConnections(LeastConnections),
}

impl LoadBalancer {
    pub fn new(policy: BalancePolicy, registry: ServiceRegistry) -> Self {
        match policy {
            BalancePolicy::RoundRobin => LoadBalancer::RoundRobin(RoundRobin::new(registry)),
            BalancePolicy::LeastConnections => {
                LoadBalancer::LeastConnections(LeastConnections::new(registry))
            }
        }
    }

    pub fn policy(&self) -> BalancePolicy {
        match self {
            LoadBalancer::RoundRobin(_) => BalancePolicy::RoundRobin,
            LoadBalancer::LeastConnections(_) => BalancePolicy::LeastConnections,
        }
    }

    /// Whether attempts must maintain connection counters for this policy.
    pub fn tracks_connections(&self) -> bool {
        matches!(self, LoadBalancer::LeastConnections(_))
    }

    /// Pick a backend for `service`, skipping anything in `exclude`.
    pub async fn select(
        &self,
        service: &str,
        exclude: &[BackendAddress],
    ) -> Result<BackendAddress, GatewayError> {
        let selected = match self {
            LoadBalancer::RoundRobin(rr) => rr.select(service, exclude).await?,
            LoadBalancer::LeastConnections(lc) => lc.select(service, exclude).await?,
        };

        match selected {
            Some(backend) => {
                tracing::debug!(service = %service, backend = %backend, policy = ?self.policy(), "Backend selected");
                Ok(backend)
            }
            None => {
                tracing::debug!(service = %service, excluded = exclude.len(), "No backend available");
                Err(GatewayError::ServiceUnavailable {
                    service: service.to_string(),
                })
            }
        }
    }
}

/// The registered backends for a service that are not excluded.
async fn candidates(
    registry: &ServiceRegistry,
    service: &str,
    exclude: &[BackendAddress],
) -> Result<Vec<BackendAddress>, GatewayError> {
    let mut backends = registry.backends(service).await?;
    backends.retain(|b| !exclude.contains(b));
    Ok(backends)
}
