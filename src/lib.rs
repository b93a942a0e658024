//! Service gateway library.
//!
//! An API gateway with a shared service registry, round-robin and
//! least-connections balancing, a per-backend circuit breaker, bounded
//! retry/failover, a two-service creation saga and a request-rate monitor.

// Core subsystems
pub mod config;
pub mod error;
pub mod http;
pub mod routing;

// Traffic management
pub mod discovery;
pub mod load_balancer;
pub mod registry;
pub mod saga;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod security;

#[cfg(test)]
mod testing;

pub use config::schema::GatewayConfig;
pub use discovery::DiscoveryServer;
pub use error::GatewayError;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
