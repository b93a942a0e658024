//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway
//! and the discovery endpoint. All types derive Serde traits for
//! deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::load_balancer::BalancePolicy;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Gateway listener.
    pub listener: ListenerConfig,

    /// Discovery endpoint listener and client URL.
    pub discovery: DiscoveryConfig,

    /// Shared registry store.
    pub registry: RegistryConfig,

    /// Path prefix → service name.
    pub routes: Vec<RouteConfig>,

    /// Backends registered at startup.
    pub backends: Vec<BackendConfig>,

    pub timeouts: TimeoutConfig,

    pub rate_limit: RateLimitConfig,

    pub breaker: BreakerConfig,

    pub retries: RetryConfig,

    pub load_balancer: LoadBalancerConfig,

    pub load_monitor: LoadMonitorConfig,

    pub saga: SagaConfig,

    pub security: SecurityConfig,

    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Discovery endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// HTTP listener: `/status` and JSON-RPC.
    pub bind_address: String,

    /// Base URL of the HTTP listener.
    pub url: String,

    /// gRPC registration listener.
    pub grpc_bind_address: String,

    /// URL backends use to reach the gRPC listener.
    pub grpc_url: String,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8081".to_string(),
            url: "http://127.0.0.1:8081".to_string(),
            grpc_bind_address: "0.0.0.0:50051".to_string(),
            grpc_url: "http://127.0.0.1:50051".to_string(),
        }
    }
}

/// Which store backs the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistryBackend {
    /// In-process; only visible to the process that owns it.
    #[default]
    Memory,
    Redis,
}

/// Registry store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub backend: RegistryBackend,

    /// Redis URL, used when `backend = "redis"`.
    pub url: String,

    /// Prefix for every registry key.
    pub key_prefix: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            backend: RegistryBackend::Memory,
            url: "redis://127.0.0.1:6379".to_string(),
            key_prefix: "gateway:".to_string(),
        }
    }
}

/// Route configuration mapping a path prefix to a service.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Path prefix to match (segment boundary).
    pub prefix: String,

    /// Service name the backends are registered under.
    pub service: String,

    /// Drop the prefix before forwarding.
    #[serde(default = "default_strip_prefix")]
    pub strip_prefix: bool,
}

fn default_strip_prefix() -> bool {
    true
}

/// A backend registered at startup.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
    /// Service this backend belongs to.
    pub service: String,

    /// Backend address (e.g., "10.0.0.7:8000").
    pub address: String,
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Deadline for one backend attempt, in milliseconds.
    pub proxy_timeout_ms: u64,

    /// Deadline for a whole inbound request, retries included, in seconds.
    pub request_secs: u64,
}

impl TimeoutConfig {
    pub fn proxy_timeout(&self) -> Duration {
        Duration::from_millis(self.proxy_timeout_ms)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            proxy_timeout_ms: 5000,
            request_secs: 60,
        }
    }
}

/// Fixed-window rate limiting.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,

    /// Window length in milliseconds.
    pub window_ms: u64,

    /// Requests allowed per client per window.
    pub max_requests: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_ms: 1000,
            max_requests: 5,
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Consecutive failures before a backend is quarantined.
    pub failure_threshold: u32,

    /// Cooldown = proxy timeout × this.
    pub cooldown_multiplier: f64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown_multiplier: 3.0,
        }
    }
}

/// Longest quarantine the breaker accepts.
pub const MAX_COOLDOWN: Duration = Duration::from_secs(24 * 60 * 60);

impl BreakerConfig {
    /// Quarantine length for a given per-call timeout, or `None` when the
    /// multiplier is not a positive finite number or the result exceeds
    /// [`MAX_COOLDOWN`].
    pub fn cooldown(&self, timeouts: &TimeoutConfig) -> Option<Duration> {
        let multiplier = self.cooldown_multiplier;
        if !multiplier.is_finite() || multiplier <= 0.0 {
            return None;
        }
        Duration::try_from_secs_f64(timeouts.proxy_timeout().as_secs_f64() * multiplier)
            .ok()
            .filter(|cooldown| *cooldown <= MAX_COOLDOWN)
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Extra attempts on the same backend.
    pub max_retries: u32,

    /// Distinct backends tried per request.
    pub max_backends: usize,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            max_backends: 3,
            base_delay_ms: 50,
            max_delay_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct LoadBalancerConfig {
    pub policy: BalancePolicy,
}

/// Load monitor configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoadMonitorConfig {
    pub enabled: bool,

    /// Sampling interval in seconds.
    pub interval_secs: u64,

    /// Requests per interval at which an alert fires.
    pub critical_load: u64,
}

impl Default for LoadMonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 10,
            critical_load: 60,
        }
    }
}

/// The two-service creation saga.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SagaConfig {
    pub enabled: bool,

    /// Gateway path that triggers the saga.
    pub route: String,

    pub primary_service: String,

    /// Collection path on the primary service; the compensating delete goes
    /// to `{primary_path}/{id}`.
    pub primary_path: String,

    pub dependent_service: String,

    pub dependent_path: String,

    /// Field of the dependent payload that carries the primary id.
    pub reference_field: String,
}

impl Default for SagaConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            route: "/saga".to_string(),
            primary_service: "train_booking_service".to_string(),
            primary_path: "/trains".to_string(),
            dependent_service: "lobby_service".to_string(),
            dependent_path: "/lobbies".to_string(),
            reference_field: "train_id".to_string(),
        }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum body size in bytes.
    pub max_body_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

impl GatewayConfig {
    /// Routes used when the config file lists none: the train booking and
    /// lobby services of the reference deployment.
    pub fn default_routes() -> Vec<RouteConfig> {
        vec![
            RouteConfig {
                prefix: "/ts".to_string(),
                service: "train_booking_service".to_string(),
                strip_prefix: true,
            },
            RouteConfig {
                prefix: "/ls".to_string(),
                service: "lobby_service".to_string(),
                strip_prefix: true,
            },
        ]
    }

    /// Every service name the gateway can route to.
    pub fn service_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.routes.iter().map(|r| r.service.clone()).collect();
        if self.saga.enabled {
            names.push(self.saga.primary_service.clone());
            names.push(self.saga.dependent_service.clone());
        }
        names.sort();
        names.dedup();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_toml() {
        let config: GatewayConfig = toml::from_str(
            r#"
            [listener]
            bind_address = "127.0.0.1:9000"

            [[routes]]
            prefix = "/ts"
            service = "train_booking_service"

            [load_balancer]
            policy = "least_connections"
            "#,
        )
        .unwrap();

        assert_eq!(config.listener.bind_address, "127.0.0.1:9000");
        assert!(config.routes[0].strip_prefix);
        assert_eq!(config.load_balancer.policy, BalancePolicy::LeastConnections);
        assert_eq!(config.breaker.failure_threshold, 3);
        assert_eq!(config.rate_limit.max_requests, 5);
        assert_eq!(config.timeouts.proxy_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_cooldown_bounds() {
        let timeouts = TimeoutConfig::default();
        let breaker = |cooldown_multiplier| BreakerConfig {
            failure_threshold: 3,
            cooldown_multiplier,
        };
        assert_eq!(breaker(3.0).cooldown(&timeouts), Some(Duration::from_secs(15)));
        assert_eq!(breaker(f64::INFINITY).cooldown(&timeouts), None);
        assert_eq!(breaker(f64::NAN).cooldown(&timeouts), None);
        assert_eq!(breaker(1e300).cooldown(&timeouts), None);
        assert_eq!(breaker(-1.0).cooldown(&timeouts), None);
    }

    #[test]
    fn test_service_names() {
        let mut config = GatewayConfig::default();
        config.routes = GatewayConfig::default_routes();
        assert_eq!(
            config.service_names(),
            vec!["lobby_service".to_string(), "train_booking_service".to_string()]
        );
    }
}
