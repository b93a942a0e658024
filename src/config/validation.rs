//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, thresholds > 0)
//! - Detect conflicting routes
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Pure function: GatewayConfig → Result<(), Vec<ValidationError>>

use std::collections::HashSet;

use thiserror::Error;

use crate::config::schema::GatewayConfig;
use crate::load_balancer::BackendAddress;

/// One semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{field} must be greater than zero")]
    NotPositive { field: &'static str },

    #[error("route prefix {0:?} must start with '/'")]
    BadPrefix(String),

    #[error("route prefix {0} is defined more than once")]
    DuplicatePrefix(String),

    #[error("route prefix {0} shadows the saga route")]
    SagaRouteConflict(String),

    #[error("route {prefix} has an empty service name")]
    EmptyService { prefix: String },

    #[error("backend address {0:?} is not host:port")]
    BadBackendAddress(String),

    #[error("breaker.cooldown_multiplier {0} does not give a cooldown between zero and one day")]
    CooldownOutOfRange(f64),

    #[error("{0} is not a socket address")]
    BadBindAddress(String),
}

/// Check a configuration for semantic errors.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let positive: [(&'static str, bool); 6] = [
        ("timeouts.proxy_timeout_ms", config.timeouts.proxy_timeout_ms > 0),
        ("timeouts.request_secs", config.timeouts.request_secs > 0),
        ("breaker.failure_threshold", config.breaker.failure_threshold > 0),
        ("retries.max_backends", config.retries.max_backends > 0),
        ("load_monitor.interval_secs", config.load_monitor.interval_secs > 0),
        ("rate_limit.window_ms", config.rate_limit.window_ms > 0),
    ];
    for (field, ok) in positive {
        if !ok {
            errors.push(ValidationError::NotPositive { field });
        }
    }
    if config.breaker.cooldown(&config.timeouts).is_none() {
        errors.push(ValidationError::CooldownOutOfRange(
            config.breaker.cooldown_multiplier,
        ));
    }
    if config.rate_limit.enabled && config.rate_limit.max_requests == 0 {
        errors.push(ValidationError::NotPositive {
            field: "rate_limit.max_requests",
        });
    }

    let mut seen = HashSet::new();
    for route in &config.routes {
        if !route.prefix.starts_with('/') {
            errors.push(ValidationError::BadPrefix(route.prefix.clone()));
        }
        if !seen.insert(route.prefix.trim_end_matches('/')) {
            errors.push(ValidationError::DuplicatePrefix(route.prefix.clone()));
        }
        if route.service.trim().is_empty() {
            errors.push(ValidationError::EmptyService {
                prefix: route.prefix.clone(),
            });
        }
        if config.saga.enabled && route.prefix.trim_end_matches('/') == config.saga.route {
            errors.push(ValidationError::SagaRouteConflict(route.prefix.clone()));
        }
    }

    for backend in &config.backends {
        if backend.address.parse::<BackendAddress>().is_err() {
            errors.push(ValidationError::BadBackendAddress(backend.address.clone()));
        }
    }

    for addr in [
        &config.listener.bind_address,
        &config.discovery.bind_address,
        &config.discovery.grpc_bind_address,
    ] {
        if addr.parse::<std::net::SocketAddr>().is_err() {
            errors.push(ValidationError::BadBindAddress(addr.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{BackendConfig, RouteConfig};

    #[test]
    fn test_defaults_are_valid() {
        let config = GatewayConfig {
            routes: GatewayConfig::default_routes(),
            ..GatewayConfig::default()
        };
        assert_eq!(validate_config(&config), Ok(()));
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = GatewayConfig::default();
        config.breaker.failure_threshold = 0;
        config.retries.max_backends = 0;
        config.routes = vec![
            RouteConfig {
                prefix: "ts".into(),
                service: "train_booking_service".into(),
                strip_prefix: true,
            },
            RouteConfig {
                prefix: "/ls".into(),
                service: "lobby_service".into(),
                strip_prefix: true,
            },
            RouteConfig {
                prefix: "/ls/".into(),
                service: "".into(),
                strip_prefix: true,
            },
        ];
        config.backends.push(BackendConfig {
            service: "lobby_service".into(),
            address: "lobby".into(),
        });

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::NotPositive {
            field: "breaker.failure_threshold"
        }));
        assert!(errors.contains(&ValidationError::NotPositive {
            field: "retries.max_backends"
        }));
        assert!(errors.contains(&ValidationError::BadPrefix("ts".into())));
        assert!(errors.contains(&ValidationError::DuplicatePrefix("/ls/".into())));
        assert!(errors.contains(&ValidationError::EmptyService {
            prefix: "/ls/".into()
        }));
        assert!(errors.contains(&ValidationError::BadBackendAddress("lobby".into())));
    }

    #[test]
    fn test_unrepresentable_cooldown_rejected() {
        for multiplier in [f64::INFINITY, f64::NAN, 1e300, 0.0] {
            let mut config = GatewayConfig::default();
            config.breaker.cooldown_multiplier = multiplier;
            let errors = validate_config(&config).unwrap_err();
            assert!(errors
                .iter()
                .any(|e| matches!(e, ValidationError::CooldownOutOfRange(_))));
        }
    }
}
