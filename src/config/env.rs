//! Environment overrides.
//!
//! Deployments configure the gateway through environment variables; they are
//! applied on top of the file (or defaults) before validation. The lookup is
//! injected so tests never touch the process environment.

use std::str::FromStr;

use crate::config::loader::ConfigError;
use crate::config::schema::{GatewayConfig, RegistryBackend};

/// Apply overrides from the process environment.
pub fn apply_process_env(config: &mut GatewayConfig) -> Result<(), ConfigError> {
    apply_env(config, |name| std::env::var(name).ok())
}

/// Apply overrides from `lookup`.
pub fn apply_env<F>(config: &mut GatewayConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(port) = parse::<u16, _>(&lookup, "GATEWAY_LISTEN_PORT")? {
        config.listener.bind_address = with_port(&config.listener.bind_address, port);
    }
    if let Some(port) = parse::<u16, _>(&lookup, "DISCOVERY_PORT")? {
        config.discovery.bind_address = with_port(&config.discovery.bind_address, port);
    }
    if let Some(url) = lookup("DISCOVERY_URL") {
        config.discovery.url = url;
    }
    if let Some(port) = parse::<u16, _>(&lookup, "GRPC_PORT")? {
        config.discovery.grpc_bind_address =
            with_port(&config.discovery.grpc_bind_address, port);
    }
    if let Some(url) = lookup("DISCOVERY_GRPC_URL") {
        config.discovery.grpc_url = url;
    }

    if let Some(host) = lookup("REDIS_HOST") {
        let port = parse::<u16, _>(&lookup, "REDIS_PORT")?.unwrap_or(6379);
        config.registry.backend = RegistryBackend::Redis;
        config.registry.url = format!("redis://{}:{}", host, port);
    }

    if let Some(v) = parse(&lookup, "GATEWAY_PROXY_TIMEOUT_MS")? {
        config.timeouts.proxy_timeout_ms = v;
    }
    if let Some(v) = parse(&lookup, "GATEWAY_RATE_LIMIT_WINDOW_MS")? {
        config.rate_limit.window_ms = v;
    }
    if let Some(v) = parse(&lookup, "GATEWAY_RATE_LIMIT_MAX")? {
        config.rate_limit.max_requests = v;
    }
    if let Some(v) = parse(&lookup, "GATEWAY_FAILURE_THRESHOLD")? {
        config.breaker.failure_threshold = v;
    }
    if let Some(v) = parse(&lookup, "GATEWAY_COOLDOWN_MULTIPLIER")? {
        config.breaker.cooldown_multiplier = v;
    }
    if let Some(v) = parse(&lookup, "GATEWAY_LOAD_INTERVAL_SECS")? {
        config.load_monitor.interval_secs = v;
    }
    if let Some(v) = parse(&lookup, "GATEWAY_CRITICAL_LOAD")? {
        config.load_monitor.critical_load = v;
    }
    if let Some(v) = parse(&lookup, "GATEWAY_LB_POLICY")? {
        config.load_balancer.policy = v;
    }
    if let Some(v) = parse(&lookup, "GATEWAY_MAX_RETRIES")? {
        config.retries.max_retries = v;
    }
    if let Some(v) = parse(&lookup, "GATEWAY_MAX_BACKENDS")? {
        config.retries.max_backends = v;
    }
    if let Some(level) = lookup("LOG_LEVEL") {
        config.observability.log_level = level;
    }

    Ok(())
}

fn parse<T, F>(lookup: &F, var: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::Env {
                var: var.to_string(),
                value: raw,
            }),
    }
}

/// Replace the port of a `host:port` bind address.
fn with_port(bind_address: &str, port: u16) -> String {
    let host = bind_address
        .rsplit_once(':')
        .map(|(host, _)| host)
        .unwrap_or("0.0.0.0");
    format!("{}:{}", host, port)
}
