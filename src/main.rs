//! Service gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!   Client ──▶ rate limit ──▶ router ──▶ load monitor ──▶ Forwarder ──▶ Backend
//!                              │                          │   ▲
//!                              │                 balancer ┘   │ retries / failover
//!                              ▼                          breaker
//!                          POST /saga ──▶ Saga ──▶ Forwarder (×2, + compensation)
//!
//!   discovery process ──▶ registry (memory | redis) ◀── balancer, breaker, monitor
//! ```

use std::sync::Arc;

use tokio::net::TcpListener;

use service_gateway::config;
use service_gateway::http::HttpServer;
use service_gateway::lifecycle::Shutdown;
use service_gateway::observability::{logging, metrics};
use service_gateway::registry;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = config::load_from_env()?;

    logging::init_logging(&config.observability.log_level);
    tracing::info!("service-gateway v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        registry = ?config.registry.backend,
        policy = ?config.load_balancer.policy,
        routes = config.routes.len(),
        proxy_timeout_ms = config.timeouts.proxy_timeout_ms,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let store = registry::connect(&config.registry).await?;

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    shutdown.trigger_on_signal();

    let server = HttpServer::new(config, store);
    server.run(listener, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
