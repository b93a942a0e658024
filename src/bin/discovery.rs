//! Service discovery endpoint.
//!
//! Serves gRPC registration on its own listener and JSON-RPC on `POST /rpc`,
//! both writing into the registry the gateway reads. Both processes must point at the same Redis registry
//! for registrations to be visible to the gateway.

use tokio::net::TcpListener;

use service_gateway::config::{self, RegistryBackend};
use service_gateway::discovery::{DiscoveryServer, GrpcDiscovery};
use service_gateway::lifecycle::Shutdown;
use service_gateway::observability::logging;
use service_gateway::registry::{self, ServiceRegistry};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = config::load_from_env()?;

    logging::init_logging(&config.observability.log_level);
    tracing::info!("discovery v{} starting", env!("CARGO_PKG_VERSION"));

    if config.registry.backend == RegistryBackend::Memory {
        tracing::warn!("In-process registry: registrations are not visible to other processes");
    }

    let store = registry::connect(&config.registry).await?;
    let registry = ServiceRegistry::new(store, config.registry.key_prefix.clone());

    let listener = TcpListener::bind(&config.discovery.bind_address).await?;
    let grpc_listener = TcpListener::bind(&config.discovery.grpc_bind_address).await?;

    let shutdown = Shutdown::new();
    shutdown.trigger_on_signal();

    let server = DiscoveryServer::new(registry);
    let grpc = GrpcDiscovery::new(server.clone());

    tokio::try_join!(
        async {
            server
                .run(listener, shutdown.subscribe())
                .await
                .map_err(Box::<dyn std::error::Error>::from)
        },
        async {
            grpc.run(grpc_listener, shutdown.subscribe())
                .await
                .map_err(Box::<dyn std::error::Error>::from)
        },
    )?;

    tracing::info!("Shutdown complete");
    Ok(())
}
