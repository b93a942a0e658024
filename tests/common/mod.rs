//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;

use service_gateway::config::GatewayConfig;
use service_gateway::discovery::{DiscoveryServer, GrpcDiscovery};
use service_gateway::http::HttpServer;
use service_gateway::lifecycle::Shutdown;
use service_gateway::load_balancer::BackendAddress;
use service_gateway::registry::{MemoryRegistry, Registry, ServiceRegistry};

pub const KEY_PREFIX: &str = "gateway:";

/// Serve `app` on an ephemeral port.
pub async fn start_backend(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

/// Start a programmable raw-TCP backend answering `(status, body)`.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        let (status, body) = f().await;
                        let status_text = match status {
                            200 => "200 OK",
                            201 => "201 Created",
                            404 => "404 Not Found",
                            500 => "500 Internal Server Error",
                            502 => "502 Bad Gateway",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };

                        let response_str = format!(
                            "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });
    addr
}

/// An address nothing listens on.
pub async fn dead_address() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

pub fn backend(addr: SocketAddr) -> BackendAddress {
    addr.to_string().parse().unwrap()
}

/// Defaults with the background noise turned off and short deadlines.
pub fn test_config() -> GatewayConfig {
    let mut config = GatewayConfig {
        routes: GatewayConfig::default_routes(),
        ..GatewayConfig::default()
    };
    config.listener.bind_address = "127.0.0.1:0".into();
    config.rate_limit.enabled = false;
    config.load_monitor.enabled = false;
    config.timeouts.proxy_timeout_ms = 500;
    config.retries.base_delay_ms = 1;
    config.retries.max_delay_ms = 5;
    config
}

pub struct Registries {
    pub store: Arc<dyn Registry>,
    pub registry: ServiceRegistry,
}

pub fn memory_registry() -> Registries {
    let store: Arc<dyn Registry> = Arc::new(MemoryRegistry::new());
    let registry = ServiceRegistry::new(store.clone(), KEY_PREFIX);
    Registries { store, registry }
}

/// Start a gateway on an ephemeral port.
pub async fn start_gateway(config: GatewayConfig, store: Arc<dyn Registry>) -> (SocketAddr, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let server = HttpServer::new(config, store);
    let server_shutdown = shutdown.clone();
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    (addr, shutdown)
}

/// Start a discovery endpoint on an ephemeral port.
pub async fn start_discovery(registry: ServiceRegistry) -> (SocketAddr, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = DiscoveryServer::new(registry).run(listener, rx).await;
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    (addr, shutdown)
}

/// Start the gRPC registration endpoint on an ephemeral port.
pub async fn start_grpc_discovery(registry: ServiceRegistry) -> (SocketAddr, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = GrpcDiscovery::new(DiscoveryServer::new(registry))
            .run(listener, rx)
            .await;
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    (addr, shutdown)
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}
