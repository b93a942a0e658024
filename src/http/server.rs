//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (tracing, rate limit, request ID, timeout)
//! - Dispatch requests to the routing engine
//! - Forward requests through the retry/failover orchestrator
//! - Expose the saga endpoint
//! - Run the load monitor alongside the listener

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::{to_bytes, Body},
    extract::State,
    http::{Request, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::http::request::{client_addr, forwarded_headers, UuidRequestId};
use crate::http::response::from_backend;
use crate::http::upstream::{HyperUpstream, Upstream, UpstreamRequest};
use crate::lifecycle::Shutdown;
use crate::load_balancer::{BackendAddress, LoadBalancer};
use crate::observability::{metrics, LoadMonitor};
use crate::registry::{Registry, ServiceRegistry};
use crate::resilience::{CircuitBreaker, Forwarder, RetryPolicy};
use crate::routing::ServiceRouter;
use crate::saga::{Saga, SagaRequest};
use crate::security::{rate_limit_middleware, RateLimiter};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<ServiceRouter>,
    pub forwarder: Arc<Forwarder>,
    pub saga: Option<Arc<Saga>>,
    pub monitor: LoadMonitor,
    pub body_limit: usize,
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
    config: GatewayConfig,
    registry: ServiceRegistry,
    monitor: LoadMonitor,
}

impl HttpServer {
    /// Create a gateway over `store`, forwarding with a pooled hyper client.
    pub fn new(config: GatewayConfig, store: Arc<dyn Registry>) -> Self {
        Self::with_upstream(config, store, Arc::new(HyperUpstream::new()))
    }

    /// Create a gateway with an explicit outbound transport.
    pub fn with_upstream(
        config: GatewayConfig,
        store: Arc<dyn Registry>,
        upstream: Arc<dyn Upstream>,
    ) -> Self {
        let registry = ServiceRegistry::new(store, config.registry.key_prefix.clone());

        let forwarder = Arc::new(Forwarder::new(
            registry.clone(),
            LoadBalancer::new(config.load_balancer.policy, registry.clone()),
            CircuitBreaker::from_config(registry.clone(), &config.breaker, &config.timeouts),
            upstream,
            RetryPolicy::from_config(&config.retries, &config.timeouts),
        ));

        let monitor = LoadMonitor::from_config(
            registry.clone(),
            config.service_names(),
            &config.load_monitor,
        );

        let saga = config.saga.enabled.then(|| {
            Arc::new(
                Saga::new(
                    forwarder.clone(),
                    config.saga.clone(),
                    config.security.max_body_size,
                )
                .with_monitor(monitor.clone()),
            )
        });

        let state = AppState {
            router: Arc::new(ServiceRouter::from_config(&config.routes)),
            forwarder,
            saga,
            monitor: monitor.clone(),
            body_limit: config.security.max_body_size,
        };

        let router = Self::build_router(&config, state);
        Self {
            router,
            config,
            registry,
            monitor,
        }
    }

    /// Build the Axum router with all middleware layers.
    /// Rate limiting covers the proxied and saga routes; `/status` stays
    /// reachable for liveness checks.
    #[allow(deprecated)]
    fn build_router(config: &GatewayConfig, state: AppState) -> Router {
        let mut routed = Router::new();
        if state.saga.is_some() {
            routed = routed.route(&config.saga.route, post(saga_handler));
        }
        let mut routed = routed.fallback(proxy_handler);
        if config.rate_limit.enabled {
            let limiter = Arc::new(RateLimiter::from_config(&config.rate_limit));
            routed = routed.layer(middleware::from_fn_with_state(limiter, rate_limit_middleware));
        }

        Router::new()
            .route("/status", get(status_handler))
            .merge(routed)
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(TraceLayer::new_for_http())
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
    }

    /// The router, without binding a listener.
    pub fn into_router(self) -> Router {
        self.router
    }

    /// Register the statically configured backends.
    pub async fn seed_backends(&self) {
        for seed in &self.config.backends {
            let backend: BackendAddress = match seed.address.parse() {
                Ok(b) => b,
                Err(e) => {
                    tracing::error!(service = %seed.service, address = %seed.address, error = %e, "Skipping invalid backend");
                    continue;
                }
            };
            match self.registry.register(&seed.service, &backend).await {
                Ok(registration) => {
                    tracing::info!(service = %seed.service, backend = %backend, registration = ?registration, "Seeded backend");
                }
                Err(e) => {
                    tracing::error!(service = %seed.service, backend = %backend, error = %e, "Failed to seed backend");
                }
            }
        }
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            policy = ?self.config.load_balancer.policy,
            "HTTP server starting"
        );

        self.seed_backends().await;

        if self.config.load_monitor.enabled {
            let monitor = self.monitor.clone();
            let rx = shutdown.subscribe();
            tokio::spawn(async move {
                monitor.run(rx).await;
            });
        }

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown.wait())
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn status_handler() -> impl IntoResponse {
    Json(json!({
        "status": "OK",
        "message": "Gateway is running",
    }))
}

/// Main proxy handler.
/// Looks up route, then forwards through the orchestrator.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start_time = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let Some(route) = state.router.resolve(&path, request.uri().query()) else {
        tracing::warn!(method = %method, path = %path, "No route matched");
        metrics::record_request(method.as_str(), 404, "none", start_time);
        return GatewayError::RouteNotFound { path }.into_response();
    };

    state.monitor.record(&route.service).await;

    let client = client_addr(&request);
    let (parts, body) = request.into_parts();
    let body = match to_bytes(body, state.body_limit).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(path = %path, error = %e, "Failed to read request body");
            metrics::record_request(method.as_str(), 413, &route.service, start_time);
            return GatewayError::PayloadTooLarge {
                limit: state.body_limit,
            }
            .into_response();
        }
    };

    let upstream_request = UpstreamRequest {
        method: parts.method,
        path_and_query: route.path_and_query,
        headers: forwarded_headers(&parts.headers, client),
        body,
    };

    tracing::debug!(
        service = %route.service,
        method = %method,
        path = %upstream_request.path_and_query,
        "Proxying request"
    );

    match state.forwarder.forward(&route.service, &upstream_request).await {
        Ok(response) => {
            metrics::record_request(method.as_str(), response.status().as_u16(), &route.service, start_time);
            from_backend(response)
        }
        Err(e) => {
            tracing::warn!(service = %route.service, path = %path, error = %e, "Request failed");
            metrics::record_request(method.as_str(), e.status().as_u16(), &route.service, start_time);
            e.into_response()
        }
    }
}

async fn saga_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let Some(saga) = state.saga.clone() else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let client = client_addr(&request);
    let (parts, body) = request.into_parts();
    let bytes = match to_bytes(body, state.body_limit).await {
        Ok(bytes) => bytes,
        Err(_) => {
            return GatewayError::PayloadTooLarge {
                limit: state.body_limit,
            }
            .into_response()
        }
    };
    let saga_request: SagaRequest = if bytes.is_empty() {
        SagaRequest::default()
    } else {
        match serde_json::from_slice(&bytes) {
            Ok(r) => r,
            Err(e) => return GatewayError::BadRequest(e.to_string()).into_response(),
        }
    };

    let mut headers = forwarded_headers(&parts.headers, client);
    headers.remove(axum::http::header::CONTENT_TYPE);

    saga.run(saga_request, headers).await.into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RouteConfig;
    use crate::registry::MemoryRegistry;
    use crate::testing::{Reply, ScriptedUpstream};
    use tower::ServiceExt;

    struct Gateway {
        router: Router,
        registry: ServiceRegistry,
        upstream: Arc<ScriptedUpstream>,
        train: BackendAddress,
        lobby: BackendAddress,
    }

    async fn gateway(config: GatewayConfig) -> Gateway {
        let upstream = Arc::new(ScriptedUpstream::new());
        let server = HttpServer::with_upstream(
            config,
            Arc::new(MemoryRegistry::new()),
            upstream.clone(),
        );
        let train = BackendAddress::new("train", 8000);
        let lobby = BackendAddress::new("lobby", 8000);
        server.registry.register("train_booking_service", &train).await.unwrap();
        server.registry.register("lobby_service", &lobby).await.unwrap();
        let registry = server.registry.clone();
        Gateway {
            router: server.into_router(),
            registry,
            upstream,
            train,
            lobby,
        }
    }

    fn config() -> GatewayConfig {
        GatewayConfig {
            routes: vec![RouteConfig {
                prefix: "/ts".into(),
                service: "train_booking_service".into(),
                strip_prefix: true,
            }],
            ..GatewayConfig::default()
        }
    }

    async fn send(router: &Router, request: Request<Body>) -> Response {
        router.clone().oneshot(request).await.unwrap()
    }

    #[tokio::test]
    async fn test_saga_counts_toward_service_load() {
        let gw = gateway(config()).await;
        gw.upstream.script(&gw.train, [Reply::Json(201, json!(7))]);
        gw.upstream
            .script(&gw.lobby, [Reply::Json(201, json!({"_id": "l1"}))]);

        let response = send(
            &gw.router,
            Request::post("/saga")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"primary":{"name":"IC 501"}}"#))
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);

        assert_eq!(gw.registry.take_load("train_booking_service").await.unwrap(), 1);
        assert_eq!(gw.registry.take_load("lobby_service").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_rate_limit_spares_status() {
        let mut config = config();
        config.rate_limit.max_requests = 1;
        let gw = gateway(config).await;

        let proxied = send(&gw.router, Request::get("/ts/trains").body(Body::empty()).unwrap()).await;
        assert_eq!(proxied.status(), StatusCode::OK);
        let limited = send(&gw.router, Request::get("/ts/trains").body(Body::empty()).unwrap()).await;
        assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
        let saga = send(&gw.router, Request::post("/saga").body(Body::empty()).unwrap()).await;
        assert_eq!(saga.status(), StatusCode::TOO_MANY_REQUESTS);

        for _ in 0..3 {
            let status = send(&gw.router, Request::get("/status").body(Body::empty()).unwrap()).await;
            assert_eq!(status.status(), StatusCode::OK);
        }
        assert_eq!(gw.upstream.calls().len(), 1);
    }
}
