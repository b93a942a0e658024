//! Discovery HTTP endpoint.
//!
//! # Responsibilities
//! - Accept JSON-RPC registry calls on `POST /rpc` (the gRPC endpoint in
//!   `grpc.rs` serves backend self-registration)
//! - Write them into the shared registry
//! - Report liveness on `GET /status`
//!
//! # Design Decisions
//! - JSON-RPC replies are always HTTP 200; failures live in the envelope
//! - A registry failure is a `{success: false}` result and never stops the
//!   process

use std::net::SocketAddr;

use axum::{
    body::Bytes,
    extract::State,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;

use crate::discovery::rpc::*;
use crate::load_balancer::BackendAddress;
use crate::registry::{Registration, RegistryError, ServiceRegistry};

/// JSON-RPC front end over the service registry.
#[derive(Debug, Clone)]
pub struct DiscoveryServer {
    registry: ServiceRegistry,
}

impl DiscoveryServer {
    pub fn new(registry: ServiceRegistry) -> Self {
        Self { registry }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/rpc", post(rpc_handler))
            .route("/status", get(status_handler))
            .with_state(self.clone())
            .layer(TraceLayer::new_for_http())
    }

    /// Serve until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Discovery endpoint starting");

        axum::serve(
            listener,
            self.router()
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;

        tracing::info!("Discovery endpoint stopped");
        Ok(())
    }

    /// Handle one raw JSON-RPC body.
    pub async fn handle(&self, body: &[u8]) -> JsonRpcResponse {
        let value: Value = match serde_json::from_slice(body) {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!(error = %e, "Unparsable JSON-RPC body");
                return JsonRpcResponse::error(Value::Null, JsonRpcError::parse_error());
            }
        };
        let id = value.get("id").cloned().unwrap_or(Value::Null);
        let request: JsonRpcRequest = match serde_json::from_value(value) {
            Ok(r) => r,
            Err(e) => {
                return JsonRpcResponse::error(id, JsonRpcError::invalid_request(&e.to_string()))
            }
        };
        if request.jsonrpc != JSONRPC_VERSION {
            return JsonRpcResponse::error(
                request.id,
                JsonRpcError::invalid_request("jsonrpc must be \"2.0\""),
            );
        }

        let id = request.id.clone();
        match self.dispatch(request).await {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(error) => JsonRpcResponse::error(id, error),
        }
    }

    async fn dispatch(&self, request: JsonRpcRequest) -> Result<Value, JsonRpcError> {
        match request.method.as_str() {
            METHOD_REGISTER | METHOD_REGISTER_ALIAS => {
                let params: RegisterParams = params(request.params)?;
                let backend = backend_of(&params)?;
                to_value(self.register(&params.name, &backend).await)
            }
            METHOD_DEREGISTER => {
                let params: RegisterParams = params(request.params)?;
                let backend = backend_of(&params)?;
                to_value(self.deregister(&params.name, &backend).await)
            }
            METHOD_LOOKUP => {
                let params: LookupParams = params(request.params)?;
                match self.registry.lookup(&params.name).await {
                    Ok(backends) => to_value(LookupResult {
                        name: params.name,
                        backends: backends.iter().map(ToString::to_string).collect(),
                    }),
                    Err(RegistryError::ServiceNotAvailable(name)) => {
                        Err(JsonRpcError::service_not_available(&name))
                    }
                    Err(e) => {
                        tracing::error!(service = %params.name, error = %e, "Lookup failed");
                        Err(JsonRpcError::internal_error(&e.to_string()))
                    }
                }
            }
            other => Err(JsonRpcError::method_not_found(other)),
        }
    }

    pub(crate) async fn register(&self, service: &str, backend: &BackendAddress) -> RegisterResult {
        match self.registry.register(service, backend).await {
            Ok(registration) => {
                tracing::info!(
                    service = %service,
                    backend = %backend,
                    registration = ?registration,
                    "Service registered"
                );
                let message = match registration {
                    Registration::Added => "Service registered successfully",
                    Registration::AlreadyPresent => "Service already registered",
                    Registration::Quarantined => {
                        "Service registered; backend returns after its cooldown"
                    }
                };
                RegisterResult {
                    success: true,
                    message: message.to_string(),
                }
            }
            Err(e) => {
                tracing::error!(service = %service, backend = %backend, error = %e, "Failed to register service");
                RegisterResult {
                    success: false,
                    message: "Failed to register service".to_string(),
                }
            }
        }
    }

    async fn deregister(&self, service: &str, backend: &BackendAddress) -> RegisterResult {
        match self.registry.deregister(service, backend).await {
            Ok(true) => {
                tracing::info!(service = %service, backend = %backend, "Service deregistered");
                RegisterResult {
                    success: true,
                    message: "Service deregistered successfully".to_string(),
                }
            }
            Ok(false) => RegisterResult {
                success: false,
                message: "Backend was not registered".to_string(),
            },
            Err(e) => {
                tracing::error!(service = %service, backend = %backend, error = %e, "Failed to deregister service");
                RegisterResult {
                    success: false,
                    message: "Failed to deregister service".to_string(),
                }
            }
        }
    }
}

fn params<T: DeserializeOwned>(raw: Value) -> Result<T, JsonRpcError> {
    serde_json::from_value(raw).map_err(|e| JsonRpcError::invalid_params(&e.to_string()))
}

fn backend_of(params: &RegisterParams) -> Result<BackendAddress, JsonRpcError> {
    registration_target(&params.name, &params.address, params.port)
        .map_err(JsonRpcError::invalid_params)
}

/// Check the fields of a registration call, shared by both transports.
pub(crate) fn registration_target(
    name: &str,
    address: &str,
    port: u16,
) -> Result<BackendAddress, &'static str> {
    if name.trim().is_empty() {
        return Err("name must not be empty");
    }
    if address.trim().is_empty() || address.contains(['/', ' ']) {
        return Err("address must be a host name or IP");
    }
    Ok(BackendAddress::new(address.trim(), port))
}

fn to_value<T: serde::Serialize>(result: T) -> Result<Value, JsonRpcError> {
    serde_json::to_value(result).map_err(|e| JsonRpcError::internal_error(&e.to_string()))
}

async fn rpc_handler(State(server): State<DiscoveryServer>, body: Bytes) -> impl IntoResponse {
    Json(server.handle(&body).await)
}

async fn status_handler() -> impl IntoResponse {
    Json(json!({
        "status": "OK",
        "message": "Service discovery is running",
    }))
}
