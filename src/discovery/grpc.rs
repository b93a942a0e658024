//! gRPC registration endpoint.
//!
//! Serves `service_discovery.ServiceDiscovery/Register` as declared in
//! `proto/service_discovery.proto`, so backends registering with a stub
//! generated from that file reach the same registry as JSON-RPC callers.
//!
//! The bindings below are kept in-tree in the shape `tonic-build` emits, so a
//! build needs no `protoc`.

use std::convert::Infallible;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::body::BoxBody;
use tonic::codec::ProstCodec;
use tonic::codegen::{empty_body, http, Body, BoxFuture, Service, StdError};
use tonic::server::{Grpc, NamedService, UnaryService};
use tonic::transport::{Channel, Endpoint, Server};
use tonic::{Code, Request, Response, Status};

use crate::discovery::client::DiscoveryClientError;
use crate::discovery::server::{registration_target, DiscoveryServer};

/// Fully qualified gRPC service name.
pub const SERVICE_NAME: &str = "service_discovery.ServiceDiscovery";

/// Request path of the `Register` method.
pub const REGISTER_PATH: &str = "/service_discovery.ServiceDiscovery/Register";

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ServiceRegisterRequest {
    #[prost(string, tag = "1")]
    pub name: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub address: ::prost::alloc::string::String,
    #[prost(int32, tag = "3")]
    pub port: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ServiceRegisterResponse {
    #[prost(bool, tag = "1")]
    pub success: bool,
    #[prost(string, tag = "2")]
    pub message: ::prost::alloc::string::String,
}

/// gRPC front end over the discovery server's registration logic.
#[derive(Debug, Clone)]
pub struct GrpcDiscovery {
    server: DiscoveryServer,
}

impl GrpcDiscovery {
    pub fn new(server: DiscoveryServer) -> Self {
        Self { server }
    }

    /// Handle one `Register` call. Registry failures are a
    /// `success: false` reply; malformed input is `INVALID_ARGUMENT`.
    pub async fn register(
        &self,
        request: ServiceRegisterRequest,
    ) -> Result<ServiceRegisterResponse, Status> {
        let port = u16::try_from(request.port)
            .ok()
            .filter(|port| *port > 0)
            .ok_or_else(|| Status::invalid_argument("port must be between 1 and 65535"))?;
        let backend = registration_target(&request.name, &request.address, port)
            .map_err(Status::invalid_argument)?;

        let result = self.server.register(request.name.trim(), &backend).await;
        Ok(ServiceRegisterResponse {
            success: result.success,
            message: result.message,
        })
    }

    /// Serve until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), tonic::transport::Error> {
        match listener.local_addr() {
            Ok(addr) => tracing::info!(address = %addr, "gRPC registration endpoint starting"),
            Err(e) => tracing::warn!(error = %e, "gRPC listener has no local address"),
        }

        Server::builder()
            .add_service(self)
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("gRPC registration endpoint stopped");
        Ok(())
    }
}

impl NamedService for GrpcDiscovery {
    const NAME: &'static str = SERVICE_NAME;
}

impl<B> Service<http::Request<B>> for GrpcDiscovery
where
    B: Body + Send + 'static,
    B::Error: Into<StdError> + Send + 'static,
{
    type Response = http::Response<BoxBody>;
    type Error = Infallible;
    type Future = BoxFuture<Self::Response, Self::Error>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: http::Request<B>) -> Self::Future {
        if request.uri().path() != REGISTER_PATH {
            return Box::pin(async move { Ok(unimplemented()) });
        }
        let method = RegisterMethod(self.clone());
        Box::pin(async move {
            let mut grpc = Grpc::new(ProstCodec::default());
            Ok(grpc.unary(method, request).await)
        })
    }
}

struct RegisterMethod(GrpcDiscovery);

impl UnaryService<ServiceRegisterRequest> for RegisterMethod {
    type Response = ServiceRegisterResponse;
    type Future = BoxFuture<Response<Self::Response>, Status>;

    fn call(&mut self, request: Request<ServiceRegisterRequest>) -> Self::Future {
        let discovery = self.0.clone();
        Box::pin(async move {
            discovery
                .register(request.into_inner())
                .await
                .map(Response::new)
        })
    }
}

fn unimplemented() -> http::Response<BoxBody> {
    let mut response = http::Response::new(empty_body());
    let headers = response.headers_mut();
    headers.insert(Status::GRPC_STATUS, (Code::Unimplemented as i32).into());
    headers.insert(http::header::CONTENT_TYPE, tonic::metadata::GRPC_CONTENT_TYPE);
    response
}

/// Client for the `Register` method.
#[derive(Debug, Clone)]
pub struct GrpcRegistrationClient {
    inner: tonic::client::Grpc<Channel>,
}

impl GrpcRegistrationClient {
    /// Connect to `url`, e.g. `http://discovery:50051`.
    pub async fn connect(url: &str) -> Result<Self, DiscoveryClientError> {
        let channel = Endpoint::from_shared(url.to_string())?
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(5))
            .connect()
            .await?;
        Ok(Self {
            inner: tonic::client::Grpc::new(channel),
        })
    }

    pub async fn register(
        &mut self,
        name: &str,
        address: &str,
        port: u16,
    ) -> Result<ServiceRegisterResponse, DiscoveryClientError> {
        self.inner.ready().await?;
        let request = ServiceRegisterRequest {
            name: name.to_string(),
            address: address.to_string(),
            port: i32::from(port),
        };
        let response = self
            .inner
            .unary(
                Request::new(request),
                http::uri::PathAndQuery::from_static(REGISTER_PATH),
                ProstCodec::default(),
            )
            .await?;
        Ok(response.into_inner())
    }
}
