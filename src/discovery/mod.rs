//! Service discovery.
//!
//! # Data Flow
//! ```text
//! backend instance ──(gRPC Register)──▶ grpc.rs ──┐
//! gatewayctl ───────(POST /rpc)───────▶ server.rs ─┴──▶ registry
//!                                                          ▲
//! gateway (load balancer, breaker) ────────────────────────┘
//! ```
//!
//! The discovery process and the gateway share the registry store (Redis in
//! multi-process deployments); they never talk to each other directly.

pub mod client;
pub mod grpc;
pub mod rpc;
pub mod server;

pub use client::{DiscoveryClient, DiscoveryClientError};
pub use grpc::{GrpcDiscovery, GrpcRegistrationClient};
pub use server::DiscoveryServer;
