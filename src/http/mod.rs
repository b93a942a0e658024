//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware)
//!     → request.rs (request ID, forwarded headers)
//!     → routing → resilience::Forwarder → upstream.rs (hyper client)
//!     → response.rs (strip hop-by-hop, render errors)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;
pub mod upstream;

pub use request::X_REQUEST_ID;
pub use server::HttpServer;
pub use upstream::{HyperUpstream, Upstream, UpstreamError, UpstreamRequest};
