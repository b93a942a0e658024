//! Gateway error taxonomy.
//!
//! Every failure on the request path ends up as one of these and is turned
//! into a JSON response by `http::response`; nothing here terminates the
//! process.

use axum::http::StatusCode;
use thiserror::Error;

use crate::registry::RegistryError;

/// Errors surfaced to gateway clients.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// No routable backend for the service.
    #[error("service {service} is not available")]
    ServiceUnavailable { service: String },

    /// Every backend tried in this call failed.
    #[error("all {attempted} backend(s) of {service} failed: {last_failure}")]
    BackendsExhausted {
        service: String,
        attempted: usize,
        last_failure: String,
    },

    /// No route prefix matches the request path.
    #[error("no route matches {path}")]
    RouteNotFound { path: String },

    /// Request body exceeds the configured limit.
    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    /// Request could not be forwarded as received.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The shared registry could not be consulted.
    #[error(transparent)]
    Registry(RegistryError),
}

impl GatewayError {
    /// HTTP status the error is reported with.
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::BackendsExhausted { .. } => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            GatewayError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::Registry(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Short machine-readable kind.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::ServiceUnavailable { .. } => "service_unavailable",
            GatewayError::BackendsExhausted { .. } => "backends_exhausted",
            GatewayError::RouteNotFound { .. } => "route_not_found",
            GatewayError::PayloadTooLarge { .. } => "payload_too_large",
            GatewayError::BadRequest(_) => "bad_request",
            GatewayError::Registry(_) => "registry_unavailable",
        }
    }
}

impl From<RegistryError> for GatewayError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::ServiceNotAvailable(service) => {
                GatewayError::ServiceUnavailable { service }
            }
            other => GatewayError::Registry(other),
        }
    }
}
